//! Connection dispatcher and server run loop
//!
//! The dispatcher polls the listening socket with a bounded timeout, accepts
//! pending connections, and hands each one to a free worker slot. A
//! connection that arrives while every slot is busy is dropped. Shutdown
//! signals are sampled once per poll iteration.
//!
//! When the loop ends (operator `exit`, or a fatal error anywhere) the run is
//! torn down:
//! 1. workers get a grace period to finish (shorter after an error)
//! 2. stragglers have their sockets shut down and count as forced terminations
//! 3. the console listener is joined if it has returned
//! 4. shared state is released: counter, rendezvous and staging, listener

use crate::client_manager::{ConnectedClients, CounterError};
use crate::config::ServerConfig;
use crate::pool::WorkerPool;
use crate::rendezvous::{PartyId, Rendezvous};
use crate::shutdown::{listen_for_exit, ShutdownSignals};
use crate::worker::SessionContext;
use log::{debug, error, info, warn};
use mio::net::TcpListener as MioTcpListener;
use mio::{Events, Interest, Poll, Token};
use shared::{SessionOutcome, POOL_SIZE};
use std::io::{self, BufRead};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

const LISTENER: Token = Token(0);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("network I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Counter(#[from] CounterError),
    #[error("failed to start a worker thread: {0}")]
    Spawn(io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Aggregate result of one server run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<SessionOutcome>,
    pub forced_terminations: usize,
    pub error_raised: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        !self.error_raised
            && self.forced_terminations == 0
            && !self.outcomes.iter().any(|outcome| outcome.is_failure())
    }
}

/// Accepts connections and hands them to the worker pool.
///
/// The listener is bound up front so callers can learn the real address
/// before [`Server::run`] takes over the thread.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    signals: Arc<ShutdownSignals>,
}

impl Server {
    /// Binds the listening socket in non-blocking mode.
    ///
    /// # Errors
    /// Returns `ServerError::Bind` when the address is unavailable.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).map_err(|source| ServerError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            config,
            signals: Arc::new(ShutdownSignals::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for raising `exit` or `error` from outside the run loop.
    pub fn signals(&self) -> Arc<ShutdownSignals> {
        Arc::clone(&self.signals)
    }

    /// Serves clients until `exit` or `error` is raised, then tears the run
    /// down. `console`, when given, is read line by line for the exit command.
    pub fn run<R>(self, console: Option<R>) -> RunSummary
    where
        R: BufRead + Send + 'static,
    {
        let timeouts = self.config.timeouts;
        let console = console.and_then(|input| self.spawn_console(input));

        let context = Arc::new(SessionContext {
            counter: ConnectedClients::new(
                POOL_SIZE,
                timeouts.counter_lock,
                Arc::clone(&self.signals),
            ),
            rendezvous: Rendezvous::new(timeouts.rendezvous_slice, Arc::clone(&self.signals)),
            signals: Arc::clone(&self.signals),
            timeouts,
        });
        let mut pool = WorkerPool::new(POOL_SIZE, Arc::clone(&self.signals));

        info!(
            "Dispatching connections on {} with {} worker slots",
            self.config.bind_addr,
            pool.size()
        );
        if let Err(e) = self.dispatch(&mut pool, &context) {
            error!("Dispatcher stopped: {}", e);
            self.signals.raise_error();
        }

        let grace = if self.signals.error_raised() {
            timeouts.error_grace
        } else {
            timeouts.exit_grace
        };
        info!("Shutting down, waiting up to {:?} for workers", grace);
        let forced_terminations = pool.drain(grace);

        if let Some(handle) = console {
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Console listener panicked");
                }
            } else {
                debug!("Console listener still waiting for input, detaching it");
            }
        }

        drop(context);
        drop(self.listener);

        let summary = RunSummary {
            outcomes: pool.into_outcomes(),
            forced_terminations,
            error_raised: self.signals.error_raised(),
        };
        info!(
            "Server stopped: {} sessions, {} forced terminations, error raised: {}",
            summary.outcomes.len(),
            summary.forced_terminations,
            summary.error_raised
        );
        summary
    }

    fn spawn_console<R>(&self, input: R) -> Option<JoinHandle<bool>>
    where
        R: BufRead + Send + 'static,
    {
        let signals = Arc::clone(&self.signals);
        match thread::Builder::new()
            .name("console".to_string())
            .spawn(move || listen_for_exit(input, &signals))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to start console listener: {}", e);
                self.signals.raise_error();
                None
            }
        }
    }

    fn dispatch(&self, pool: &mut WorkerPool, context: &Arc<SessionContext>) -> Result<()> {
        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(16);
        let mut listener = MioTcpListener::from_std(self.listener.try_clone()?);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let mut next_id: PartyId = 1;
        while self.signals.is_running() {
            pool.reclaim();

            if let Err(e) = poll.poll(&mut events, Some(self.config.timeouts.accept_poll)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }
            if !self.signals.is_running() {
                break;
            }

            for event in events.iter() {
                if event.token() != LISTENER {
                    continue;
                }
                loop {
                    match self.listener.accept() {
                        Ok((stream, addr)) => {
                            self.assign(pool, context, stream, addr, next_id)?;
                            next_id += 1;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        debug!("Dispatcher loop finished");
        Ok(())
    }

    fn assign(
        &self,
        pool: &mut WorkerPool,
        context: &Arc<SessionContext>,
        stream: TcpStream,
        addr: SocketAddr,
        id: PartyId,
    ) -> Result<()> {
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Dropping connection from {}: {}", addr, e);
            return Ok(());
        }

        let Some(slot) = pool.free_slot() else {
            warn!("No free worker slot, dropping connection from {}", addr);
            return Ok(());
        };

        context.counter.inc()?;
        if let Err(e) = pool.spawn(slot, id, stream, Arc::clone(context)) {
            // The worker never ran, so nobody else will uncount it
            let _ = context.counter.dec();
            return Err(ServerError::Spawn(e));
        }

        info!("Assigned {} to slot {}", addr, slot);
        Ok(())
    }
}
