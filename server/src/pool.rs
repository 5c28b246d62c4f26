//! Fixed-size pool of worker threads
//!
//! Each busy slot holds the worker's join handle and a clone of its socket.
//! Workers report `(slot, outcome)` on a completion channel as their last act,
//! and the pool frees a slot when that report arrives. A worker that panics
//! never reports. Such slots are found by join-polling and count as failed.

use crate::rendezvous::PartyId;
use crate::shutdown::ShutdownSignals;
use crate::worker::{SessionContext, Worker};
use log::{error, info, warn};
use shared::SessionOutcome;
use std::io;
use std::mem;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const COMPLETION_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Completion {
    slot: usize,
    outcome: SessionOutcome,
}

enum Slot {
    Idle,
    Busy {
        handle: JoinHandle<()>,
        stream: TcpStream,
    },
}

/// Fixed set of worker slots plus the outcomes of finished workers.
///
/// Owned by the dispatcher thread. Workers only ever touch the completion
/// channel.
pub struct WorkerPool {
    slots: Vec<Slot>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    outcomes: Vec<SessionOutcome>,
    signals: Arc<ShutdownSignals>,
}

impl WorkerPool {
    /// Creates `size` idle slots. `signals` is raised when a worker panics.
    pub fn new(size: usize, signals: Arc<ShutdownSignals>) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Self {
            slots: (0..size).map(|_| Slot::Idle).collect(),
            completions_tx,
            completions_rx,
            outcomes: Vec::new(),
            signals,
        }
    }

    /// Total number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently running a worker.
    pub fn busy(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Busy { .. }))
            .count()
    }

    /// Frees the slots of every worker that has finished.
    pub fn reclaim(&mut self) {
        self.drain_completions();

        let finished: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Busy { handle, .. } if handle.is_finished() => Some(i),
                _ => None,
            })
            .collect();
        if finished.is_empty() {
            return;
        }

        // A finished worker has already sent its report
        self.drain_completions();
        for index in finished {
            if let Slot::Busy { handle, .. } = mem::replace(&mut self.slots[index], Slot::Idle) {
                if handle.join().is_err() {
                    error!("Worker in slot {} panicked", index);
                } else {
                    error!("Worker in slot {} exited without reporting", index);
                }
                self.signals.raise_error();
                self.outcomes.push(SessionOutcome::Failed);
            }
        }
    }

    /// First free slot, after reclaiming finished workers.
    pub fn free_slot(&mut self) -> Option<usize> {
        self.reclaim();
        self.slots.iter().position(|slot| matches!(slot, Slot::Idle))
    }

    /// Starts a worker thread for `stream` in the idle `slot`.
    ///
    /// The pool keeps a clone of the socket so [`WorkerPool::drain`] can
    /// force the worker out of a blocking receive.
    ///
    /// # Errors
    /// Fails when the socket cannot be cloned or the thread cannot start. The
    /// slot stays idle in that case.
    pub fn spawn(
        &mut self,
        slot: usize,
        id: PartyId,
        stream: TcpStream,
        context: Arc<SessionContext>,
    ) -> io::Result<()> {
        let control = stream.try_clone()?;
        let completions = self.completions_tx.clone();

        let handle = thread::Builder::new()
            .name(format!("worker-{}", slot))
            .spawn(move || {
                let outcome = Worker::new(id, slot, stream, context).run();
                // The pool may already be torn down
                let _ = completions.send(Completion { slot, outcome });
            })?;

        self.slots[slot] = Slot::Busy {
            handle,
            stream: control,
        };
        Ok(())
    }

    /// Waits up to `grace` for every worker to finish, then shuts down the
    /// sockets of the stragglers so their blocking receives return.
    ///
    /// Returns the number of forced terminations.
    pub fn drain(&mut self, grace: Duration) -> usize {
        self.wait_until(Instant::now() + grace);

        let stragglers: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Busy { stream, .. } => {
                    warn!("Forcing worker in slot {} to stop", i);
                    if let Err(e) = stream.shutdown(Shutdown::Both) {
                        warn!("Could not shut down socket of slot {}: {}", i, e);
                    }
                    Some(i)
                }
                Slot::Idle => None,
            })
            .collect();

        if !stragglers.is_empty() {
            self.wait_until(Instant::now() + grace);
            for (i, slot) in self.slots.iter_mut().enumerate() {
                if matches!(slot, Slot::Busy { .. }) {
                    error!("Worker in slot {} did not stop, detaching it", i);
                    *slot = Slot::Idle;
                }
            }
        }

        info!(
            "Worker pool drained ({} forced terminations)",
            stragglers.len()
        );
        stragglers.len()
    }

    pub fn outcomes(&self) -> &[SessionOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<SessionOutcome> {
        self.outcomes
    }

    fn wait_until(&mut self, deadline: Instant) {
        while self.busy() > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self
                .completions_rx
                .recv_timeout((deadline - now).min(COMPLETION_POLL))
            {
                Ok(completion) => self.complete(completion),
                Err(RecvTimeoutError::Timeout) => self.reclaim(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.complete(completion);
        }
    }

    fn complete(&mut self, completion: Completion) {
        if let Slot::Busy { handle, .. } =
            mem::replace(&mut self.slots[completion.slot], Slot::Idle)
        {
            if handle.join().is_err() {
                error!("Worker in slot {} panicked after reporting", completion.slot);
            }
        }
        self.outcomes.push(completion.outcome);
    }
}
