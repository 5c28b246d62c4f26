//! Two-party handoff over the staging store
//!
//! Paired workers swap a name, a code, and then one guess per round through a
//! single shared slot. Every swap goes through [`Rendezvous::exchange`]:
//!
//! 1. The first arriver finds the handoff `Idle`. It deposits its value
//!    (write-only) and waits.
//! 2. The second arriver finds the deposit. It takes that value and leaves its
//!    own in the same step (read-then-write), marks the round `Consumed`, and
//!    returns at once.
//! 3. The first arriver wakes, reads the second arriver's value, and puts the
//!    handoff back to `Idle` for the next round.
//!
//! Every access to the staging store happens under the handoff mutex, and the
//! phase moves `Idle -> Deposited -> Consumed -> Idle`. So a party only ever
//! sees the other party's value from the same round.
//!
//! The name swap forms a pairing. Code and guess swaps require the pairing to
//! still exist, so when one side leaves, a partner blocked mid-match returns
//! [`RendezvousError::PeerLeft`] right away instead of waiting out its bound.
//!
//! Waits are sliced so a blocked worker still notices the shutdown signals.

use crate::shutdown::ShutdownSignals;
use crate::staging::{StagingError, StagingExchange};
use log::{debug, error};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Identifies one worker session for the lifetime of its connection.
pub type PartyId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Name,
    Code,
    Guess,
}

#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error("no partner arrived within {0:?}")]
    TimedOut(Duration),
    #[error("partner left the match")]
    PeerLeft,
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("rendezvous state is poisoned")]
    Poisoned,
    #[error(transparent)]
    Staging(#[from] StagingError),
}

impl RendezvousError {
    /// Errors that leave the shared handoff unusable for everyone.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RendezvousError::Poisoned | RendezvousError::Staging(_))
    }
}

pub type Result<T> = std::result::Result<T, RendezvousError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Deposited { by: PartyId, kind: DataKind },
    Consumed { first: PartyId, kind: DataKind },
}

struct Handoff {
    phase: Phase,
    pairing: Option<(PartyId, PartyId)>,
    staging: StagingExchange,
}

impl Handoff {
    fn partner_of(&self, me: PartyId) -> Option<PartyId> {
        match self.pairing {
            Some((a, b)) if a == me => Some(b),
            Some((a, b)) if b == me => Some(a),
            _ => None,
        }
    }

    /// Takes back a deposit nobody consumed.
    fn withdraw(&mut self, me: PartyId) -> bool {
        match self.phase {
            Phase::Deposited { by, .. } if by == me => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }

    /// Whether `me` may start a `kind` round right now.
    fn may_enter(&self, me: PartyId, kind: DataKind) -> bool {
        match self.phase {
            Phase::Idle => true,
            Phase::Deposited { by, kind: waiting } => {
                by != me
                    && waiting == kind
                    && match kind {
                        DataKind::Name => self.partner_of(by).is_none(),
                        _ => self.partner_of(me) == Some(by),
                    }
            }
            Phase::Consumed { .. } => false,
        }
    }
}

/// The handoff shared by every worker of a run.
///
/// Only one pairing exists at a time, matching the two-player limit. The
/// mutex guards the phase, the pairing and the staging store together.
pub struct Rendezvous {
    state: Mutex<Handoff>,
    turn: Condvar,
    slice: Duration,
    signals: Arc<ShutdownSignals>,
}

impl Rendezvous {
    /// `slice` is the longest a waiter sleeps before rechecking `signals`.
    pub fn new(slice: Duration, signals: Arc<ShutdownSignals>) -> Self {
        Self {
            state: Mutex::new(Handoff {
                phase: Phase::Idle,
                pairing: None,
                staging: StagingExchange::new(),
            }),
            turn: Condvar::new(),
            slice,
            signals,
        }
    }

    /// Deposits `value` and waits up to `bound` for the partner's value of the
    /// same kind.
    ///
    /// A `Name` exchange pairs the two parties. `Code` and `Guess` exchanges
    /// fail with `PeerLeft` once that pairing is gone.
    pub fn exchange(
        &self,
        me: PartyId,
        kind: DataKind,
        value: &[u8],
        bound: Duration,
    ) -> Result<Vec<u8>> {
        let deadline = Instant::now() + bound;
        let mut state = self.lock()?;
        let mut timed_out = false;

        // Wait for our turn: a previous round may still be draining
        loop {
            if kind != DataKind::Name && state.partner_of(me).is_none() {
                return Err(RendezvousError::PeerLeft);
            }
            if state.may_enter(me, kind) {
                break;
            }
            self.check_signals()?;
            if timed_out {
                return Err(RendezvousError::TimedOut(bound));
            }
            let (next, expired) = self.wait(state, deadline)?;
            state = next;
            timed_out = expired;
        }

        if let Phase::Deposited { by, .. } = state.phase {
            let peer_value = state
                .staging
                .read_then_write(value)
                .map_err(|e| self.fail(e.into()))?;
            state.phase = Phase::Consumed { first: by, kind };
            if kind == DataKind::Name {
                state.pairing = Some((by, me));
                debug!("Parties {} and {} paired", by, me);
            }
            self.turn.notify_all();
            return Ok(peer_value);
        }

        // First arriver for this round
        if kind == DataKind::Name {
            state.staging.truncate();
        }
        state
            .staging
            .write_only(value)
            .map_err(|e| self.fail(e.into()))?;
        state.phase = Phase::Deposited { by: me, kind };
        self.turn.notify_all();

        let mut timed_out = false;
        loop {
            match state.phase {
                Phase::Consumed { first, .. } if first == me => {
                    let peer_value = state.staging.read().map_err(|e| self.fail(e.into()))?;
                    state.phase = Phase::Idle;
                    self.turn.notify_all();
                    return Ok(peer_value);
                }
                Phase::Deposited { by, .. } if by == me => {}
                _ => return Err(RendezvousError::PeerLeft),
            }

            let abandon = if kind != DataKind::Name && state.partner_of(me).is_none() {
                Some(RendezvousError::PeerLeft)
            } else if let Err(e) = self.check_signals() {
                Some(e)
            } else if timed_out {
                Some(RendezvousError::TimedOut(bound))
            } else {
                None
            };
            if let Some(reason) = abandon {
                state.withdraw(me);
                self.turn.notify_all();
                return Err(reason);
            }

            let (next, expired) = self.wait(state, deadline)?;
            state = next;
            timed_out = expired;
        }
    }

    /// Whether `me` still has a partner.
    pub fn is_paired(&self, me: PartyId) -> Result<bool> {
        Ok(self.lock()?.partner_of(me).is_some())
    }

    /// Dissolves any pairing `me` belongs to and withdraws its pending deposit.
    /// A partner blocked in a code or guess exchange wakes with `PeerLeft`.
    pub fn leave(&self, me: PartyId) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(partner) = state.partner_of(me) {
            debug!("Party {} left its match with {}", me, partner);
            state.pairing = None;
        }
        state.withdraw(me);
        self.turn.notify_all();
        Ok(())
    }

    /// Ends a decided match. The store is cleared once no round is in flight.
    pub fn finish_match(&self, me: PartyId) -> Result<()> {
        let mut state = self.lock()?;
        if state.partner_of(me).is_some() {
            state.pairing = None;
        }
        if state.phase == Phase::Idle {
            state.staging.truncate();
        }
        self.turn.notify_all();
        Ok(())
    }

    pub fn is_idle(&self) -> Result<bool> {
        Ok(self.lock()?.phase == Phase::Idle)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Handoff>> {
        self.state
            .lock()
            .map_err(|_| self.fail(RendezvousError::Poisoned))
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, Handoff>,
        deadline: Instant,
    ) -> Result<(MutexGuard<'a, Handoff>, bool)> {
        let now = Instant::now();
        if now >= deadline {
            return Ok((guard, true));
        }
        let slice = (deadline - now).min(self.slice);
        let (guard, _) = self
            .turn
            .wait_timeout(guard, slice)
            .map_err(|_| self.fail(RendezvousError::Poisoned))?;
        Ok((guard, Instant::now() >= deadline))
    }

    fn check_signals(&self) -> Result<()> {
        if self.signals.is_running() {
            Ok(())
        } else {
            Err(RendezvousError::ShuttingDown)
        }
    }

    fn fail(&self, err: RendezvousError) -> RendezvousError {
        error!("Rendezvous failure: {}", err);
        self.signals.raise_error();
        err
    }
}
