//! Connected-clients counter used for admission control
//!
//! The dispatcher increments the count after it assigns a pool slot, and each
//! worker decrements it on its own way out. So the count never understates the
//! number of live workers.
//!
//! The mutex is acquired within a fixed bound. Failing to get it in time means
//! the shared synchronization fabric can no longer be trusted. That is treated
//! as fatal for the whole run and is never retried.

use crate::shutdown::ShutdownSignals;
use log::error;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CounterError {
    #[error("timed out after {0:?} waiting for the client counter")]
    LockTimeout(Duration),
    #[error("client counter mutex is poisoned")]
    Poisoned,
    #[error("client counter would leave [0, {capacity}] (currently {value})")]
    OutOfRange { value: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, CounterError>;

/// Number of live workers, bounded to `[0, capacity]`.
///
/// Every operation takes the mutex within `lock_timeout`. A timeout, a
/// poisoned lock, or a value leaving the range raises the run's error signal
/// before the error is returned.
pub struct ConnectedClients {
    count: Mutex<usize>,
    capacity: usize,
    lock_timeout: Duration,
    signals: Arc<ShutdownSignals>,
}

impl ConnectedClients {
    /// Creates a counter starting at zero.
    ///
    /// # Arguments
    /// * `capacity` - Largest value the counter may reach (the pool size)
    /// * `lock_timeout` - Bound on every mutex acquisition
    /// * `signals` - Signals to raise `error` on when the counter fails
    pub fn new(capacity: usize, lock_timeout: Duration, signals: Arc<ShutdownSignals>) -> Self {
        Self {
            count: Mutex::new(0),
            capacity,
            lock_timeout,
            signals,
        }
    }

    /// Current number of live workers.
    pub fn get(&self) -> Result<usize> {
        Ok(*self.lock()?)
    }

    /// Counts a newly assigned worker and returns the new total.
    pub fn inc(&self) -> Result<usize> {
        let mut count = self.lock()?;
        if *count >= self.capacity {
            return Err(self.fail(CounterError::OutOfRange {
                value: *count,
                capacity: self.capacity,
            }));
        }
        *count += 1;
        Ok(*count)
    }

    /// Uncounts an exiting worker and returns the new total.
    pub fn dec(&self) -> Result<usize> {
        let mut count = self.lock()?;
        if *count == 0 {
            return Err(self.fail(CounterError::OutOfRange {
                value: 0,
                capacity: self.capacity,
            }));
        }
        *count -= 1;
        Ok(*count)
    }

    fn lock(&self) -> Result<MutexGuard<'_, usize>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.count.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => return Err(self.fail(CounterError::Poisoned)),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(self.fail(CounterError::LockTimeout(self.lock_timeout)));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    fn fail(&self, err: CounterError) -> CounterError {
        error!("Connected-clients counter failure: {}", err);
        self.signals.raise_error();
        err
    }
}
