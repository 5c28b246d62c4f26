//! Single-slot staging store shared by two paired workers.
//!
//! Holds at most one record, `<u32 LE length><payload>`, rewritten in place.
//! The store does no locking of its own; callers must already own the turn
//! (see [`crate::rendezvous`]).

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging record is too large ({0} bytes)")]
    TooLarge(usize),
    #[error("staging store I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StagingError>;

/// In-memory staging store holding a single length-prefixed record.
#[derive(Debug, Default)]
pub struct StagingExchange {
    record: Cursor<Vec<u8>>,
}

impl StagingExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the record with `value`.
    pub fn write(&mut self, value: &[u8]) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| StagingError::TooLarge(value.len()))?;
        self.record.seek(SeekFrom::Start(0))?;
        self.record.write_all(&len.to_le_bytes())?;
        self.record.write_all(value)?;
        Ok(())
    }

    /// Reads the current record. Fails on an empty or short store.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        self.record.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; 4];
        self.record.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header) as usize;

        let mut value = Vec::new();
        value
            .try_reserve_exact(len)
            .map_err(|_| StagingError::TooLarge(len))?;
        value.resize(len, 0);
        self.record.read_exact(&mut value)?;
        Ok(value)
    }

    /// Deposit made by the party that touches the store first in a round.
    pub fn write_only(&mut self, value: &[u8]) -> Result<()> {
        self.write(value)
    }

    /// Takes the waiting value and leaves `value` in its place.
    pub fn read_then_write(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        let previous = self.read()?;
        self.write(value)?;
        Ok(previous)
    }

    /// Recreates the store empty.
    pub fn truncate(&mut self) {
        self.record = Cursor::new(Vec::new());
    }

    pub fn is_empty(&self) -> bool {
        self.record.get_ref().is_empty()
    }
}
