//! Length-prefixed framing over blocking TCP streams.
//!
//! A frame is a little-endian `u32` length followed by exactly that many payload
//! bytes. Receives are bounded by a per-call timeout; a zero-byte read before a
//! frame starts is reported as an orderly disconnect.

use crate::protocol::{decode, CodecError, Message};
use crate::MAX_FRAME_LEN;
use log::debug;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("peer closed the connection")]
    Disconnected,
    #[error("timed out waiting for the peer")]
    TimedOut,
    #[error("transfer failed: {0}")]
    Failed(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Receive timeout for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveTimeout {
    /// Leave whatever timeout the socket already has.
    Keep,
    Indefinite,
    Bounded(Duration),
}

/// Builds the length prefix for a payload of `len` bytes.
pub fn frame_header(len: usize) -> Result<[u8; FRAME_HEADER_LEN]> {
    if len > MAX_FRAME_LEN {
        return Err(TransferError::Failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {} byte limit", len, MAX_FRAME_LEN),
        )));
    }
    Ok((len as u32).to_le_bytes())
}

/// Parses a length prefix, rejecting lengths over the frame limit.
pub fn frame_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransferError::Failed(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("peer announced a {} byte frame", len),
        )));
    }
    Ok(len)
}

pub fn send_frame(stream: &TcpStream, payload: &[u8]) -> Result<()> {
    let header = frame_header(payload.len())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);

    let mut writer = stream;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

pub fn receive_frame(stream: &TcpStream, timeout: ReceiveTimeout) -> Result<Vec<u8>> {
    match timeout {
        ReceiveTimeout::Keep => {}
        ReceiveTimeout::Indefinite => stream.set_read_timeout(None)?,
        ReceiveTimeout::Bounded(duration) => {
            // A zero duration is rejected by the socket layer
            stream.set_read_timeout(Some(duration.max(Duration::from_millis(1))))?
        }
    }

    let mut reader = stream;
    let mut header = [0u8; FRAME_HEADER_LEN];
    read_full(&mut reader, &mut header, true)?;
    let len = frame_len(header)?;

    let mut payload = Vec::new();
    payload.try_reserve_exact(len).map_err(|_| {
        TransferError::Failed(io::Error::new(
            io::ErrorKind::OutOfMemory,
            format!("cannot buffer a {} byte frame", len),
        ))
    })?;
    payload.resize(len, 0);
    read_full(&mut reader, &mut payload, false)?;
    Ok(payload)
}

fn read_full(reader: &mut impl Read, buf: &mut [u8], frame_start: bool) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if frame_start && filled == 0 => return Err(TransferError::Disconnected),
            Ok(0) => {
                return Err(TransferError::Failed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Err(TransferError::TimedOut),
            Err(e) => return Err(TransferError::Failed(e)),
        }
    }
    Ok(())
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Half-closes the send side and waits up to `grace` for the peer to close
/// its side too. Any bytes still in flight from the peer are discarded.
///
/// `Ok(())` means the peer noticed and closed in an orderly way. Anything else,
/// including a peer that stays silent past `grace`, is `TransferError::Failed`.
pub fn graceful_disconnect(stream: &TcpStream, grace: Duration) -> Result<()> {
    if let Err(e) = stream.shutdown(Shutdown::Write) {
        if e.kind() != io::ErrorKind::NotConnected {
            return Err(TransferError::Failed(e));
        }
    }
    stream.set_read_timeout(Some(grace.max(Duration::from_millis(1))))?;

    let deadline = Instant::now() + grace;
    let mut reader = stream;
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch) {
            Ok(0) => return Ok(()),
            Ok(_) if Instant::now() >= deadline => return Err(grace_expired(grace)),
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Err(grace_expired(grace)),
            Err(e) => return Err(TransferError::Failed(e)),
        }
    }
}

fn grace_expired(grace: Duration) -> TransferError {
    TransferError::Failed(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("peer did not close within {:?}", grace),
    ))
}

pub fn send_message(stream: &TcpStream, message: &Message) -> Result<()> {
    let payload = message.encode()?;
    debug!("-> {}", message);
    send_frame(stream, &payload)
}

pub fn receive_message(stream: &TcpStream, timeout: ReceiveTimeout) -> Result<Message> {
    let payload = receive_frame(stream, timeout)?;
    let message = decode(&payload)?;
    debug!("<- {}", message);
    Ok(message)
}
