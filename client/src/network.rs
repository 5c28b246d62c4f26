//! Async framed connection to the game server

use log::{debug, warn};
use shared::transport::{frame_header, frame_len, FRAME_HEADER_LEN};
use shared::{decode, Message, MessageType, TransferError, GRACEFUL_DISCONNECT_TIMEOUT};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed connecting to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("server sent {got} while the client expected {expected}")]
    Unexpected {
        expected: &'static str,
        got: MessageType,
    },
    #[error("console input closed")]
    InputClosed,
    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A framed connection to the game server.
///
/// Generic over the stream so tests can script the server side.
pub struct Connection<S = TcpStream> {
    stream: S,
}

impl Connection<TcpStream> {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Encodes `message` and writes it as one length-prefixed frame.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let payload = message.encode().map_err(TransferError::from)?;
        let header = frame_header(payload.len())?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&payload);

        self.stream
            .write_all(&frame)
            .await
            .map_err(TransferError::Failed)?;
        self.stream.flush().await.map_err(TransferError::Failed)?;
        debug!("-> {}", message);
        Ok(())
    }

    /// Receives one message, waiting at most `limit` when given.
    pub async fn receive(&mut self, limit: Option<Duration>) -> Result<Message> {
        let message = match limit {
            Some(limit) => timeout(limit, self.read_message())
                .await
                .map_err(|_| TransferError::TimedOut)??,
            None => self.read_message().await?,
        };
        debug!("<- {}", message);
        Ok(message)
    }

    async fn read_message(&mut self) -> Result<Message> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => TransferError::Disconnected,
                _ => TransferError::Failed(e),
            })?;

        let mut payload = vec![0u8; frame_len(header)?];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(TransferError::Failed)?;

        Ok(decode(&payload).map_err(TransferError::from)?)
    }

    /// Half-closes the connection and waits briefly for the server to close
    /// its side as well.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown failed: {}", e);
            return;
        }

        let mut scratch = [0u8; 256];
        let drained = timeout(GRACEFUL_DISCONNECT_TIMEOUT, async {
            loop {
                match self.stream.read(&mut scratch).await {
                    Ok(0) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match drained {
            Ok(Ok(())) => debug!("Connection closed gracefully"),
            Ok(Err(e)) => warn!("Connection closed abruptly: {}", e),
            Err(_) => warn!("Server did not close the connection in time"),
        }
    }
}
