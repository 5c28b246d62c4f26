//! Wire codec for the Bulls and Cows protocol
//!
//! Every message is a type token optionally followed by up to four parameters:
//!
//! ```text
//! <TOKEN>[:<p1>[;<p2>[;<p3>[;<p4>]]]]\r\n\0
//! ```
//!
//! Parameters are raw bytes. A parameter may hold zero bytes, so decoding walks
//! the buffer byte by byte instead of treating it as text. The only bytes a
//! parameter cannot carry are the parameter separator and the line terminator.

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

pub const TYPE_SEPARATOR: u8 = b':';
pub const PARAM_SEPARATOR: u8 = b';';
pub const TERMINATOR: &[u8] = b"\r\n";
pub const TRAILER: u8 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("out of memory copying a {0} byte parameter")]
    OutOfMemory(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    ServerMainMenu,
    ServerApproved,
    ServerDenied,
    ServerInvite,
    ServerSetupRequest,
    ServerPlayerMoveRequest,
    ServerGameResults,
    ServerWin,
    ServerDraw,
    ServerNoOpponents,
    ServerOpponentQuit,
    ClientRequest,
    ClientVersus,
    ClientSetup,
    ClientPlayerMove,
    ClientDisconnect,
}

impl MessageType {
    pub const ALL: [MessageType; 16] = [
        MessageType::ServerMainMenu,
        MessageType::ServerApproved,
        MessageType::ServerDenied,
        MessageType::ServerInvite,
        MessageType::ServerSetupRequest,
        MessageType::ServerPlayerMoveRequest,
        MessageType::ServerGameResults,
        MessageType::ServerWin,
        MessageType::ServerDraw,
        MessageType::ServerNoOpponents,
        MessageType::ServerOpponentQuit,
        MessageType::ClientRequest,
        MessageType::ClientVersus,
        MessageType::ClientSetup,
        MessageType::ClientPlayerMove,
        MessageType::ClientDisconnect,
    ];

    /// The exact token sent on the wire. `SERVER_SETUP_REQUSET` is spelled the
    /// way deployed clients expect it.
    pub fn token(self) -> &'static str {
        match self {
            MessageType::ServerMainMenu => "SERVER_MAIN_MENU",
            MessageType::ServerApproved => "SERVER_APPROVED",
            MessageType::ServerDenied => "SERVER_DENIED",
            MessageType::ServerInvite => "SERVER_INVITE",
            MessageType::ServerSetupRequest => "SERVER_SETUP_REQUSET",
            MessageType::ServerPlayerMoveRequest => "SERVER_PLAYER_MOVE_REQUEST",
            MessageType::ServerGameResults => "SERVER_GAME_RESULTS",
            MessageType::ServerWin => "SERVER_WIN",
            MessageType::ServerDraw => "SERVER_DRAW",
            MessageType::ServerNoOpponents => "SERVER_NO_OPPONENTS",
            MessageType::ServerOpponentQuit => "SERVER_OPPONENT_QUIT",
            MessageType::ClientRequest => "CLIENT_REQUEST",
            MessageType::ClientVersus => "CLIENT_VERSUS",
            MessageType::ClientSetup => "CLIENT_SETUP",
            MessageType::ClientPlayerMove => "CLIENT_PLAYER_MOVE",
            MessageType::ClientDisconnect => "CLIENT_DISCONNECT",
        }
    }

    pub fn from_token(token: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.token().as_bytes() == token)
    }

    pub fn param_count(self) -> usize {
        match self {
            MessageType::ServerInvite
            | MessageType::ClientRequest
            | MessageType::ClientSetup
            | MessageType::ClientPlayerMove => 1,
            MessageType::ServerWin => 2,
            MessageType::ServerGameResults => 4,
            _ => 0,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A decoded protocol message: its type and the raw parameter bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub params: Vec<Vec<u8>>,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    pub fn with_params<P: AsRef<[u8]>>(kind: MessageType, params: &[P]) -> Self {
        Self {
            kind,
            params: params.iter().map(|p| p.as_ref().to_vec()).collect(),
        }
    }

    pub fn param(&self, index: usize) -> Option<&[u8]> {
        self.params.get(index).map(Vec::as_slice)
    }

    /// Lossy text view of a parameter for display and logging.
    pub fn param_str(&self, index: usize) -> Cow<'_, str> {
        match self.param(index) {
            Some(bytes) => String::from_utf8_lossy(bytes),
            None => Cow::Borrowed(""),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let params: Vec<&[u8]> = self.params.iter().map(Vec::as_slice).collect();
        encode(self.kind, &params)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.token())?;
        for (i, _) in self.params.iter().enumerate() {
            let sep = if i == 0 { ':' } else { ';' };
            write!(f, "{}{}", sep, self.param_str(i))?;
        }
        Ok(())
    }
}

/// Encodes a message of the given type.
///
/// The parameter count must match the type, and no parameter may contain the
/// parameter separator or the line terminator.
pub fn encode(kind: MessageType, params: &[&[u8]]) -> Result<Vec<u8>> {
    if params.len() != kind.param_count() {
        return Err(CodecError::InvalidArgument(format!(
            "{} takes {} parameters, got {}",
            kind,
            kind.param_count(),
            params.len()
        )));
    }

    for (i, param) in params.iter().enumerate() {
        if param.contains(&PARAM_SEPARATOR) || contains_terminator(param) {
            return Err(CodecError::InvalidArgument(format!(
                "parameter {} of {} contains a reserved delimiter",
                i + 1,
                kind
            )));
        }
    }

    let body_len: usize = params.iter().map(|p| p.len() + 1).sum();
    let mut out = Vec::with_capacity(kind.token().len() + body_len + TERMINATOR.len() + 1);
    out.extend_from_slice(kind.token().as_bytes());
    for (i, param) in params.iter().enumerate() {
        out.push(if i == 0 {
            TYPE_SEPARATOR
        } else {
            PARAM_SEPARATOR
        });
        out.extend_from_slice(param);
    }
    out.extend_from_slice(TERMINATOR);
    out.push(TRAILER);
    Ok(out)
}

/// Encodes a message given its raw token. Tokens outside the vocabulary are
/// rejected.
pub fn encode_token(token: &str, params: &[&[u8]]) -> Result<Vec<u8>> {
    let kind = MessageType::from_token(token.as_bytes())
        .ok_or_else(|| CodecError::InvalidArgument(format!("unknown message type {:?}", token)))?;
    encode(kind, params)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Separator,
    Terminator,
}

/// Finds the first `separator` byte or line terminator at or after `from`.
fn scan(bytes: &[u8], from: usize, separator: u8) -> Option<(usize, Delimiter)> {
    (from..bytes.len()).find_map(|i| {
        if bytes[i] == separator {
            Some((i, Delimiter::Separator))
        } else if bytes[i..].starts_with(TERMINATOR) {
            Some((i, Delimiter::Terminator))
        } else {
            None
        }
    })
}

fn contains_terminator(bytes: &[u8]) -> bool {
    bytes.windows(TERMINATOR.len()).any(|w| w == TERMINATOR)
}

fn copy_param(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut param = Vec::new();
    param
        .try_reserve_exact(bytes.len())
        .map_err(|_| CodecError::OutOfMemory(bytes.len()))?;
    param.extend_from_slice(bytes);
    Ok(param)
}

/// Decodes one message payload.
///
/// Anything after the line terminator is ignored, and so are parameters
/// attached to a type that carries none.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let (token_end, delimiter) = scan(bytes, 0, TYPE_SEPARATOR)
        .ok_or_else(|| CodecError::Protocol("missing line terminator".to_string()))?;

    let token = &bytes[..token_end];
    let kind = MessageType::from_token(token).ok_or_else(|| {
        CodecError::Protocol(format!(
            "unknown message type {:?}",
            String::from_utf8_lossy(token)
        ))
    })?;

    let expected = kind.param_count();
    if expected == 0 {
        return Ok(Message::new(kind));
    }
    if delimiter == Delimiter::Terminator {
        return Err(CodecError::Protocol(format!(
            "{} expects {} parameters, got none",
            kind, expected
        )));
    }

    let mut params = Vec::with_capacity(expected);
    let mut start = token_end + 1;
    loop {
        let (end, delimiter) = scan(bytes, start, PARAM_SEPARATOR)
            .ok_or_else(|| CodecError::Protocol("missing line terminator".to_string()))?;
        params.push(copy_param(&bytes[start..end])?);
        if delimiter == Delimiter::Terminator {
            break;
        }
        start = end + 1;
    }

    if params.len() != expected {
        return Err(CodecError::Protocol(format!(
            "{} expects {} parameters, got {}",
            kind,
            expected,
            params.len()
        )));
    }

    Ok(Message { kind, params })
}
