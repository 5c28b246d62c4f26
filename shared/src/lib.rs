pub mod outcome;
pub mod protocol;
pub mod transport;

use std::time::Duration;

pub use outcome::SessionOutcome;
pub use protocol::{decode, encode, CodecError, Message, MessageType};
pub use transport::{ReceiveTimeout, TransferError};

pub const MAX_PLAYER_NAME_LEN: usize = 20;
pub const CODE_LEN: usize = 4;
pub const POOL_SIZE: usize = 3;
pub const MAX_PLAYERS: usize = 2;
pub const MAX_FRAME_LEN: usize = 64 * 1024;

pub const SHORT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(15);
pub const LONG_RECEIVE_TIMEOUT: Duration = Duration::from_secs(600);
pub const GRACEFUL_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const COUNTER_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
pub const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_millis(14_500);
pub const EXIT_GRACE: Duration = Duration::from_secs(15);
pub const ERROR_GRACE: Duration = Duration::from_secs(5);

/// Returns true when `bytes` is a secret code or guess: exactly four ASCII digits.
pub fn is_valid_code(bytes: &[u8]) -> bool {
    bytes.len() == CODE_LEN && bytes.iter().all(u8::is_ascii_digit)
}

/// Player names travel as a single protocol parameter, so they are bounded and
/// may not contain the parameter separator.
pub fn is_valid_player_name(name: &[u8]) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PLAYER_NAME_LEN
        && !name.contains(&protocol::PARAM_SEPARATOR)
        && !name.windows(2).any(|w| w == protocol::TERMINATOR)
}
