//! # Bulls and Cows Client Library
//!
//! This library provides the interactive terminal client for the Bulls and
//! Cows server. It joins the server under a player name, walks the player
//! through the server's menus, and relays secret codes and guesses during a
//! match.
//!
//! ## Architecture Overview
//!
//! The server drives the conversation. The client only ever answers the
//! message it just received, so its whole behavior is a small state machine:
//!
//! ### Join
//! Sends `CLIENT_REQUEST` with the player name and waits a bounded time for
//! approval or denial.
//!
//! ### Main Menu
//! Every `SERVER_MAIN_MENU` offers a match or quitting.
//!
//! ### Match
//! After an invite the player picks a secret code, then answers each move
//! request with a guess until somebody wins, the game is drawn, or the
//! opponent leaves.
//!
//! ### Reconnect
//! If the connection fails, times out, or is denied, the player can try again
//! or exit.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The session state machine and the reconnect loop ([`game::Client`]).
//!
//! ### Input Module (`input`)
//! Line-based prompts with validation of menu choices and four-digit codes.
//!
//! ### Network Module (`network`)
//! Async length-prefixed framing over TCP using the shared wire codec.
//!
//! ### Rendering Module (`rendering`)
//! Every piece of text shown to the player.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::game::{Client, ClientConfig};
//! use client::input::Terminal;
//! use tokio::io::{stdin, stdout, BufReader};
//!
//! # async fn example() -> Result<(), client::network::ClientError> {
//! let client = Client::new(ClientConfig::new("127.0.0.1", 8080, "alice"));
//! let mut terminal = Terminal::new(BufReader::new(stdin()), stdout());
//! client.run(&mut terminal).await?;
//! # Ok(())
//! # }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;

pub use game::{Client, ClientConfig, SessionEnd};
pub use network::{ClientError, Connection};
