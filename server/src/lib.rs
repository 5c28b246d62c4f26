//! # Bulls and Cows Server Library
//!
//! This library provides the server side of the Bulls and Cows game. It admits
//! up to two players at a time, pairs them into a match, and relays each
//! round's secret codes and guesses between the two connections.
//!
//! ## Core Responsibilities
//!
//! ### Admission and Dispatch
//! A single dispatcher thread polls the listening socket and assigns each new
//! connection to one of three worker slots. Three slots let a third client be
//! told it was denied instead of being left hanging.
//!
//! ### Session Handling
//! Every connection is served by its own worker thread running a state
//! machine: admission, main menu, matchmaking, setup, and the guess loop.
//!
//! ### Match Coordination
//! The two workers of a match never talk to each other directly. They swap
//! names, codes and guesses through a single-slot staging store guarded by a
//! rendezvous handoff, one round at a time.
//!
//! ### Shutdown
//! An operator types `exit` on the console, or a component hits a fatal
//! error. Either one latches a signal that every thread samples between
//! blocking calls. Workers then let their clients go gracefully, and the
//! server reports an aggregate result.
//!
//! ## Architecture Design
//!
//! ### Threads, Not Tasks
//! Each connection has a dedicated OS thread with blocking, timeout-bounded
//! socket calls. With at most three concurrent sessions this keeps every
//! worker a plain sequential program.
//!
//! ### Explicit Shared Context
//! The counter, rendezvous, signals and timeouts are bundled in one
//! [`worker::SessionContext`] handed to each worker when it starts. There are
//! no process-wide globals.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The [`Server`] type: binding, the dispatch loop and the teardown sequence.
//!
//! ### Pool Module (`pool`)
//! Worker slots, thread spawning, and slot reclamation through a completion
//! channel.
//!
//! ### Worker Module (`worker`)
//! The per-connection state machine.
//!
//! ### Rendezvous and Staging Modules (`rendezvous`, `staging`)
//! The two-party handoff and the single-slot store it guards.
//!
//! ### Client Manager Module (`client_manager`)
//! The connected-clients counter used for admission control.
//!
//! ### Game Module (`game`)
//! Bulls and cows scoring and the per-round verdict.
//!
//! ### Shutdown and Config Modules (`shutdown`, `config`)
//! Latched shutdown signals, the console listener, and configurable timeouts.

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod pool;
pub mod rendezvous;
pub mod shutdown;
pub mod staging;
pub mod worker;

pub use config::{ServerConfig, Timeouts};
pub use network::{RunSummary, Server, ServerError};
pub use shutdown::{ShutdownSignals, ShutdownStatus};
