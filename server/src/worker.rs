//! Per-connection session state machine
//!
//! A worker owns one client connection from admission until the client leaves:
//!
//! ```text
//! Admission -> MainMenu -> Matchmaking -> SetUp -> GuessLoop -> MainMenu -> ...
//! ```
//!
//! Each phase returns `Result<_, SessionOutcome>`, so any transport failure,
//! protocol violation, or shutdown request short-circuits straight to the
//! worker's exit path with `?`. The shutdown signals are sampled at every
//! phase boundary, never during a blocking receive.

use crate::client_manager::ConnectedClients;
use crate::config::Timeouts;
use crate::game::{judge, score, Verdict};
use crate::rendezvous::{DataKind, PartyId, Rendezvous, RendezvousError};
use crate::shutdown::{ShutdownSignals, ShutdownStatus};
use log::{debug, error, info, warn};
use shared::transport::{graceful_disconnect, receive_message, send_message};
use shared::{
    is_valid_code, is_valid_player_name, Message, MessageType, ReceiveTimeout, SessionOutcome,
    TransferError, MAX_PLAYERS,
};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

type Phase<T> = Result<T, SessionOutcome>;

/// State shared by every worker of one server run.
pub struct SessionContext {
    pub counter: ConnectedClients,
    pub rendezvous: Rendezvous,
    pub signals: Arc<ShutdownSignals>,
    pub timeouts: Timeouts,
}

pub struct Worker {
    id: PartyId,
    slot: usize,
    stream: TcpStream,
    context: Arc<SessionContext>,

    self_name: Vec<u8>,
    self_code: Vec<u8>,
    self_guess: Vec<u8>,
    other_name: Vec<u8>,
    other_code: Vec<u8>,
    other_guess: Vec<u8>,
}

impl Worker {
    pub fn new(id: PartyId, slot: usize, stream: TcpStream, context: Arc<SessionContext>) -> Self {
        Self {
            id,
            slot,
            stream,
            context,
            self_name: Vec::new(),
            self_code: Vec::new(),
            self_guess: Vec::new(),
            other_name: Vec::new(),
            other_code: Vec::new(),
            other_guess: Vec::new(),
        }
    }

    /// Drives the session to completion and releases the worker's share of
    /// the counter and the rendezvous.
    pub fn run(mut self) -> SessionOutcome {
        let outcome = match self.converse() {
            Ok(()) => SessionOutcome::Succeeded,
            Err(outcome) => outcome,
        };
        self.release(outcome)
    }

    fn converse(&mut self) -> Phase<()> {
        self.admit()?;
        loop {
            self.checkpoint()?;
            self.main_menu()?;
            let outcome = self.matchmaking()?;
            debug!("[slot {}] back at the menu: {}", self.slot, outcome);
        }
    }

    fn admit(&mut self) -> Phase<()> {
        let request = self.receive(self.timeouts().short_receive)?;
        self.checkpoint()?;

        if request.kind != MessageType::ClientRequest {
            return Err(self.violation("expected a join request", &request));
        }
        let name = request.param(0).unwrap_or_default();
        if !is_valid_player_name(name) {
            return Err(self.violation("invalid player name", &request));
        }

        let connected = self.connected_clients()?;
        if connected > MAX_PLAYERS {
            info!(
                "[slot {}] denying {} ({} clients connected)",
                self.slot,
                request.param_str(0),
                connected
            );
            self.send(Message::new(MessageType::ServerDenied))?;
            self.disconnect();
            return Err(SessionOutcome::ConnectionDenied);
        }

        self.self_name = name.to_vec();
        info!("[slot {}] {} joined", self.slot, self.name());
        self.send(Message::new(MessageType::ServerApproved))
    }

    /// Returns once the player asks for a match.
    fn main_menu(&mut self) -> Phase<()> {
        self.send(Message::new(MessageType::ServerMainMenu))?;
        let reply = self.receive(self.timeouts().long_receive)?;
        self.checkpoint()?;

        match reply.kind {
            MessageType::ClientVersus => Ok(()),
            MessageType::ClientDisconnect => {
                info!("[slot {}] {} left", self.slot, self.name());
                self.disconnect();
                Err(SessionOutcome::PlayerLeftSession)
            }
            _ => Err(self.violation("expected a menu choice", &reply)),
        }
    }

    fn matchmaking(&mut self) -> Phase<SessionOutcome> {
        if self.connected_clients()? < MAX_PLAYERS {
            self.send(Message::new(MessageType::ServerNoOpponents))?;
            return Ok(SessionOutcome::BackToMenu);
        }

        match self.exchange(DataKind::Name, &self.self_name)? {
            Some(name) => self.other_name = name,
            None => {
                self.send(Message::new(MessageType::ServerNoOpponents))?;
                return Ok(SessionOutcome::BackToMenu);
            }
        }
        info!(
            "[slot {}] {} paired with {}",
            self.slot,
            self.name(),
            String::from_utf8_lossy(&self.other_name)
        );

        let outcome = self.play_match();
        if let Err(e) = self.context.rendezvous.leave(self.id) {
            error!("[slot {}] could not leave the match: {}", self.slot, e);
            self.disconnect();
            return Err(SessionOutcome::Failed);
        }
        outcome
    }

    /// The invite and setup request always go out first. A partner that has
    /// already left is reported once the code exchange finds no pairing.
    fn play_match(&mut self) -> Phase<SessionOutcome> {
        self.checkpoint()?;
        self.send(Message::with_params(
            MessageType::ServerInvite,
            &[&self.other_name],
        ))?;
        self.send(Message::new(MessageType::ServerSetupRequest))?;

        let setup = self.receive(self.timeouts().long_receive)?;
        self.checkpoint()?;
        self.self_code = self.expect_code(&setup, MessageType::ClientSetup)?;

        match self.exchange(DataKind::Code, &self.self_code)? {
            Some(code) => self.other_code = code,
            None => return self.opponent_quit(),
        }

        loop {
            self.checkpoint()?;
            if !self.still_paired()? {
                return self.opponent_quit();
            }

            self.send(Message::new(MessageType::ServerPlayerMoveRequest))?;
            let mv = self.receive(self.timeouts().long_receive)?;
            self.checkpoint()?;
            self.self_guess = self.expect_code(&mv, MessageType::ClientPlayerMove)?;

            match self.exchange(DataKind::Guess, &self.self_guess)? {
                Some(guess) => self.other_guess = guess,
                None => return self.opponent_quit(),
            }

            let mine = score(&self.other_code, &self.self_guess);
            let theirs = score(&self.self_code, &self.other_guess);

            let reply = match judge(mine, theirs) {
                Verdict::Continue(result) => {
                    let bulls = result.bulls.to_string();
                    let cows = result.cows.to_string();
                    self.send(Message::with_params(
                        MessageType::ServerGameResults,
                        &[
                            bulls.as_bytes(),
                            cows.as_bytes(),
                            self.other_name.as_slice(),
                            self.other_guess.as_slice(),
                        ],
                    ))?;
                    continue;
                }
                Verdict::Won => {
                    info!("[slot {}] {} won", self.slot, self.name());
                    Message::with_params(
                        MessageType::ServerWin,
                        &[&self.self_name, &self.other_code],
                    )
                }
                Verdict::Lost => Message::with_params(
                    MessageType::ServerWin,
                    &[&self.other_name, &self.other_code],
                ),
                Verdict::Draw => {
                    info!("[slot {}] {} drew", self.slot, self.name());
                    Message::new(MessageType::ServerDraw)
                }
            };

            self.finish_match()?;
            self.send(reply)?;
            return Ok(SessionOutcome::BackToMenu);
        }
    }

    fn opponent_quit(&self) -> Phase<SessionOutcome> {
        info!("[slot {}] opponent of {} quit", self.slot, self.name());
        self.send(Message::new(MessageType::ServerOpponentQuit))?;
        Ok(SessionOutcome::BackToMenu)
    }

    fn expect_code(&self, message: &Message, kind: MessageType) -> Phase<Vec<u8>> {
        if message.kind != kind {
            return Err(self.violation("unexpected message during a match", message));
        }
        match message.param(0) {
            Some(code) if is_valid_code(code) => Ok(code.to_vec()),
            _ => Err(self.violation("code must be four digits", message)),
        }
    }

    /// Swaps `value` with the partner. `None` means the partner never showed
    /// up or already left; the caller tells its client and returns to the menu.
    fn exchange(&self, kind: DataKind, value: &[u8]) -> Phase<Option<Vec<u8>>> {
        let bound = self.timeouts().long_receive;
        match self.context.rendezvous.exchange(self.id, kind, value, bound) {
            Ok(peer_value) => Ok(Some(peer_value)),
            Err(RendezvousError::TimedOut(_)) | Err(RendezvousError::PeerLeft) => {
                debug!("[slot {}] {:?} exchange found no partner", self.slot, kind);
                Ok(None)
            }
            Err(RendezvousError::ShuttingDown) => {
                self.disconnect();
                Err(SessionOutcome::ShuttingDown)
            }
            Err(e) => {
                error!("[slot {}] {:?} exchange failed: {}", self.slot, kind, e);
                self.disconnect();
                Err(SessionOutcome::Failed)
            }
        }
    }

    fn still_paired(&self) -> Phase<bool> {
        self.context.rendezvous.is_paired(self.id).map_err(|e| {
            error!("[slot {}] pairing check failed: {}", self.slot, e);
            self.disconnect();
            SessionOutcome::Failed
        })
    }

    fn finish_match(&self) -> Phase<()> {
        self.context.rendezvous.finish_match(self.id).map_err(|e| {
            error!("[slot {}] could not close the match: {}", self.slot, e);
            self.disconnect();
            SessionOutcome::Failed
        })
    }

    fn connected_clients(&self) -> Phase<usize> {
        // The counter raises the global error signal itself
        self.context.counter.get().map_err(|_| {
            self.disconnect();
            SessionOutcome::Failed
        })
    }

    /// Samples the shutdown signals. On exit or error the client is let go
    /// gracefully and the worker stops.
    fn checkpoint(&self) -> Phase<()> {
        match self.context.signals.status() {
            ShutdownStatus::Running => Ok(()),
            status => {
                info!("[slot {}] stopping ({:?})", self.slot, status);
                self.disconnect();
                Err(SessionOutcome::ShuttingDown)
            }
        }
    }

    fn send(&self, message: Message) -> Phase<()> {
        send_message(&self.stream, &message).map_err(|e| self.transfer_failed(e))
    }

    fn receive(&self, timeout: Duration) -> Phase<Message> {
        receive_message(&self.stream, ReceiveTimeout::Bounded(timeout))
            .map_err(|e| self.transfer_failed(e))
    }

    fn transfer_failed(&self, err: TransferError) -> SessionOutcome {
        match err {
            TransferError::Disconnected => {
                info!("[slot {}] client closed the connection", self.slot);
                SessionOutcome::GracefullyDisconnected
            }
            TransferError::TimedOut => {
                warn!("[slot {}] client timed out", self.slot);
                self.disconnect();
                SessionOutcome::TimedOut
            }
            TransferError::Failed(e) => {
                warn!("[slot {}] connection failed: {}", self.slot, e);
                SessionOutcome::PeerDisconnectedAbruptly
            }
            TransferError::Protocol(e) => {
                warn!("[slot {}] malformed message: {}", self.slot, e);
                self.disconnect()
            }
        }
    }

    fn violation(&self, what: &str, message: &Message) -> SessionOutcome {
        warn!("[slot {}] {}: got {}", self.slot, what, message);
        self.disconnect()
    }

    fn disconnect(&self) -> SessionOutcome {
        match graceful_disconnect(&self.stream, self.timeouts().graceful_disconnect) {
            Ok(()) => SessionOutcome::GracefullyDisconnected,
            Err(e) => {
                debug!("[slot {}] graceful disconnect failed: {}", self.slot, e);
                SessionOutcome::PeerDisconnectedAbruptly
            }
        }
    }

    fn release(&self, mut outcome: SessionOutcome) -> SessionOutcome {
        if self.context.rendezvous.leave(self.id).is_err() {
            outcome = SessionOutcome::Failed;
        }
        match self.context.counter.dec() {
            Ok(remaining) => info!(
                "[slot {}] worker finished: {} ({} clients connected)",
                self.slot, outcome, remaining
            ),
            Err(_) => outcome = SessionOutcome::Failed,
        }
        outcome
    }

    fn timeouts(&self) -> &Timeouts {
        &self.context.timeouts
    }

    fn name(&self) -> String {
        String::from_utf8_lossy(&self.self_name).into_owned()
    }
}
