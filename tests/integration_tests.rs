//! Integration tests for the Bulls and Cows server and client
//!
//! These tests run a real server on a loopback port with short timeouts and
//! drive it with scripted clients over TCP.

use server::{RunSummary, Server, ServerConfig, ShutdownSignals, Timeouts};
use shared::transport::{receive_message, send_message};
use shared::{Message, MessageType, ReceiveTimeout, SessionOutcome, TransferError};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RECEIVE_LIMIT: Duration = Duration::from_secs(5);

fn test_timeouts() -> Timeouts {
    Timeouts {
        short_receive: Duration::from_secs(5),
        long_receive: Duration::from_secs(10),
        graceful_disconnect: Duration::from_millis(500),
        counter_lock: Duration::from_secs(2),
        accept_poll: Duration::from_millis(50),
        rendezvous_slice: Duration::from_millis(50),
        exit_grace: Duration::from_secs(3),
        error_grace: Duration::from_secs(1),
    }
}

struct TestServer {
    addr: SocketAddr,
    signals: Arc<ShutdownSignals>,
    handle: JoinHandle<RunSummary>,
}

impl TestServer {
    fn start(timeouts: Timeouts) -> Self {
        let config = ServerConfig::new("127.0.0.1:0").with_timeouts(timeouts);
        let server = Server::bind(config).expect("bind test server");
        let addr = server.local_addr().unwrap();
        let signals = server.signals();
        let handle = thread::spawn(move || server.run(None::<io::Empty>));
        Self {
            addr,
            signals,
            handle,
        }
    }

    fn request_exit(&self) {
        assert!(self.signals.request_exit());
    }

    fn join(self) -> RunSummary {
        self.handle.join().expect("server thread panicked")
    }

    fn stop(self) -> RunSummary {
        self.request_exit();
        self.join()
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to test server");
        Self { stream }
    }

    /// Connects and completes admission, leaving the client at the main menu.
    fn join(addr: SocketAddr, name: &str) -> Self {
        let client = Self::connect(addr);
        client.send(MessageType::ClientRequest, &[name]);
        client.expect(MessageType::ServerApproved);
        client.expect(MessageType::ServerMainMenu);
        client
    }

    fn send(&self, kind: MessageType, params: &[&str]) {
        send_message(&self.stream, &Message::with_params(kind, params)).expect("send message");
    }

    fn receive(&self) -> Result<Message, TransferError> {
        receive_message(&self.stream, ReceiveTimeout::Bounded(RECEIVE_LIMIT))
    }

    fn expect(&self, kind: MessageType) -> Message {
        let message = self.receive().expect("receive message");
        assert_eq!(message.kind, kind, "unexpected message {}", message);
        message
    }

    /// Waits for the server to close its side of the connection.
    fn expect_closed(&self) {
        match self.receive() {
            Err(TransferError::Disconnected) | Err(TransferError::Failed(_)) => {}
            other => panic!("expected the server to close, got {:?}", other),
        }
    }

    fn quit(self) {
        self.send(MessageType::ClientDisconnect, &[]);
        self.expect_closed();
    }
}

/// Both players reach the code setup step of a fresh match.
fn start_match(addr: SocketAddr) -> (TestClient, TestClient) {
    let alice = TestClient::join(addr, "alice");
    let bob = TestClient::join(addr, "bob");

    alice.send(MessageType::ClientVersus, &[]);
    bob.send(MessageType::ClientVersus, &[]);

    let invite = alice.expect(MessageType::ServerInvite);
    assert_eq!(invite.param_str(0), "bob");
    let invite = bob.expect(MessageType::ServerInvite);
    assert_eq!(invite.param_str(0), "alice");

    alice.expect(MessageType::ServerSetupRequest);
    bob.expect(MessageType::ServerSetupRequest);
    (alice, bob)
}

/// GAME FLOW TESTS
mod game_flow_tests {
    use super::*;

    #[test]
    fn alice_wins_against_bob() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        alice.send(MessageType::ClientSetup, &["5678"]);
        bob.send(MessageType::ClientSetup, &["1234"]);

        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);

        alice.send(MessageType::ClientPlayerMove, &["1234"]);
        bob.send(MessageType::ClientPlayerMove, &["9999"]);

        let win = alice.expect(MessageType::ServerWin);
        assert_eq!(win.param_str(0), "alice");
        assert_eq!(win.param_str(1), "1234");

        let win = bob.expect(MessageType::ServerWin);
        assert_eq!(win.param_str(0), "alice");
        assert_eq!(win.param_str(1), "5678");

        alice.expect(MessageType::ServerMainMenu);
        bob.expect(MessageType::ServerMainMenu);
        alice.quit();
        bob.quit();

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
        assert_eq!(
            summary.outcomes,
            vec![
                SessionOutcome::PlayerLeftSession,
                SessionOutcome::PlayerLeftSession
            ]
        );
    }

    #[test]
    fn rounds_report_bulls_and_cows_until_a_draw() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        alice.send(MessageType::ClientSetup, &["1234"]);
        bob.send(MessageType::ClientSetup, &["5678"]);

        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);
        alice.send(MessageType::ClientPlayerMove, &["5687"]);
        bob.send(MessageType::ClientPlayerMove, &["4321"]);

        let results = alice.expect(MessageType::ServerGameResults);
        assert_eq!(results.param_str(0), "2");
        assert_eq!(results.param_str(1), "2");
        assert_eq!(results.param_str(2), "bob");
        assert_eq!(results.param_str(3), "4321");

        let results = bob.expect(MessageType::ServerGameResults);
        assert_eq!(results.param_str(0), "0");
        assert_eq!(results.param_str(1), "4");
        assert_eq!(results.param_str(2), "alice");
        assert_eq!(results.param_str(3), "5687");

        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);
        alice.send(MessageType::ClientPlayerMove, &["5678"]);
        bob.send(MessageType::ClientPlayerMove, &["1234"]);

        alice.expect(MessageType::ServerDraw);
        bob.expect(MessageType::ServerDraw);
        alice.expect(MessageType::ServerMainMenu);
        bob.expect(MessageType::ServerMainMenu);

        alice.quit();
        bob.quit();
        assert!(server.stop().succeeded());
    }

    #[test]
    fn players_can_rematch_after_a_game() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        alice.send(MessageType::ClientSetup, &["1111"]);
        bob.send(MessageType::ClientSetup, &["2222"]);
        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);
        alice.send(MessageType::ClientPlayerMove, &["2222"]);
        bob.send(MessageType::ClientPlayerMove, &["3333"]);
        alice.expect(MessageType::ServerWin);
        bob.expect(MessageType::ServerWin);
        alice.expect(MessageType::ServerMainMenu);
        bob.expect(MessageType::ServerMainMenu);

        bob.send(MessageType::ClientVersus, &[]);
        alice.send(MessageType::ClientVersus, &[]);
        assert_eq!(alice.expect(MessageType::ServerInvite).param_str(0), "bob");
        assert_eq!(bob.expect(MessageType::ServerInvite).param_str(0), "alice");
        alice.expect(MessageType::ServerSetupRequest);
        bob.expect(MessageType::ServerSetupRequest);

        alice.send(MessageType::ClientSetup, &["9876"]);
        bob.send(MessageType::ClientSetup, &["6789"]);
        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);
        alice.send(MessageType::ClientPlayerMove, &["0000"]);
        bob.send(MessageType::ClientPlayerMove, &["9876"]);

        let win = alice.expect(MessageType::ServerWin);
        assert_eq!(win.param_str(0), "bob");
        assert_eq!(win.param_str(1), "6789");
        let win = bob.expect(MessageType::ServerWin);
        assert_eq!(win.param_str(0), "bob");
        assert_eq!(win.param_str(1), "9876");

        alice.expect(MessageType::ServerMainMenu);
        bob.expect(MessageType::ServerMainMenu);
        alice.quit();
        bob.quit();
        assert!(server.stop().succeeded());
    }

    #[test]
    fn lone_client_finds_no_opponents() {
        let server = TestServer::start(test_timeouts());
        let alice = TestClient::join(server.addr, "alice");

        alice.send(MessageType::ClientVersus, &[]);
        alice.expect(MessageType::ServerNoOpponents);
        alice.expect(MessageType::ServerMainMenu);
        alice.quit();

        let summary = server.stop();
        assert!(summary.succeeded());
        assert_eq!(summary.outcomes, vec![SessionOutcome::PlayerLeftSession]);
    }

    #[test]
    fn opponent_dropping_during_setup_is_reported() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        drop(bob);
        alice.send(MessageType::ClientSetup, &["1234"]);
        alice.expect(MessageType::ServerOpponentQuit);
        alice.expect(MessageType::ServerMainMenu);

        // Bob's worker uncounts itself just after dissolving the pairing
        thread::sleep(Duration::from_millis(200));
        alice.send(MessageType::ClientVersus, &[]);
        alice.expect(MessageType::ServerNoOpponents);
        alice.expect(MessageType::ServerMainMenu);
        alice.quit();

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
        assert!(summary
            .outcomes
            .contains(&SessionOutcome::GracefullyDisconnected));
    }

    #[test]
    fn opponent_dropping_mid_game_is_reported() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        alice.send(MessageType::ClientSetup, &["1234"]);
        bob.send(MessageType::ClientSetup, &["5678"]);
        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);

        alice.send(MessageType::ClientPlayerMove, &["9999"]);
        bob.send(MessageType::ClientPlayerMove, &["4321"]);
        let results = alice.expect(MessageType::ServerGameResults);
        assert_eq!(results.param_str(3), "4321");
        bob.expect(MessageType::ServerGameResults);
        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);

        drop(bob);
        alice.send(MessageType::ClientPlayerMove, &["5678"]);
        alice.expect(MessageType::ServerOpponentQuit);
        alice.expect(MessageType::ServerMainMenu);
        alice.quit();

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
        assert!(summary
            .outcomes
            .contains(&SessionOutcome::GracefullyDisconnected));
    }

    #[test]
    fn silent_opponent_times_out_the_round() {
        let timeouts = Timeouts {
            long_receive: Duration::from_secs(1),
            ..test_timeouts()
        };
        let server = TestServer::start(timeouts);
        let (alice, bob) = start_match(server.addr);

        alice.send(MessageType::ClientSetup, &["1234"]);
        bob.send(MessageType::ClientSetup, &["5678"]);
        alice.expect(MessageType::ServerPlayerMoveRequest);
        bob.expect(MessageType::ServerPlayerMoveRequest);

        // Bob never guesses
        alice.send(MessageType::ClientPlayerMove, &["5678"]);
        alice.expect(MessageType::ServerOpponentQuit);
        alice.expect(MessageType::ServerMainMenu);
        alice.quit();

        bob.expect_closed();
        drop(bob);

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
        assert!(summary.outcomes.contains(&SessionOutcome::TimedOut));
    }

    #[test]
    fn invalid_code_closes_the_connection() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        alice.send(MessageType::ClientSetup, &["12a4"]);
        alice.expect_closed();
        drop(alice);

        bob.send(MessageType::ClientSetup, &["4321"]);
        bob.expect(MessageType::ServerOpponentQuit);
        bob.expect(MessageType::ServerMainMenu);
        bob.quit();

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
    }
}

/// ADMISSION TESTS
mod admission_tests {
    use super::*;

    #[test]
    fn third_client_is_denied() {
        let server = TestServer::start(test_timeouts());
        let alice = TestClient::join(server.addr, "alice");
        let bob = TestClient::join(server.addr, "bob");

        let carol = TestClient::connect(server.addr);
        carol.send(MessageType::ClientRequest, &["carol"]);
        carol.expect(MessageType::ServerDenied);
        carol.expect_closed();
        drop(carol);

        alice.quit();
        bob.quit();

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
        assert!(summary.outcomes.contains(&SessionOutcome::ConnectionDenied));
    }

    #[test]
    fn connection_beyond_the_pool_is_dropped() {
        let server = TestServer::start(test_timeouts());
        let alice = TestClient::join(server.addr, "alice");
        let bob = TestClient::join(server.addr, "bob");
        // Occupies the last slot without sending its join request yet
        let carol = TestClient::connect(server.addr);

        let dave = TestClient::connect(server.addr);
        dave.expect_closed();

        carol.send(MessageType::ClientRequest, &["carol"]);
        carol.expect(MessageType::ServerDenied);
        carol.expect_closed();
        drop(carol);

        alice.quit();
        bob.quit();
        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
        assert_eq!(summary.outcomes.len(), 3);
    }

    #[test]
    fn slot_is_reused_after_a_player_leaves() {
        let server = TestServer::start(test_timeouts());
        let alice = TestClient::join(server.addr, "alice");
        alice.quit();

        let bob = TestClient::join(server.addr, "bob");
        bob.quit();

        let summary = server.stop();
        assert!(summary.succeeded());
        assert_eq!(summary.outcomes.len(), 2);
    }

    #[test]
    fn wrong_first_message_is_rejected() {
        let server = TestServer::start(test_timeouts());
        let client = TestClient::connect(server.addr);
        client.send(MessageType::ClientVersus, &[]);
        client.expect_closed();
        drop(client);

        let summary = server.stop();
        assert!(summary.succeeded(), "{:?}", summary);
    }
}

/// SHUTDOWN TESTS
mod shutdown_tests {
    use super::*;

    #[test]
    fn idle_server_stops_cleanly() {
        let server = TestServer::start(test_timeouts());
        let summary = server.stop();
        assert!(summary.succeeded());
        assert!(summary.outcomes.is_empty());
    }

    #[test]
    fn exit_mid_rendezvous_lets_both_workers_finish() {
        let server = TestServer::start(test_timeouts());
        let (alice, bob) = start_match(server.addr);

        // Alice's worker blocks waiting for bob's code
        alice.send(MessageType::ClientSetup, &["1234"]);
        server.request_exit();
        alice.expect_closed();
        drop(alice);

        // Bob's worker notices the exit at its next phase boundary
        bob.send(MessageType::ClientSetup, &["5678"]);
        bob.expect_closed();
        drop(bob);

        let summary = server.join();
        assert!(summary.succeeded(), "{:?}", summary);
        assert_eq!(summary.forced_terminations, 0);
        assert_eq!(
            summary.outcomes,
            vec![SessionOutcome::ShuttingDown, SessionOutcome::ShuttingDown]
        );
    }

    #[test]
    fn idle_connection_is_force_terminated() {
        let timeouts = Timeouts {
            exit_grace: Duration::from_millis(300),
            ..test_timeouts()
        };
        let server = TestServer::start(timeouts);
        let alice = TestClient::join(server.addr, "alice");

        // Alice's worker sits in a long receive at the main menu
        let summary = server.stop();
        assert_eq!(summary.forced_terminations, 1);
        assert!(!summary.succeeded());
        alice.expect_closed();
    }

    #[test]
    fn raised_error_fails_the_run() {
        let server = TestServer::start(test_timeouts());
        server.signals.raise_error();
        let summary = server.join();
        assert!(summary.error_raised);
        assert!(!summary.succeeded());
    }
}

/// CLIENT TESTS
mod client_tests {
    use super::*;
    use client::game::{play, ClientConfig, SessionEnd};
    use client::input::Terminal;
    use client::rendering;
    use client::Connection;

    #[tokio::test]
    async fn client_session_against_real_server() {
        let server = TestServer::start(test_timeouts());
        let config = ClientConfig::new("127.0.0.1", server.addr.port(), "alice");

        let connection = Connection::connect(&config.addr()).await.unwrap();
        let mut terminal = Terminal::new(&b"1\n2\n"[..], Vec::new());
        let end = play(connection, &mut terminal, &config).await.unwrap();
        assert_eq!(end, SessionEnd::Quit);

        let output = String::from_utf8(terminal.into_output()).unwrap();
        assert!(output.contains(rendering::NO_OPPONENTS));
        assert_eq!(output.matches(rendering::MAIN_MENU).count(), 2);

        let summary = tokio::task::spawn_blocking(move || server.stop())
            .await
            .unwrap();
        assert!(summary.succeeded(), "{:?}", summary);
    }

    #[tokio::test]
    async fn client_is_told_when_denied() {
        let server = TestServer::start(test_timeouts());
        let alice = TestClient::join(server.addr, "alice");
        let bob = TestClient::join(server.addr, "bob");

        let config = ClientConfig::new("127.0.0.1", server.addr.port(), "carol");
        let connection = Connection::connect(&config.addr()).await.unwrap();
        let mut terminal = Terminal::new(&b""[..], Vec::new());
        let end = play(connection, &mut terminal, &config).await.unwrap();
        assert_eq!(end, SessionEnd::Denied);

        let summary = tokio::task::spawn_blocking(move || {
            alice.quit();
            bob.quit();
            server.stop()
        })
        .await
        .unwrap();
        assert!(summary.succeeded(), "{:?}", summary);
    }
}
