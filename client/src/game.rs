//! Client side of a game session and the reconnect loop around it

use crate::input::{MenuChoice, Terminal};
use crate::network::{ClientError, Connection, Result};
use crate::rendering;
use log::{info, warn};
use shared::{Message, MessageType, SHORT_RECEIVE_TIMEOUT};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub port: u16,
    pub name: String,
    pub short_receive: Duration,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            name: name.into(),
            short_receive: SHORT_RECEIVE_TIMEOUT,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// How a session with the server ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The player chose to quit from the main menu
    Quit,
    /// The server refused the join request
    Denied,
}

/// Runs one session over an established connection.
pub async fn play<S, R, W>(
    mut connection: Connection<S>,
    terminal: &mut Terminal<R, W>,
    config: &ClientConfig,
) -> Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    connection
        .send(&Message::with_params(
            MessageType::ClientRequest,
            &[config.name.as_str()],
        ))
        .await?;

    let reply = connection.receive(Some(config.short_receive)).await?;
    match reply.kind {
        MessageType::ServerApproved => info!("Server approved {}", config.name),
        MessageType::ServerDenied => {
            terminal.say(&rendering::denied(&config.addr())).await?;
            connection.close().await;
            return Ok(SessionEnd::Denied);
        }
        got => {
            return Err(ClientError::Unexpected {
                expected: "SERVER_APPROVED or SERVER_DENIED",
                got,
            })
        }
    }

    loop {
        let menu = connection.receive(None).await?;
        expect(&menu, MessageType::ServerMainMenu, "SERVER_MAIN_MENU")?;
        terminal.say(rendering::MAIN_MENU).await?;

        if terminal.choice().await? == MenuChoice::Second {
            connection
                .send(&Message::new(MessageType::ClientDisconnect))
                .await?;
            connection.close().await;
            return Ok(SessionEnd::Quit);
        }
        connection
            .send(&Message::new(MessageType::ClientVersus))
            .await?;

        let reply = connection.receive(None).await?;
        match reply.kind {
            MessageType::ServerNoOpponents => terminal.say(rendering::NO_OPPONENTS).await?,
            MessageType::ServerInvite => {
                info!("Invited to play against {}", reply.param_str(0));
                terminal.say(rendering::GAME_ON).await?;
                play_match(&mut connection, terminal).await?;
            }
            got => {
                return Err(ClientError::Unexpected {
                    expected: "SERVER_INVITE or SERVER_NO_OPPONENTS",
                    got,
                })
            }
        }
    }
}

async fn play_match<S, R, W>(
    connection: &mut Connection<S>,
    terminal: &mut Terminal<R, W>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = connection.receive(None).await?;
    match request.kind {
        MessageType::ServerSetupRequest => {
            let code = terminal.digits(rendering::SETUP_PROMPT).await?;
            connection
                .send(&Message::with_params(MessageType::ClientSetup, &[code]))
                .await?;
        }
        MessageType::ServerOpponentQuit => {
            terminal.say(rendering::OPPONENT_QUIT).await?;
            return Ok(());
        }
        got => {
            return Err(ClientError::Unexpected {
                expected: "SERVER_SETUP_REQUSET",
                got,
            })
        }
    }

    loop {
        let message = connection.receive(None).await?;
        match message.kind {
            MessageType::ServerPlayerMoveRequest => {
                let guess = terminal.digits(rendering::GUESS_PROMPT).await?;
                connection
                    .send(&Message::with_params(
                        MessageType::ClientPlayerMove,
                        &[guess],
                    ))
                    .await?;
            }
            MessageType::ServerGameResults => {
                let text = rendering::round_results(
                    &message.param_str(0),
                    &message.param_str(1),
                    &message.param_str(2),
                    &message.param_str(3),
                );
                terminal.say(&text).await?;
            }
            MessageType::ServerWin => {
                let text = rendering::win(&message.param_str(0), &message.param_str(1));
                terminal.say(&text).await?;
                return Ok(());
            }
            MessageType::ServerDraw => {
                terminal.say(rendering::DRAW).await?;
                return Ok(());
            }
            MessageType::ServerOpponentQuit => {
                terminal.say(rendering::OPPONENT_QUIT).await?;
                return Ok(());
            }
            got => {
                return Err(ClientError::Unexpected {
                    expected: "a game message",
                    got,
                })
            }
        }
    }
}

fn expect(message: &Message, kind: MessageType, expected: &'static str) -> Result<()> {
    if message.kind == kind {
        Ok(())
    } else {
        Err(ClientError::Unexpected {
            expected,
            got: message.kind,
        })
    }
}

/// Interactive client: connects, plays sessions, and offers to reconnect
/// whenever the connection is refused or lost.
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub async fn run<R, W>(&self, terminal: &mut Terminal<R, W>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let addr = self.config.addr();
        loop {
            let failed = match Connection::connect(&addr).await {
                Ok(connection) => {
                    terminal.say(&rendering::connected(&addr)).await?;
                    match play(connection, terminal, &self.config).await {
                        Ok(SessionEnd::Quit) => return Ok(()),
                        Ok(SessionEnd::Denied) => false,
                        Err(e @ ClientError::InputClosed) | Err(e @ ClientError::Io(_)) => {
                            return Err(e)
                        }
                        Err(e) => {
                            warn!("Session with {} ended: {}", addr, e);
                            true
                        }
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    true
                }
            };

            if failed {
                terminal.say(&rendering::connection_failed(&addr)).await?;
            }
            terminal.say(rendering::RECONNECT_MENU).await?;
            if terminal.choice().await? == MenuChoice::Second {
                return Ok(());
            }
        }
    }
}
