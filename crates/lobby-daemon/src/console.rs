//! Line-oriented JSON console
//!
//! Reads one command per line and writes one JSON result per line. Voice
//! commands drive the simulated platform, so their events flow through the
//! reconciler exactly as platform events would.

use crate::error::{DaemonError, DaemonResult};
use lobby_runtime::{LeaveOutcome, Lobby, ReconcilerHandle, SimulatedPlatform};
use lobby_types::{ChannelId, LobbyError, LobbyResult, UserId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A console command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Connect a user to a voice channel
    Join { user: UserId, channel: ChannelId },
    /// Disconnect a user from voice
    Leave { user: UserId },
    Create { user: UserId },
    Invite { user: UserId, target: UserId },
    Accept { user: UserId },
    Decline { user: UserId },
    LeaveParty { user: UserId },
    Kick { user: UserId, target: UserId },
    Promote { user: UserId, target: UserId },
    Disband { user: UserId },
    List { user: UserId },
    Link { user: UserId, name: String },
    Unlink { user: UserId },
    Queue { user: UserId },
    ForceQueue { user: UserId },
    Requeue { user: UserId },
    EndSession { user: UserId },
    /// Users currently in a voice channel
    Occupants { channel: ChannelId },
    /// Reconciler state of a queue channel
    Status { channel: ChannelId },
}

/// Executes console commands against a running lobby
pub struct Console {
    lobby: Arc<Lobby>,
    platform: Arc<SimulatedPlatform>,
    reconciler: ReconcilerHandle,
}

impl Console {
    pub fn new(lobby: Arc<Lobby>, platform: Arc<SimulatedPlatform>, reconciler: ReconcilerHandle) -> Self {
        Self {
            lobby,
            platform,
            reconciler,
        }
    }

    /// Execute one command
    pub async fn execute(&self, command: Command) -> LobbyResult<Value> {
        let lobby = &self.lobby;
        let value = match command {
            Command::Join { user, channel } => {
                self.platform.join(user, channel);
                Value::Null
            }
            Command::Leave { user } => {
                self.platform.disconnect(user);
                Value::Null
            }
            Command::Create { user } => json!(lobby.create_party(user).await?),
            Command::Invite { user, target } => json!(lobby.invite(user, target).await?),
            Command::Accept { user } => json!(lobby.accept(user).await?),
            Command::Decline { user } => json!({ "inviter": lobby.decline(user).await? }),
            Command::LeaveParty { user } => match lobby.leave(user).await? {
                LeaveOutcome::Disbanded(party) => json!({ "disbanded": party }),
                LeaveOutcome::Left(party) => json!({ "left": party }),
            },
            Command::Kick { user, target } => json!(lobby.kick(user, target).await?),
            Command::Promote { user, target } => json!(lobby.promote(user, target).await?),
            Command::Disband { user } => json!(lobby.disband(user).await?),
            Command::List { user } => json!(lobby.list(user).await?),
            Command::Link { user, name } => {
                lobby.link(user, &name).await?;
                Value::Null
            }
            Command::Unlink { user } => json!({ "account": lobby.unlink(user).await? }),
            Command::Queue { user } => json!(lobby.queue_party(user).await?),
            Command::ForceQueue { user } => json!(lobby.force_queue(user).await?),
            Command::Requeue { user } => json!(lobby.requeue(user).await?),
            Command::EndSession { user } => json!(lobby.end_session(user).await?),
            Command::Occupants { channel } => json!(self.platform.occupants(channel)),
            Command::Status { channel } => json!(self.reconciler.status(channel).await),
        };
        Ok(value)
    }

    /// Handle one input line; blank lines produce no output
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<Command>(line) {
            Ok(command) => {
                debug!(command = ?command, "Console command");
                match self.execute(command).await {
                    Ok(value) => json!({ "ok": value }),
                    Err(e) => error_response(&e),
                }
            }
            Err(e) => json!({ "error": format!("invalid command: {e}"), "category": "invalid" }),
        };
        Some(response.to_string())
    }

    /// Serve commands from `input` until EOF or `shutdown`
    pub async fn run<R, W>(&self, input: R, mut output: W, shutdown: CancellationToken) -> DaemonResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line.map_err(|e| DaemonError::Console(e.to_string()))?,
            };
            let Some(line) = line else {
                info!("Console input closed");
                break;
            };
            if let Some(response) = self.handle_line(&line).await {
                output.write_all(response.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }
        Ok(())
    }
}

fn error_response(e: &LobbyError) -> Value {
    json!({ "error": e.to_string(), "category": e.category().as_str() })
}
