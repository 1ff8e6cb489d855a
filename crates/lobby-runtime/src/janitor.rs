//! Background sweeps for idle parties and expired invites

use crate::config::JanitorConfig;
use crate::lobby::Lobby;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawn the party and invite sweeps. Both stop when `shutdown` fires.
pub fn spawn_janitors(
    lobby: Arc<Lobby>,
    config: &JanitorConfig,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let party_sweep = {
        let lobby = lobby.clone();
        let shutdown = shutdown.clone();
        let period = Duration::from_secs(config.party_sweep_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = lobby.sweep_idle_parties().await {
                            error!(error = %e, "Idle party sweep failed");
                        }
                    }
                }
            }
            info!("Party sweep stopped");
        })
    };

    let invite_sweep = {
        let period = Duration::from_secs(config.invite_sweep_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        lobby.sweep_invites().await;
                    }
                }
            }
            info!("Invite sweep stopped");
        })
    };

    vec![party_sweep, invite_sweep]
}
