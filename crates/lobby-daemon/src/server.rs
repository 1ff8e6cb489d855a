//! Server setup and lifecycle management

use crate::config::DaemonConfig;
use crate::console::Console;
use crate::error::DaemonResult;
use lobby_runtime::{
    spawn_janitors, AccountLinks, Collaborators, JsonFileStore, Lobby, PlatformGateway,
    QueueReconciler, SimulatedPlatform, SystemClock,
};
use lobby_types::ChannelId;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lobby daemon server
pub struct Server {
    config: DaemonConfig,
    lobby: Arc<Lobby>,
    platform: Arc<SimulatedPlatform>,
}

impl Server {
    /// Load persisted state and wire the lobby to the simulated platform
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store = Arc::new(JsonFileStore::new(&config.storage.data_dir));
        let links = Arc::new(AccountLinks::load(store.clone(), config.party.min_account_name_len).await?);

        let platform = Arc::new(SimulatedPlatform::with_channels(known_channels(&config)));

        let lobby = Lobby::load(
            &config.runtime(),
            Collaborators {
                store,
                links,
                platform: platform.clone(),
                notifier: platform.clone(),
                clock: Arc::new(SystemClock),
            },
        )
        .await?;

        Ok(Self {
            config,
            lobby: Arc::new(lobby),
            platform,
        })
    }

    pub fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    /// Run the reconciler, janitors and console until the console input
    /// closes or a shutdown signal arrives
    pub async fn run<R, W>(self, input: R, output: W) -> DaemonResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));
        self.serve(input, output, shutdown).await
    }

    /// Like [`run`](Self::run), stopped only by EOF or `shutdown`
    pub async fn serve<R, W>(self, input: R, output: W, shutdown: CancellationToken) -> DaemonResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (reconciler, rx) = QueueReconciler::new(
            self.config.queue.clone(),
            self.platform.clone(),
            self.lobby.links().clone(),
            self.platform.clone(),
        );
        let handle = reconciler.handle();

        let mut tasks = vec![
            reconciler.spawn(rx, shutdown.clone()),
            handle.forward(self.platform.subscribe(), shutdown.clone()),
        ];
        tasks.extend(spawn_janitors(
            self.lobby.clone(),
            &self.config.janitor,
            shutdown.clone(),
        ));

        info!(
            data_dir = %self.config.storage.data_dir.display(),
            queue_channels = ?self.config.queue.channels,
            "Lobby daemon ready"
        );

        let console = Console::new(self.lobby.clone(), self.platform.clone(), handle);
        let result = console.run(input, output, shutdown.clone()).await;

        info!("Lobby daemon shutting down");
        shutdown.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        result
    }
}

/// Every channel the configuration names
fn known_channels(config: &DaemonConfig) -> Vec<ChannelId> {
    let mut channels = config.queue.channels.clone();
    channels.extend(config.queue.fixed_targets());
    channels.push(config.session.lobby_channel);
    channels
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM. A handler that cannot be
/// installed is logged and leaves shutdown to console EOF.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(e) => {
                warn!(error = %e, "Ctrl-C handler unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "terminate"
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let received = tokio::select! {
        _ = shutdown.cancelled() => return,
        signal = interrupt => signal,
        signal = terminate => signal,
    };
    info!(signal = received, "Signal received, shutting down");
    shutdown.cancel();
}
