//! Queue channel reconciler
//!
//! Watches the configured queue channels and, once a channel has held at
//! least quorum and stayed unchanged for the debounce period, moves a
//! random sample of its occupants into a target pair.
//!
//! The reconciler is a single task that owns every [`QueueSnapshot`]. Voice
//! events and pass completions arrive over one mpsc channel, and one timer
//! tracks the earliest countdown deadline. Passes run in their own task so
//! slow platform calls never block event intake; while a pass is in flight
//! the channel ignores events until the pass reports back.

mod snapshot;

pub use snapshot::{Observation, QueuePhase, QueueSnapshot};

use crate::config::QueueConfig;
use crate::gateway::{IdentityLinkLookup, NotificationSink, PlatformGateway};
use crate::split::{assign_alternating, execute_moves, notify_groups, sample, SplitOutcome, SplitPlan, SplitPolicy};
use lobby_types::{ChannelId, PlatformResult, UserId, VoiceStateChange};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MESSAGE_BUFFER: usize = 256;
const REPORT_BUFFER: usize = 64;

/// Messages processed by the reconciler task
#[derive(Debug)]
pub enum ReconcilerMessage {
    /// A user's voice channel changed
    VoiceStateChanged(VoiceStateChange),
    /// A pass for `channel` completed
    PassFinished {
        channel: ChannelId,
        result: Option<PassReport>,
    },
    /// Read the state of one channel
    Status {
        channel: ChannelId,
        reply: oneshot::Sender<Option<ChannelStatus>>,
    },
}

/// Point-in-time view of one monitored channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub phase: QueuePhase,
    pub last_seen: usize,
    pub remaining: Option<Duration>,
}

/// What one reconciliation pass did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub channel: ChannelId,
    /// Occupants read when the pass started
    pub occupants: BTreeSet<UserId>,
    /// `None` if the channel had dropped below quorum
    #[serde(skip)]
    pub plan: Option<SplitPlan>,
    pub outcome: SplitOutcome,
}

/// Cloneable handle used to feed and inspect the reconciler
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcilerMessage>,
    reports: broadcast::Sender<PassReport>,
}

impl ReconcilerHandle {
    /// Deliver a voice state change. Returns false once the reconciler is gone.
    pub async fn voice_state_changed(&self, change: VoiceStateChange) -> bool {
        self.tx
            .send(ReconcilerMessage::VoiceStateChanged(change))
            .await
            .is_ok()
    }

    /// State of a monitored channel
    pub async fn status(&self, channel: ChannelId) -> Option<ChannelStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ReconcilerMessage::Status { channel, reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Reports of completed passes
    pub fn subscribe_reports(&self) -> broadcast::Receiver<PassReport> {
        self.reports.subscribe()
    }

    /// Pump a platform event stream into the reconciler until shutdown
    pub fn forward(
        &self,
        mut events: broadcast::Receiver<VoiceStateChange>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(change) => {
                            if !handle.voice_state_changed(change).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Occupancy is re-read on the next event
                            warn!(skipped = skipped, "Voice event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Voice event forwarder stopped");
        })
    }
}

/// Everything a pass needs, shared between passes
#[derive(Clone)]
struct PassContext {
    policy: SplitPolicy,
    notify_channel: Option<ChannelId>,
    platform: Arc<dyn PlatformGateway>,
    links: Arc<dyn IdentityLinkLookup>,
    notifier: Arc<dyn NotificationSink>,
    rng: Arc<Mutex<StdRng>>,
}

/// Debounce-and-split reconciler for queue channels
pub struct QueueReconciler {
    config: QueueConfig,
    context: PassContext,
    snapshots: HashMap<ChannelId, QueueSnapshot>,
    in_flight: HashMap<ChannelId, CancellationToken>,
    tx: mpsc::Sender<ReconcilerMessage>,
    reports: broadcast::Sender<PassReport>,
}

impl QueueReconciler {
    /// Create a reconciler and the receiver its [`run`](Self::run) loop consumes
    pub fn new(
        config: QueueConfig,
        platform: Arc<dyn PlatformGateway>,
        links: Arc<dyn IdentityLinkLookup>,
        notifier: Arc<dyn NotificationSink>,
    ) -> (Self, mpsc::Receiver<ReconcilerMessage>) {
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let (reports, _) = broadcast::channel(REPORT_BUFFER);

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let snapshots = config
            .channels
            .iter()
            .map(|c| (*c, QueueSnapshot::new()))
            .collect();

        let reconciler = Self {
            context: PassContext {
                policy: SplitPolicy::from_config(&config),
                notify_channel: config.notify_channel,
                platform,
                links,
                notifier,
                rng: Arc::new(Mutex::new(rng)),
            },
            config,
            snapshots,
            in_flight: HashMap::new(),
            tx,
            reports,
        };
        (reconciler, rx)
    }

    pub fn handle(&self) -> ReconcilerHandle {
        ReconcilerHandle {
            tx: self.tx.clone(),
            reports: self.reports.clone(),
        }
    }

    /// Spawn the reconciler task
    pub fn spawn(self, rx: mpsc::Receiver<ReconcilerMessage>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, shutdown))
    }

    /// Event loop. Returns when `shutdown` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ReconcilerMessage>, shutdown: CancellationToken) {
        info!(channels = ?self.config.channels, "Queue reconciler started");

        loop {
            let next_deadline = self.next_deadline();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                _ = wait_until(next_deadline) => self.start_due_passes(),
            }
        }

        let countdowns = self.snapshots.values().filter_map(QueueSnapshot::countdown_token);
        for token in countdowns.chain(self.in_flight.values().cloned()) {
            token.cancel();
        }
        info!("Queue reconciler stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.snapshots.values().filter_map(QueueSnapshot::deadline).min()
    }

    async fn handle_message(&mut self, message: ReconcilerMessage) {
        match message {
            ReconcilerMessage::VoiceStateChanged(change) => {
                for channel in change.affected_channels() {
                    if self.snapshots.contains_key(&channel) {
                        self.refresh(channel).await;
                    }
                }
            }
            ReconcilerMessage::PassFinished { channel, result } => {
                self.finish_pass(channel, result).await;
            }
            ReconcilerMessage::Status { channel, reply } => {
                let _ = reply.send(self.status(channel));
            }
        }
    }

    fn status(&self, channel: ChannelId) -> Option<ChannelStatus> {
        let snapshot = self.snapshots.get(&channel)?;
        let now = Instant::now();
        Some(ChannelStatus {
            channel,
            phase: snapshot.phase(),
            last_seen: snapshot.last_seen().len(),
            remaining: snapshot.deadline().map(|d| d.saturating_duration_since(now)),
        })
    }

    /// Re-read a channel's occupants and feed them to its snapshot
    async fn refresh(&mut self, channel: ChannelId) {
        if self
            .snapshots
            .get(&channel)
            .is_some_and(QueueSnapshot::is_reconciling)
        {
            debug!(channel = %channel, "Pass in flight, ignoring voice event");
            return;
        }

        let occupants = match self.context.platform.list_occupants(channel).await {
            Ok(occupants) => occupants,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Failed to read queue occupants");
                return;
            }
        };

        let Some(snapshot) = self.snapshots.get_mut(&channel) else {
            return;
        };
        let observation = snapshot.observe(
            occupants,
            self.config.quorum,
            self.config.debounce(),
            Instant::now(),
        );
        match observation {
            Observation::Armed {
                occupants,
                restarted,
            } => debug!(
                channel = %channel,
                occupants = occupants,
                restarted = restarted,
                "Countdown armed"
            ),
            Observation::BelowQuorum { occupants } => {
                debug!(channel = %channel, occupants = occupants, "Below quorum")
            }
            Observation::Unchanged | Observation::Ignored => {}
        }
    }

    fn start_due_passes(&mut self) {
        let now = Instant::now();
        let due: Vec<ChannelId> = self
            .snapshots
            .iter()
            .filter(|(_, s)| s.is_due(now))
            .map(|(c, _)| *c)
            .collect();

        for channel in due {
            let Some(token) = self
                .snapshots
                .get_mut(&channel)
                .and_then(QueueSnapshot::begin_pass)
            else {
                continue;
            };
            info!(channel = %channel, "Queue settled, starting split");
            self.spawn_pass(channel, token);
        }
    }

    fn spawn_pass(&mut self, channel: ChannelId, token: CancellationToken) {
        let context = self.context.clone();
        let tx = self.tx.clone();
        self.in_flight.insert(channel, token.clone());

        let pass = tokio::spawn(async move { context.run_pass(channel, token).await });
        tokio::spawn(async move {
            let result = match pass.await {
                Ok(Ok(report)) => Some(report),
                Ok(Err(e)) => {
                    warn!(channel = %channel, error = %e, "Reconciliation pass failed");
                    None
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Reconciliation pass aborted");
                    None
                }
            };
            let _ = tx
                .send(ReconcilerMessage::PassFinished { channel, result })
                .await;
        });
    }

    async fn finish_pass(&mut self, channel: ChannelId, result: Option<PassReport>) {
        self.in_flight.remove(&channel);
        let Some(snapshot) = self.snapshots.get_mut(&channel) else {
            return;
        };
        snapshot.finish_pass(result.as_ref().map(|r| r.occupants.clone()));

        if let Some(report) = result {
            info!(
                channel = %channel,
                moved = report.outcome.moved.len(),
                failed = report.outcome.failed.len(),
                "Split pass finished"
            );
            let _ = self.reports.send(report);
        }

        // Events that arrived during the pass were dropped; catch up now
        self.refresh(channel).await;
    }
}

impl PassContext {
    async fn run_pass(&self, channel: ChannelId, token: CancellationToken) -> PlatformResult<PassReport> {
        let occupants = self.platform.list_occupants(channel).await?;

        let plan = if token.is_cancelled() {
            None
        } else {
            self.policy.plan(occupants.len())
        };
        let Some(plan) = plan else {
            debug!(channel = %channel, occupants = occupants.len(), "No split at settle time");
            return Ok(PassReport {
                channel,
                occupants,
                plan: None,
                outcome: SplitOutcome::default(),
            });
        };

        let pool: Vec<UserId> = occupants.iter().copied().collect();
        let selected = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            sample(&mut *rng, &pool, plan.move_count)
        };
        let assignments = assign_alternating(&selected, plan.targets);
        let mut outcome = execute_moves(self.platform.as_ref(), &assignments).await;

        // One party command per target, in sample order
        let mut groups = [Vec::new(), Vec::new()];
        for (i, user) in selected.iter().enumerate() {
            if outcome.failed.contains(user) {
                continue;
            }
            if let Some(name) = self.links.lookup(*user).await {
                groups[i % 2].push(name);
            }
        }
        outcome.notified = notify_groups(self.notifier.as_ref(), self.notify_channel, &groups).await;

        Ok(PassReport {
            channel,
            occupants,
            plan: Some(plan),
            outcome,
        })
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
