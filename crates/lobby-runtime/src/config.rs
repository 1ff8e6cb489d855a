//! Runtime configuration sections

use lobby_types::ChannelId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregate runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub party: PartyConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Party and invite lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyConfig {
    /// Parties idle for longer than this are removed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Invites older than this are expired
    #[serde(default = "default_invite_ttl")]
    pub invite_ttl_secs: u64,

    /// Gate party operations on the actor having a linked account
    #[serde(default = "default_true")]
    pub require_linked_account: bool,

    /// Minimum length of a linked account name
    #[serde(default = "default_min_account_name_len")]
    pub min_account_name_len: usize,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            invite_ttl_secs: default_invite_ttl(),
            require_linked_account: true,
            min_account_name_len: default_min_account_name_len(),
        }
    }
}

impl PartyConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs as i64)
    }

    pub fn invite_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.invite_ttl_secs as i64)
    }
}

/// Queue channel monitoring and split policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Voice channels watched by the reconciler
    #[serde(default)]
    pub channels: Vec<ChannelId>,

    /// Minimum occupancy that arms a countdown
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// Quiet period before a settled channel is split
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Members moved when occupancy is below `large_threshold`
    #[serde(default = "default_small_move")]
    pub small_move: usize,

    /// Occupancy at which the large split applies
    #[serde(default = "default_large_threshold")]
    pub large_threshold: usize,

    /// Members moved for the large split
    #[serde(default = "default_large_move")]
    pub large_move: usize,

    /// Target pair for the small split
    #[serde(default = "default_small_targets")]
    pub small_targets: [ChannelId; 2],

    /// Target pair for the large split
    #[serde(default = "default_large_targets")]
    pub large_targets: [ChannelId; 2],

    /// Text channel receiving party commands for moved members
    #[serde(default)]
    pub notify_channel: Option<ChannelId>,

    /// Names per notification for manual splits
    #[serde(default = "default_notify_batch_size")]
    pub notify_batch_size: usize,

    /// Fixed seed for member sampling; random when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            quorum: default_quorum(),
            debounce_ms: default_debounce_ms(),
            small_move: default_small_move(),
            large_threshold: default_large_threshold(),
            large_move: default_large_move(),
            small_targets: default_small_targets(),
            large_targets: default_large_targets(),
            notify_channel: None,
            notify_batch_size: default_notify_batch_size(),
            rng_seed: None,
        }
    }
}

impl QueueConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The channel manual splits draw members from
    pub fn primary_channel(&self) -> Option<ChannelId> {
        self.channels.first().copied()
    }

    /// Every fixed target channel, small pair first
    pub fn fixed_targets(&self) -> [ChannelId; 4] {
        [
            self.small_targets[0],
            self.small_targets[1],
            self.large_targets[0],
            self.large_targets[1],
        ]
    }
}

/// Ephemeral split sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Category new session channels are created under
    #[serde(default)]
    pub temp_category: ChannelId,

    /// Where members are returned when a session ends
    #[serde(default)]
    pub lobby_channel: ChannelId,

    /// Length of the random suffix in session channel names
    #[serde(default = "default_temp_name_len")]
    pub temp_name_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            temp_category: ChannelId(0),
            lobby_channel: ChannelId(0),
            temp_name_len: default_temp_name_len(),
        }
    }
}

/// Background sweep intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    #[serde(default = "default_sweep_secs")]
    pub party_sweep_secs: u64,

    #[serde(default = "default_sweep_secs")]
    pub invite_sweep_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            party_sweep_secs: default_sweep_secs(),
            invite_sweep_secs: default_sweep_secs(),
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_invite_ttl() -> u64 {
    1800
}

fn default_min_account_name_len() -> usize {
    4
}

fn default_quorum() -> usize {
    6
}

fn default_debounce_ms() -> u64 {
    5000
}

fn default_small_move() -> usize {
    6
}

fn default_large_threshold() -> usize {
    8
}

fn default_large_move() -> usize {
    8
}

fn default_small_targets() -> [ChannelId; 2] {
    [ChannelId(3), ChannelId(4)]
}

fn default_large_targets() -> [ChannelId; 2] {
    [ChannelId(1), ChannelId(2)]
}

fn default_notify_batch_size() -> usize {
    4
}

fn default_temp_name_len() -> usize {
    6
}

fn default_sweep_secs() -> u64 {
    60
}
