//! Split policy and member moves
//!
//! Shared by the channel reconciler and the manual split entry points on
//! [`crate::Lobby`]: pick a move count and target pair from an occupant
//! count, sample members uniformly, assign them to targets, and move each
//! member independently.

use crate::config::QueueConfig;
use crate::gateway::{NotificationSink, PlatformGateway};
use lobby_types::{ChannelId, UserId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

/// How many members to move and where
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    pub move_count: usize,
    pub targets: [ChannelId; 2],
}

/// Occupancy-driven split policy
#[derive(Debug, Clone)]
pub struct SplitPolicy {
    quorum: usize,
    small_move: usize,
    large_threshold: usize,
    large_move: usize,
    small_targets: [ChannelId; 2],
    large_targets: [ChannelId; 2],
}

impl SplitPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            quorum: config.quorum,
            small_move: config.small_move,
            large_threshold: config.large_threshold,
            large_move: config.large_move,
            small_targets: config.small_targets,
            large_targets: config.large_targets,
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Plan for a settled channel, or `None` below quorum
    pub fn plan(&self, occupants: usize) -> Option<SplitPlan> {
        if occupants < self.quorum {
            return None;
        }
        let (move_count, targets) = if occupants >= self.large_threshold {
            (self.large_move, self.large_targets)
        } else {
            (self.small_move, self.small_targets)
        };
        Some(SplitPlan {
            move_count: move_count.min(occupants),
            targets,
        })
    }

    /// Target pair for an explicit member set of size `count`
    pub fn targets_for(&self, count: usize) -> [ChannelId; 2] {
        if count >= self.large_threshold {
            self.large_targets
        } else {
            self.small_targets
        }
    }

    pub fn large_targets(&self) -> [ChannelId; 2] {
        self.large_targets
    }
}

/// Uniform random sample of `count` members, in random order
pub fn sample<R: Rng + ?Sized>(rng: &mut R, occupants: &[UserId], count: usize) -> Vec<UserId> {
    let mut pool = occupants.to_vec();
    let count = count.min(pool.len());
    let (selected, _) = pool.partial_shuffle(rng, count);
    selected.to_vec()
}

/// Member `i` goes to `targets[i % 2]`
pub fn assign_alternating(members: &[UserId], targets: [ChannelId; 2]) -> Vec<(UserId, ChannelId)> {
    members
        .iter()
        .enumerate()
        .map(|(i, m)| (*m, targets[i % 2]))
        .collect()
}

/// First half goes to `targets[0]`, the rest to `targets[1]`
pub fn assign_halves(members: &[UserId], targets: [ChannelId; 2]) -> Vec<(UserId, ChannelId)> {
    let half = members.len() / 2;
    members
        .iter()
        .enumerate()
        .map(|(i, m)| (*m, if i < half { targets[0] } else { targets[1] }))
        .collect()
}

/// Result of a batch of member moves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitOutcome {
    pub moved: Vec<(UserId, ChannelId)>,
    pub failed: Vec<UserId>,
    pub notified: Vec<String>,
}

impl SplitOutcome {
    pub fn moved_to(&self, channel: ChannelId) -> Vec<UserId> {
        self.moved
            .iter()
            .filter(|(_, c)| *c == channel)
            .map(|(u, _)| *u)
            .collect()
    }
}

/// Move each member independently. A failed move is logged and skipped.
pub async fn execute_moves(
    platform: &dyn PlatformGateway,
    assignments: &[(UserId, ChannelId)],
) -> SplitOutcome {
    let mut outcome = SplitOutcome::default();
    for (user, channel) in assignments {
        match platform.move_member(*user, *channel).await {
            Ok(()) => {
                debug!(user = %user, channel = %channel, "Member moved");
                outcome.moved.push((*user, *channel));
            }
            Err(e) => {
                warn!(user = %user, channel = %channel, error = %e, "Failed to move member");
                outcome.failed.push(*user);
            }
        }
    }
    outcome
}

/// Party command text for a group of account names
pub fn party_command(names: &[String]) -> String {
    format!("/p {}", names.join(" "))
}

/// Send one party command per non-empty group; returns the texts sent
pub async fn notify_groups(
    sink: &dyn NotificationSink,
    channel: Option<ChannelId>,
    groups: &[Vec<String>],
) -> Vec<String> {
    let Some(channel) = channel else {
        debug!("No notification channel configured, skipping party commands");
        return Vec::new();
    };

    let mut sent = Vec::new();
    for group in groups.iter().filter(|g| !g.is_empty()) {
        let text = party_command(group);
        match sink.send(channel, &text).await {
            Ok(()) => sent.push(text),
            Err(e) => warn!(channel = %channel, error = %e, "Failed to send party command"),
        }
    }
    sent
}

/// Split `names` into batches of at most `size`
pub fn batches(names: &[String], size: usize) -> Vec<Vec<String>> {
    names.chunks(size.max(1)).map(<[String]>::to_vec).collect()
}
