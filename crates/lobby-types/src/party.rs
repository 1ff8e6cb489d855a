//! Party: a group of users sharing one leader and one lifecycle

use crate::{ChannelId, PartyId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A party of users.
///
/// The leader is always one of `members`, `members` never holds the same
/// user twice, and `temp_channels` is only non-empty while `queued`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Stable identity, survives leadership changes
    #[serde(default = "PartyId::generate")]
    pub id: PartyId,
    /// Current leader
    pub leader_id: UserId,
    /// Members in join order, leader included
    pub members: Vec<UserId>,
    /// Whether the party has been placed into a split session
    #[serde(default)]
    pub queued: bool,
    /// Last activity-refreshing operation
    pub last_activity: DateTime<Utc>,
    /// Ephemeral channels created for this party's split session
    #[serde(default)]
    pub temp_channels: Vec<ChannelId>,
}

impl Party {
    /// Create a singleton party led by `leader_id`
    pub fn new(id: PartyId, leader_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            leader_id,
            members: vec![leader_id],
            queued: false,
            last_activity: now,
            temp_channels: Vec::new(),
        }
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn is_leader(&self, user: UserId) -> bool {
        self.leader_id == user
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append a member. Returns false if already present.
    pub fn add_member(&mut self, user: UserId) -> bool {
        if self.is_member(user) {
            return false;
        }
        self.members.push(user);
        true
    }

    /// Remove a member. Returns false if absent.
    pub fn remove_member(&mut self, user: UserId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != user);
        self.members.len() != before
    }

    /// Refresh the activity timestamp
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    /// True once the party has seen no activity for strictly longer than `threshold`
    pub fn is_idle(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.last_activity > threshold
    }

    /// Clear any split session state
    pub fn end_session(&mut self) {
        self.queued = false;
        self.temp_channels.clear();
    }

    /// Check the structural invariants
    pub fn is_well_formed(&self) -> bool {
        if self.members.is_empty() || !self.is_member(self.leader_id) {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        if !self.members.iter().all(|m| seen.insert(*m)) {
            return false;
        }
        self.queued || self.temp_channels.is_empty()
    }
}
