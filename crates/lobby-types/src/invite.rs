//! Pending party invites

use crate::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An outstanding invite, keyed by invitee
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvite {
    pub inviter: UserId,
    pub invitee: UserId,
    pub issued_at: DateTime<Utc>,
}

impl PendingInvite {
    pub fn new(inviter: UserId, invitee: UserId, issued_at: DateTime<Utc>) -> Self {
        Self {
            inviter,
            invitee,
            issued_at,
        }
    }

    /// An invite expires once its age exceeds `ttl`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.issued_at > ttl
    }
}
