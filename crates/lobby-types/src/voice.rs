//! Voice occupancy events

use crate::{ChannelId, UserId};
use serde::{Deserialize, Serialize};

/// A user's voice channel changed (join, leave, or move)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateChange {
    pub user: UserId,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
}

impl VoiceStateChange {
    pub fn new(user: UserId, before: Option<ChannelId>, after: Option<ChannelId>) -> Self {
        Self {
            user,
            before,
            after,
        }
    }

    /// Whether this change involves `channel` on either side
    pub fn touches(&self, channel: ChannelId) -> bool {
        self.before == Some(channel) || self.after == Some(channel)
    }

    /// Channels whose occupancy changed, without duplicates
    pub fn affected_channels(&self) -> Vec<ChannelId> {
        match (self.before, self.after) {
            (Some(b), Some(a)) if a == b => vec![a],
            (Some(b), Some(a)) => vec![b, a],
            (Some(b), None) => vec![b],
            (None, Some(a)) => vec![a],
            (None, None) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affected_channels() {
        let u = UserId(1);
        let move_between = VoiceStateChange::new(u, Some(ChannelId(1)), Some(ChannelId(2)));
        assert_eq!(move_between.affected_channels(), vec![ChannelId(1), ChannelId(2)]);

        let mute = VoiceStateChange::new(u, Some(ChannelId(1)), Some(ChannelId(1)));
        assert_eq!(mute.affected_channels(), vec![ChannelId(1)]);

        let join = VoiceStateChange::new(u, None, Some(ChannelId(3)));
        assert!(join.touches(ChannelId(3)));
        assert!(!join.touches(ChannelId(1)));
    }
}
