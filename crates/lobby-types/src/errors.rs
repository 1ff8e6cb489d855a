//! Error types for the lobby layer

use crate::{ChannelId, UserId};

/// Errors that can occur in lobby operations
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("User {0} is not the leader of a party")]
    NotLeader(UserId),

    #[error("User {0} is not in the party")]
    NotInParty(UserId),

    #[error("User {0} is already in a party")]
    AlreadyInParty(UserId),

    #[error("User {0} already has a pending invite")]
    InviteExists(UserId),

    #[error("User {0} has no pending invite")]
    NoPendingInvite(UserId),

    #[error("Invite for user {0} has expired")]
    InviteExpired(UserId),

    #[error("Party led by {0} no longer exists")]
    PartyGone(UserId),

    #[error("Leader {0} cannot kick themselves; leave or disband instead")]
    SelfKick(UserId),

    #[error("User {0} cannot invite themselves")]
    SelfInvite(UserId),

    #[error("User {0} has no linked account")]
    NotLinked(UserId),

    #[error("User {user} is already linked to {account}")]
    AlreadyLinked { user: UserId, account: String },

    #[error("Account name must be at least {min_len} characters: {name:?}")]
    InvalidAccountName { name: String, min_len: usize },

    #[error("Party size {size} is not one of {allowed:?}")]
    PartySizeInvalid { size: usize, allowed: Vec<usize> },

    #[error("Party led by {0} is not in a split session")]
    NotQueued(UserId),

    #[error("Not enough party members present: required {required}, present {present}")]
    NotEnoughMembers { required: usize, present: usize },

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Broad classification used by callers to decide how to report a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request was invalid for the current state; nothing changed
    Precondition,
    /// State changed underneath the request between two steps
    Race,
    /// A platform or store call failed
    External,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Precondition => "precondition",
            Self::Race => "race",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LobbyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PartyGone(_) => ErrorCategory::Race,
            Self::Platform(_) | Self::Store(_) => ErrorCategory::External,
            _ => ErrorCategory::Precondition,
        }
    }
}

/// Result type alias for lobby operations
pub type LobbyResult<T> = Result<T, LobbyError>;

/// A single platform call failed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Member not found: {0}")]
    MemberNotFound(UserId),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            LobbyError::NotLeader(UserId(1)).category(),
            ErrorCategory::Precondition
        );
        assert_eq!(LobbyError::PartyGone(UserId(1)).category(), ErrorCategory::Race);
        assert_eq!(
            LobbyError::from(PlatformError::MemberNotFound(UserId(1))).category(),
            ErrorCategory::External
        );
    }

    #[test]
    fn test_party_gone_is_distinct_from_missing_invite() {
        let gone = LobbyError::PartyGone(UserId(7)).to_string();
        let missing = LobbyError::NoPendingInvite(UserId(7)).to_string();
        assert_ne!(gone, missing);
        assert!(gone.contains("no longer exists"));
    }
}
