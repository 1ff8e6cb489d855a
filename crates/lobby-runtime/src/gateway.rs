//! Collaborator traits for the chat platform
//!
//! The lobby never talks to a platform SDK directly. Everything it needs is
//! expressed here so the daemon can wire a real adapter, and tests can wire
//! [`crate::sim::SimulatedPlatform`].

use async_trait::async_trait;
use lobby_types::{ChannelId, PlatformResult, UserId, VoiceStateChange};
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// Voice channel membership and mutation
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// Current occupants of a voice channel
    async fn list_occupants(&self, channel: ChannelId) -> PlatformResult<BTreeSet<UserId>>;

    /// Move a connected user into a voice channel
    async fn move_member(&self, user: UserId, channel: ChannelId) -> PlatformResult<()>;

    /// Create a voice channel under a category
    async fn create_channel(&self, name: &str, category: ChannelId) -> PlatformResult<ChannelId>;

    /// Delete a channel
    async fn delete_channel(&self, channel: ChannelId) -> PlatformResult<()>;

    /// Stream of voice state changes
    fn subscribe(&self) -> broadcast::Receiver<VoiceStateChange>;
}

/// Outbound text messages
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str) -> PlatformResult<()>;
}

/// Resolves a user to their linked external account
#[async_trait]
pub trait IdentityLinkLookup: Send + Sync {
    async fn lookup(&self, user: UserId) -> Option<String>;
}
