//! Simulated platform for development and testing
//!
//! Tracks which voice channel each user is in, emits a
//! [`VoiceStateChange`] for every join, leave and move, and records moves
//! and outbound messages so tests can assert on them.

use crate::gateway::{NotificationSink, PlatformGateway};
use async_trait::async_trait;
use lobby_types::{ChannelId, PlatformError, PlatformResult, UserId, VoiceStateChange};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const FIRST_CREATED_CHANNEL: u64 = 1_000_000;

#[derive(Debug, Clone)]
struct SimChannel {
    name: String,
    category: Option<ChannelId>,
}

#[derive(Debug, Default)]
struct SimState {
    channels: BTreeMap<ChannelId, SimChannel>,
    location: HashMap<UserId, ChannelId>,
    next_channel: u64,
    failing_moves: HashSet<UserId>,
    moves: Vec<(UserId, ChannelId)>,
    messages: Vec<(ChannelId, String)>,
}

/// In-memory platform with voice occupancy and a message log
#[derive(Debug)]
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
    events: broadcast::Sender<VoiceStateChange>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            state: Mutex::new(SimState {
                next_channel: FIRST_CREATED_CHANNEL,
                ..SimState::default()
            }),
            events,
        }
    }

    /// Create a platform with the given channels already present
    pub fn with_channels(channels: impl IntoIterator<Item = ChannelId>) -> Self {
        let platform = Self::new();
        for channel in channels {
            platform.add_channel(channel, &format!("channel-{channel}"));
        }
        platform
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, change: VoiceStateChange) {
        // No subscribers is fine
        let _ = self.events.send(change);
    }

    pub fn add_channel(&self, channel: ChannelId, name: &str) {
        self.lock().channels.insert(
            channel,
            SimChannel {
                name: name.to_string(),
                category: None,
            },
        );
    }

    pub fn channel_exists(&self, channel: ChannelId) -> bool {
        self.lock().channels.contains_key(&channel)
    }

    pub fn channel_name(&self, channel: ChannelId) -> Option<String> {
        self.lock().channels.get(&channel).map(|c| c.name.clone())
    }

    /// Channels created under `category`
    pub fn channels_in(&self, category: ChannelId) -> Vec<ChannelId> {
        self.lock()
            .channels
            .iter()
            .filter(|(_, c)| c.category == Some(category))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Connect `user` to `channel`, moving them if already connected
    pub fn join(&self, user: UserId, channel: ChannelId) {
        let before = {
            let mut state = self.lock();
            state.channels.entry(channel).or_insert_with(|| SimChannel {
                name: format!("channel-{channel}"),
                category: None,
            });
            state.location.insert(user, channel)
        };
        self.emit(VoiceStateChange::new(user, before, Some(channel)));
    }

    /// Disconnect `user` from voice
    pub fn disconnect(&self, user: UserId) {
        let before = self.lock().location.remove(&user);
        if before.is_some() {
            self.emit(VoiceStateChange::new(user, before, None));
        }
    }

    pub fn location_of(&self, user: UserId) -> Option<ChannelId> {
        self.lock().location.get(&user).copied()
    }

    pub fn occupants(&self, channel: ChannelId) -> BTreeSet<UserId> {
        self.lock()
            .location
            .iter()
            .filter(|(_, c)| **c == channel)
            .map(|(u, _)| *u)
            .collect()
    }

    /// Make every future move of `user` fail
    pub fn fail_moves_for(&self, user: UserId) {
        self.lock().failing_moves.insert(user);
    }

    /// Every successful move, in order
    pub fn moves(&self) -> Vec<(UserId, ChannelId)> {
        self.lock().moves.clone()
    }

    /// Every message sent, in order
    pub fn messages(&self) -> Vec<(ChannelId, String)> {
        self.lock().messages.clone()
    }
}

#[async_trait]
impl PlatformGateway for SimulatedPlatform {
    async fn list_occupants(&self, channel: ChannelId) -> PlatformResult<BTreeSet<UserId>> {
        if !self.channel_exists(channel) {
            return Err(PlatformError::ChannelNotFound(channel));
        }
        Ok(self.occupants(channel))
    }

    async fn move_member(&self, user: UserId, channel: ChannelId) -> PlatformResult<()> {
        let before = {
            let mut state = self.lock();
            if !state.channels.contains_key(&channel) {
                return Err(PlatformError::ChannelNotFound(channel));
            }
            if state.failing_moves.contains(&user) {
                return Err(PlatformError::Rejected(format!("move of {user} refused")));
            }
            let Some(before) = state.location.insert(user, channel) else {
                state.location.remove(&user);
                return Err(PlatformError::MemberNotFound(user));
            };
            state.moves.push((user, channel));
            before
        };
        self.emit(VoiceStateChange::new(user, Some(before), Some(channel)));
        Ok(())
    }

    async fn create_channel(&self, name: &str, category: ChannelId) -> PlatformResult<ChannelId> {
        let mut state = self.lock();
        let id = ChannelId(state.next_channel);
        state.next_channel += 1;
        state.channels.insert(
            id,
            SimChannel {
                name: name.to_string(),
                category: Some(category),
            },
        );
        Ok(id)
    }

    async fn delete_channel(&self, channel: ChannelId) -> PlatformResult<()> {
        let evicted: Vec<UserId> = {
            let mut state = self.lock();
            if state.channels.remove(&channel).is_none() {
                return Err(PlatformError::ChannelNotFound(channel));
            }
            let evicted: Vec<UserId> = state
                .location
                .iter()
                .filter(|(_, c)| **c == channel)
                .map(|(u, _)| *u)
                .collect();
            for user in &evicted {
                state.location.remove(user);
            }
            evicted
        };
        for user in evicted {
            self.emit(VoiceStateChange::new(user, Some(channel), None));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<VoiceStateChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl NotificationSink for SimulatedPlatform {
    async fn send(&self, channel: ChannelId, text: &str) -> PlatformResult<()> {
        self.lock().messages.push((channel, text.to_string()));
        Ok(())
    }
}
