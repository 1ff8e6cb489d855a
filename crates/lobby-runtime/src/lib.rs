//! Lobby Runtime
//!
//! Party and invite lifecycle, queue-channel reconciliation and the
//! background janitors, wired to the chat platform only through the traits
//! in [`gateway`].
//!
//! - [`Lobby`]: party operations with write-through persistence, plus the
//!   manual split entry points
//! - [`QueueReconciler`]: debounced split of settled queue channels
//! - [`spawn_janitors`]: idle party and expired invite sweeps
//! - [`SimulatedPlatform`]: in-memory platform for development and tests

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod gateway;
pub mod invites;
pub mod janitor;
pub mod links;
pub mod lobby;
pub mod reconciler;
pub mod registry;
pub mod sim;
pub mod split;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{JanitorConfig, PartyConfig, QueueConfig, RuntimeConfig, SessionConfig};
pub use gateway::{IdentityLinkLookup, NotificationSink, PlatformGateway};
pub use invites::InviteManager;
pub use janitor::spawn_janitors;
pub use links::{AccountLinks, LinkedAccounts};
pub use lobby::{Collaborators, Lobby};
pub use reconciler::{
    ChannelStatus, PassReport, QueuePhase, QueueReconciler, ReconcilerHandle, ReconcilerMessage,
};
pub use registry::{LeaveOutcome, PartyRegistry};
pub use sim::SimulatedPlatform;
pub use split::{SplitOutcome, SplitPlan, SplitPolicy};
pub use store::{InMemoryStore, JsonFileStore, LinkStore, PartyStore, Store};
