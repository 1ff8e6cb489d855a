//! Lobby Domain Types
//!
//! This crate defines the domain types shared by the lobby runtime and
//! daemon: who is grouped with whom, who has been invited where, and what a
//! voice channel looked like when the platform last told us about it.
//!
//! # Key Concepts
//!
//! - **Party**: a small group of users with exactly one leader. A party is
//!   addressed by its [`PartyId`]; every member identity indexes to that id.
//! - **Pending invite**: an offer from a leader to a partyless user, valid
//!   for a fixed TTL.
//! - **Voice state change**: a user moved between (or into, or out of)
//!   voice channels.
//!
//! # Architecture
//!
//! This is a pure types crate with no runtime dependencies. IDs use the
//! newtype pattern and implement `Display`.

#![deny(unsafe_code)]

mod errors;
mod ids;
mod invite;
mod party;
mod voice;

pub use errors::*;
pub use ids::*;
pub use invite::*;
pub use party::*;
pub use voice::*;
