//! Persistence layer for the lobby
//!
//! Parties and linked accounts are stored as whole snapshots; every mutation
//! rewrites the affected snapshot.

mod json;
mod memory;
mod traits;

pub use json::JsonFileStore;
pub use memory::InMemoryStore;
pub use traits::{LinkStore, PartyStore, Store};
