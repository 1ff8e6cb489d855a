//! Storage trait definitions

use async_trait::async_trait;
use lobby_types::{Party, StoreResult, UserId};
use std::collections::BTreeMap;

/// Combined storage trait
pub trait Store: PartyStore + LinkStore + Send + Sync {}

impl<T: PartyStore + LinkStore + Send + Sync> Store for T {}

/// Storage for the party registry
#[async_trait]
pub trait PartyStore: Send + Sync {
    /// Load every persisted party
    async fn load_parties(&self) -> StoreResult<Vec<Party>>;

    /// Replace the persisted registry with `parties`
    async fn save_parties(&self, parties: &[Party]) -> StoreResult<()>;
}

/// Storage for linked external accounts
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Load the user -> account map
    async fn load_linked_accounts(&self) -> StoreResult<BTreeMap<UserId, String>>;

    /// Replace the persisted user -> account map
    async fn save_linked_accounts(&self, links: &BTreeMap<UserId, String>) -> StoreResult<()>;
}
