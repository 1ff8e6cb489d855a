//! In-memory storage implementation

use super::traits::*;
use async_trait::async_trait;
use lobby_types::{Party, StoreResult, UserId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug, Default)]
pub struct InMemoryStore {
    parties: RwLock<Vec<Party>>,
    links: RwLock<BTreeMap<UserId, String>>,
    party_saves: AtomicU64,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with parties and links
    pub fn with_data(parties: Vec<Party>, links: BTreeMap<UserId, String>) -> Self {
        Self {
            parties: RwLock::new(parties),
            links: RwLock::new(links),
            party_saves: AtomicU64::new(0),
        }
    }

    /// Number of party snapshots written so far
    pub fn party_saves(&self) -> u64 {
        self.party_saves.load(Ordering::SeqCst)
    }

    /// The last saved party snapshot
    pub async fn saved_parties(&self) -> Vec<Party> {
        self.parties.read().await.clone()
    }
}

#[async_trait]
impl PartyStore for InMemoryStore {
    async fn load_parties(&self) -> StoreResult<Vec<Party>> {
        Ok(self.parties.read().await.clone())
    }

    async fn save_parties(&self, parties: &[Party]) -> StoreResult<()> {
        let mut stored = self.parties.write().await;
        *stored = parties.to_vec();
        self.party_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LinkStore for InMemoryStore {
    async fn load_linked_accounts(&self) -> StoreResult<BTreeMap<UserId, String>> {
        Ok(self.links.read().await.clone())
    }

    async fn save_linked_accounts(&self, links: &BTreeMap<UserId, String>) -> StoreResult<()> {
        let mut stored = self.links.write().await;
        *stored = links.clone();
        Ok(())
    }
}
