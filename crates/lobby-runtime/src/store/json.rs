//! JSON file storage
//!
//! `parties.json` maps each leader id to its party record; members are
//! re-indexed on load. `linked_accounts.json` maps user id to account name.

use super::traits::*;
use async_trait::async_trait;
use lobby_types::{Party, StoreError, StoreResult, UserId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PARTY_FILE: &str = "parties.json";
pub const LINK_FILE: &str = "linked_accounts.json";

/// File-backed store rooted at a data directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read<T: DeserializeOwned + Default>(&self, file: &str) -> StoreResult<T> {
        let path = self.path(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(file);
        let tmp = self.path(&format!("{file}.tmp"));
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl PartyStore for JsonFileStore {
    async fn load_parties(&self) -> StoreResult<Vec<Party>> {
        let by_leader: BTreeMap<UserId, Party> = self.read(PARTY_FILE).await?;
        Ok(by_leader.into_values().collect())
    }

    async fn save_parties(&self, parties: &[Party]) -> StoreResult<()> {
        let by_leader: BTreeMap<UserId, &Party> =
            parties.iter().map(|p| (p.leader_id, p)).collect();
        if by_leader.len() != parties.len() {
            return Err(StoreError::Corrupt(
                "two parties share a leader".to_string(),
            ));
        }
        self.write(PARTY_FILE, &by_leader).await
    }
}

#[async_trait]
impl LinkStore for JsonFileStore {
    async fn load_linked_accounts(&self) -> StoreResult<BTreeMap<UserId, String>> {
        self.read(LINK_FILE).await
    }

    async fn save_linked_accounts(&self, links: &BTreeMap<UserId, String>) -> StoreResult<()> {
        self.write(LINK_FILE, links).await
    }
}
