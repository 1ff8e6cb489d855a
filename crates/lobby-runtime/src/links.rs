//! Linked external accounts

use crate::gateway::IdentityLinkLookup;
use crate::store::LinkStore;
use async_trait::async_trait;
use lobby_types::{LobbyError, LobbyResult, UserId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// User -> external account name
#[derive(Debug, Clone, Default)]
pub struct LinkedAccounts {
    accounts: BTreeMap<UserId, String>,
    min_name_len: usize,
}

impl LinkedAccounts {
    pub fn new(accounts: BTreeMap<UserId, String>, min_name_len: usize) -> Self {
        Self {
            accounts,
            min_name_len,
        }
    }

    pub fn get(&self, user: UserId) -> Option<&str> {
        self.accounts
            .get(&user)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn is_linked(&self, user: UserId) -> bool {
        self.get(user).is_some()
    }

    pub fn link(&mut self, user: UserId, name: &str) -> LobbyResult<()> {
        let name = name.trim();
        if name.chars().count() < self.min_name_len {
            return Err(LobbyError::InvalidAccountName {
                name: name.to_string(),
                min_len: self.min_name_len,
            });
        }
        if let Some(existing) = self.accounts.get(&user) {
            return Err(LobbyError::AlreadyLinked {
                user,
                account: existing.clone(),
            });
        }
        self.accounts.insert(user, name.to_string());
        Ok(())
    }

    pub fn unlink(&mut self, user: UserId) -> LobbyResult<String> {
        self.accounts
            .remove(&user)
            .ok_or(LobbyError::NotLinked(user))
    }

    pub fn as_map(&self) -> &BTreeMap<UserId, String> {
        &self.accounts
    }
}

/// Shared, persisted account links
pub struct AccountLinks {
    accounts: RwLock<LinkedAccounts>,
    store: Arc<dyn LinkStore>,
}

impl AccountLinks {
    /// Load links from the store
    pub async fn load(store: Arc<dyn LinkStore>, min_name_len: usize) -> LobbyResult<Self> {
        let accounts = store.load_linked_accounts().await?;
        Ok(Self {
            accounts: RwLock::new(LinkedAccounts::new(accounts, min_name_len)),
            store,
        })
    }

    pub async fn link(&self, user: UserId, name: &str) -> LobbyResult<()> {
        let mut accounts = self.accounts.write().await;
        accounts.link(user, name)?;
        self.store.save_linked_accounts(accounts.as_map()).await?;
        info!(user = %user, account = %name.trim(), "Account linked");
        Ok(())
    }

    pub async fn unlink(&self, user: UserId) -> LobbyResult<String> {
        let mut accounts = self.accounts.write().await;
        let name = accounts.unlink(user)?;
        self.store.save_linked_accounts(accounts.as_map()).await?;
        info!(user = %user, "Account unlinked");
        Ok(name)
    }

    pub async fn is_linked(&self, user: UserId) -> bool {
        self.accounts.read().await.is_linked(user)
    }

    /// Fail with `NotLinked` unless `user` has a linked account
    pub async fn require(&self, user: UserId) -> LobbyResult<()> {
        if self.is_linked(user).await {
            Ok(())
        } else {
            Err(LobbyError::NotLinked(user))
        }
    }

    /// Linked names for `users`, in order, skipping unlinked users
    pub async fn names_for(&self, users: &[UserId]) -> Vec<String> {
        let accounts = self.accounts.read().await;
        users
            .iter()
            .filter_map(|u| accounts.get(*u).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl IdentityLinkLookup for AccountLinks {
    async fn lookup(&self, user: UserId) -> Option<String> {
        self.accounts.read().await.get(user).map(str::to_string)
    }
}
