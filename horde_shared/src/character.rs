//! Character directory.
//!
//! Accounts and characters live outside the world server. The server only
//! needs two things from them:
//! - a stored profile (display name, sprite, last position) to fill in a
//!   sparse `join`,
//! - a way to record that a character died.
//!
//! The rest of the API (temporary accounts, create/list/delete) is what a
//! lobby front end calls. [`InMemoryDirectory`] keeps everything in process
//! memory and forgets it on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::net::CharacterId;

/// Identifies an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    /// No credentials; characters vanish with the process.
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub kind: AccountKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: CharacterId,
    pub account_id: AccountId,
    pub name: String,
    pub sprite: String,
    pub position_x: f32,
    pub position_y: f32,
    pub created_at: DateTime<Utc>,
    pub is_temporary: bool,
    pub is_dead: bool,
}

/// Directory errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("character {0} not found")]
    CharacterNotFound(CharacterId),
}

/// Account/character persistence as seen by the world server.
#[async_trait]
pub trait CharacterDirectory: Send + Sync {
    async fn create_temporary_account(&self) -> AccountRecord;

    async fn create_character(
        &self,
        account_id: &AccountId,
        name: &str,
        sprite: &str,
    ) -> Result<CharacterRecord, DirectoryError>;

    async fn list_characters(&self, account_id: &AccountId) -> Vec<CharacterRecord>;

    async fn character(&self, id: &CharacterId) -> Option<CharacterRecord>;

    async fn mark_dead(&self, id: &CharacterId) -> Result<(), DirectoryError>;

    async fn delete_character(&self, id: &CharacterId) -> Result<(), DirectoryError>;
}

/// Process-local directory.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    temporary_accounts: HashMap<AccountId, AccountRecord>,
    characters: HashMap<CharacterId, CharacterRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[async_trait]
impl CharacterDirectory for InMemoryDirectory {
    async fn create_temporary_account(&self) -> AccountRecord {
        let now = Utc::now();
        let record = AccountRecord {
            id: AccountId(format!("temp_{}_{}", now.timestamp_millis(), random_suffix())),
            kind: AccountKind::Temporary,
            created_at: now,
        };
        self.inner
            .write()
            .await
            .temporary_accounts
            .insert(record.id.clone(), record.clone());
        tracing::debug!(account = %record.id.0, "Temporary account created");
        record
    }

    async fn create_character(
        &self,
        account_id: &AccountId,
        name: &str,
        sprite: &str,
    ) -> Result<CharacterRecord, DirectoryError> {
        if name.trim().is_empty() {
            return Err(DirectoryError::MissingField("name"));
        }
        if account_id.0.is_empty() {
            return Err(DirectoryError::MissingField("account_id"));
        }
        if sprite.is_empty() {
            return Err(DirectoryError::MissingField("sprite"));
        }

        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let record = CharacterRecord {
            id: CharacterId(format!("char_{}_{}", now.timestamp_millis(), random_suffix())),
            account_id: account_id.clone(),
            name: name.to_string(),
            sprite: sprite.to_string(),
            position_x: 0.0,
            position_y: 0.0,
            created_at: now,
            is_temporary: inner.temporary_accounts.contains_key(account_id),
            is_dead: false,
        };
        inner.characters.insert(record.id.clone(), record.clone());
        tracing::info!(character = %record.id, account = %account_id.0, "Character created");
        Ok(record)
    }

    async fn list_characters(&self, account_id: &AccountId) -> Vec<CharacterRecord> {
        let inner = self.inner.read().await;
        let mut out: Vec<CharacterRecord> = inner
            .characters
            .values()
            .filter(|c| &c.account_id == account_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    async fn character(&self, id: &CharacterId) -> Option<CharacterRecord> {
        self.inner.read().await.characters.get(id).cloned()
    }

    async fn mark_dead(&self, id: &CharacterId) -> Result<(), DirectoryError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .characters
            .get_mut(id)
            .ok_or_else(|| DirectoryError::CharacterNotFound(id.clone()))?;
        record.is_dead = true;
        tracing::info!(character = %id, "Character marked dead");
        Ok(())
    }

    async fn delete_character(&self, id: &CharacterId) -> Result<(), DirectoryError> {
        let mut inner = self.inner.write().await;
        inner
            .characters
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::CharacterNotFound(id.clone()))
    }
}
