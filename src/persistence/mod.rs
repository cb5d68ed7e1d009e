//! Account, rank and record storage behind an async trait.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::protocol::{RankEntry, RecordEntry};

/// Every backend failure is reported as I/O; callers turn it into a deny or
/// an empty result.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Storage used by the lobby for sign-in, sign-up, ranks and records.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// True when `name` exists and `password` matches.
    async fn check_account(&self, name: &str, password: &str) -> PersistenceResult<bool>;

    /// Fails with `AlreadyExists` when the name is taken.
    async fn create_user(&self, name: &str, password: &str) -> PersistenceResult<()>;

    async fn create_record(&self, user_name: &str, kill_count: i32) -> PersistenceResult<()>;

    /// Best kill count per user, highest first, at most `limit` entries.
    async fn get_rank(&self, limit: usize) -> PersistenceResult<Vec<RankEntry>>;

    /// Records for `name`, newest first, at most `limit` entries.
    async fn get_record(&self, name: &str, limit: usize) -> PersistenceResult<Vec<RecordEntry>>;
}

/// Persistence configuration
#[derive(Debug, Clone, Default)]
pub enum PersistenceConfig {
    #[default]
    InMemory,
}

/// Create a persistence service based on configuration
#[must_use]
pub fn create_persistence(config: PersistenceConfig) -> Arc<dyn PersistenceService> {
    match config {
        PersistenceConfig::InMemory => Arc::new(InMemoryPersistence::new()),
    }
}

/// Process-local storage for tests and single-instance deployments.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    accounts: RwLock<HashMap<String, [u8; 32]>>,
    records: RwLock<Vec<RecordEntry>>,
}

impl InMemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Salted with the account name so equal passwords differ per user.
    fn digest(name: &str, password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

#[async_trait]
impl PersistenceService for InMemoryPersistence {
    async fn check_account(&self, name: &str, password: &str) -> PersistenceResult<bool> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .get(name)
            .is_some_and(|stored| *stored == Self::digest(name, password)))
    }

    async fn create_user(&self, name: &str, password: &str) -> PersistenceResult<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("account '{name}' already exists"),
            )
            .into());
        }
        accounts.insert(name.to_string(), Self::digest(name, password));
        Ok(())
    }

    async fn create_record(&self, user_name: &str, kill_count: i32) -> PersistenceResult<()> {
        self.records.write().await.push(RecordEntry {
            name: user_name.to_string(),
            kill_count,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn get_rank(&self, limit: usize) -> PersistenceResult<Vec<RankEntry>> {
        let records = self.records.read().await;
        let mut best: HashMap<&str, i32> = HashMap::new();
        for record in records.iter() {
            let entry = best.entry(record.name.as_str()).or_insert(record.kill_count);
            *entry = (*entry).max(record.kill_count);
        }

        let mut ranked: Vec<(&str, i32)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        Ok(ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, (name, kill_count))| RankEntry {
                rank: i32::try_from(index + 1).unwrap_or(i32::MAX),
                name: name.to_string(),
                kill_count,
            })
            .collect())
    }

    async fn get_record(&self, name: &str, limit: usize) -> PersistenceResult<Vec<RecordEntry>> {
        let records = self.records.read().await;
        // Walk newest-inserted first so equal timestamps keep that order.
        let mut found: Vec<RecordEntry> = records
            .iter()
            .rev()
            .filter(|record| record.name == name)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit);
        Ok(found)
    }
}
