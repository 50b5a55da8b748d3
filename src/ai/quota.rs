//! Client-side daily AI usage quota.
//!
//! A counter keyed by the local calendar date, persisted in settings. The
//! stored record resets the moment the date rolls over; the cap is enforced
//! before any network request is made.

use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::storage::{keys, LocalStore};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct Usage {
    date: String,
    count: u32,
}

#[derive(Clone)]
pub struct QuotaTracker {
    store: LocalStore,
    limit: u32,
}

impl QuotaTracker {
    pub fn new(store: LocalStore, limit: u32) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn today() -> String {
        Local::now().date_naive().to_string()
    }

    async fn usage_today(&self) -> Result<Usage> {
        let stored = self.store.get_setting(keys::AI_USAGE).await?;
        let usage: Usage = stored
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        if usage.date != Self::today() {
            return Ok(Usage {
                date: Self::today(),
                count: 0,
            });
        }
        Ok(usage)
    }

    /// Uses left today.
    pub async fn remaining(&self) -> Result<u32> {
        let usage = self.usage_today().await?;
        Ok(self.limit.saturating_sub(usage.count))
    }

    pub async fn can_use(&self) -> Result<bool> {
        Ok(self.remaining().await? > 0)
    }

    /// Count one successful use against today.
    pub async fn record_use(&self) -> Result<()> {
        let mut usage = self.usage_today().await?;
        usage.count += 1;
        self.store
            .set_setting(keys::AI_USAGE, &serde_json::to_string(&usage)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn counts_down_and_blocks_at_limit() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        let quota = QuotaTracker::new(store, 3);

        assert_eq!(quota.remaining().await.unwrap(), 3);
        for _ in 0..3 {
            assert!(quota.can_use().await.unwrap());
            quota.record_use().await.unwrap();
        }
        assert_eq!(quota.remaining().await.unwrap(), 0);
        assert!(!quota.can_use().await.unwrap());
    }

    #[tokio::test]
    async fn stale_date_resets_the_counter() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        store
            .set_setting(
                keys::AI_USAGE,
                r#"{"date":"2001-01-01","count":99}"#,
            )
            .await
            .unwrap();

        let quota = QuotaTracker::new(store, 3);
        assert_eq!(quota.remaining().await.unwrap(), 3);
    }
}
