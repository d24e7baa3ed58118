//! Keyed store contract used by delayed tasks, plus an in-memory implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::clock::Clock;

/// Key/value storage with per-key expiry and set membership.
///
/// Any store offering these six operations can back a
/// [`DelayedTaskStore`](super::DelayedTaskStore).
#[async_trait::async_trait]
pub trait KeyedStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value, expiring after
    /// `ttl_seconds`.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Fetch a live value. Expired keys read as missing.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>>;

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()>;
}

/// Longest TTL honoured; larger values are clamped.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 86_400;

/// Absolute expiry for a TTL starting at `now`.
///
/// Clamped so the result always formats as a four-digit-year timestamp,
/// which keeps lexical and chronological order aligned in SQLite.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    let ttl = Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64);
    now.checked_add_signed(ttl).unwrap_or(now)
}

/// Process-local [`KeyedStore`] with explicit expiry timestamps checked on read.
pub struct InMemoryKeyedStore {
    clock: Arc<dyn Clock>,
    values: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryKeyedStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            values: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored values, including ones that have expired but not yet
    /// been read.
    pub async fn raw_len(&self) -> usize {
        self.values.lock().await.len()
    }
}

#[async_trait::async_trait]
impl KeyedStore for InMemoryKeyedStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let expires_at = expiry_after(self.clock.now(), ttl_seconds);
        self.values
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut values = self.values.lock().await;
        let entry = values
            .get(key)
            .map(|(value, expires_at)| (value.clone(), *expires_at > now));
        match entry {
            Some((value, true)) => Ok(Some(value)),
            Some((_, false)) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .await
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .await
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()> {
        let mut sets = self.sets.lock().await;
        if let Some(set) = sets.get_mut(set_key) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(set_key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (InMemoryKeyedStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (InMemoryKeyedStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_value_expires_after_ttl() {
        let (store, clock) = store();
        store.set("k", "v", 60).await.unwrap();

        clock.advance(Duration::seconds(59));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(Duration::seconds(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.raw_len().await, 0);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_refreshes_ttl() {
        let (store, clock) = store();
        store.set("k", "old", 10).await.unwrap();
        clock.advance(Duration::seconds(5));
        store.set("k", "new", 10).await.unwrap();
        clock.advance(Duration::seconds(8));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_del_removes_value() {
        let (store, _) = store();
        store.set("k", "v", 60).await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // Deleting a missing key is fine.
        store.del("k").await.unwrap();
    }

    #[test]
    fn test_expiry_is_clamped() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 60), now + Duration::seconds(60));
        assert_eq!(
            expiry_after(now, u64::MAX),
            now + Duration::seconds(MAX_TTL_SECONDS as i64)
        );
    }

    #[tokio::test]
    async fn test_set_membership() {
        let (store, _) = store();
        store.set_add("pending", "b").await.unwrap();
        store.set_add("pending", "a").await.unwrap();
        store.set_add("pending", "a").await.unwrap();
        assert_eq!(store.set_members("pending").await.unwrap(), vec!["a", "b"]);

        store.set_remove("pending", "a").await.unwrap();
        store.set_remove("pending", "zzz").await.unwrap();
        assert_eq!(store.set_members("pending").await.unwrap(), vec!["b"]);
        assert!(store.set_members("other").await.unwrap().is_empty());
    }
}
