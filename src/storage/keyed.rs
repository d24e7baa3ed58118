//! SQLite-backed [`KeyedStore`].
//!
//! SQLite has no native TTL, so every value carries an explicit `expires_at`
//! that is filtered at read time. Expired rows are deleted when read and by
//! [`SqliteKeyedStore::purge_expired`].

use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::Pool;
use crate::clock::Clock;
use crate::delayed::keyed::expiry_after;
use crate::delayed::KeyedStore;
use crate::scheduler::history::format_timestamp;

#[derive(Clone)]
pub struct SqliteKeyedStore {
    pool: Pool,
    clock: Arc<dyn Clock>,
}

impl SqliteKeyedStore {
    pub fn new(pool: Pool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Delete every expired value. Returns the number of rows removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let now = format_timestamp(&self.clock.now());
        let removed = conn.execute(
            "DELETE FROM scheduled_keys WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl KeyedStore for SqliteKeyedStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let value = value.to_string();
        let expires_at = format_timestamp(&expiry_after(self.clock.now(), ttl_seconds));

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO scheduled_keys (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .context("Failed to write scheduled key")?;
            Ok(())
        })
        .await?
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let now = format_timestamp(&self.clock.now());

        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = pool.get()?;
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT value, expires_at FROM scheduled_keys WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
                Some(_) => {
                    conn.execute("DELETE FROM scheduled_keys WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await?
    }

    async fn del(&self, key: &str) -> Result<()> {
        let pool = self.pool.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.execute("DELETE FROM scheduled_keys WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await?
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()> {
        let pool = self.pool.clone();
        let set_key = set_key.to_string();
        let member = member.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT OR IGNORE INTO scheduled_set_members (set_key, member) VALUES (?1, ?2)",
                params![set_key, member],
            )?;
            Ok(())
        })
        .await?
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        let pool = self.pool.clone();
        let set_key = set_key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT member FROM scheduled_set_members WHERE set_key = ?1 ORDER BY member",
            )?;
            let rows = stmt.query_map(params![set_key], |row| row.get::<_, String>(0))?;

            let mut members = Vec::new();
            for r in rows {
                members.push(r?);
            }
            Ok(members)
        })
        .await?
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()> {
        let pool = self.pool.clone();
        let set_key = set_key.to_string();
        let member = member.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.execute(
                "DELETE FROM scheduled_set_members WHERE set_key = ?1 AND member = ?2",
                params![set_key, member],
            )?;
            Ok(())
        })
        .await?
    }
}
