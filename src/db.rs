//! Database pool construction and the object-store abstraction for photo bytes (§6.2).

use sqlx::sqlite::{SqlitePoolOptions, SqliteConnectOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;

pub async fn create_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(connect_options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Stand-in for the spec's managed object store bucket. Non-sensitive, non-ephemeral
/// photo bytes are `put` here; sensitive/ephemeral uploads never call this trait at all
/// (§3's hard invariant) — they only ever populate `temporary_data` inline.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<String>;
    async fn signed_url(&self, url: &str, ttl_secs: u64) -> anyhow::Result<String>;
    async fn delete(&self, url: &str) -> anyhow::Result<()>;
}

/// Local-filesystem-backed `ObjectStore`. Stands in for Supabase storage in this
/// environment — no bucket credentials required to compile or run tests.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let _ = std::fs::create_dir_all(&root);
        Self { root }
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("local://{key}"))
    }

    async fn signed_url(&self, url: &str, ttl_secs: u64) -> anyhow::Result<String> {
        let expires = chrono::Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        Ok(format!("{url}?expires={}", expires.timestamp()))
    }

    async fn delete(&self, url: &str) -> anyhow::Result<()> {
        if let Some(key) = url.strip_prefix("local://") {
            let path = self.root.join(key);
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }
}
