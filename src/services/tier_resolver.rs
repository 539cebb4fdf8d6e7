//! Subscription tier resolution with a 5-minute-TTL cache (§4.4).
//!
//! `dashmap` backs the cache: a synchronized read-mostly map, lazily expired on read
//! rather than swept by a background task (matching the spec's "read-mostly map" framing).

use crate::models::Tier;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};

pub struct TierResolver {
    db: SqlitePool,
    cache: DashMap<String, (Tier, Instant)>,
    ttl: Duration,
}

impl TierResolver {
    pub fn new(db: SqlitePool, ttl: Duration) -> Self {
        Self { db, cache: DashMap::new(), ttl }
    }

    /// Absent or expired subscription resolves to `free`; database errors are logged
    /// and treated as `free` rather than propagated.
    pub async fn tier(&self, user_id: &str) -> Tier {
        if let Some(entry) = self.cache.get(user_id)
            && entry.1.elapsed() < self.ttl
        {
            return entry.0;
        }

        let tier = self.fetch_tier(user_id).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, user_id, "failed to resolve subscription tier");
            Tier::Free
        });

        self.cache.insert(user_id.to_string(), (tier, Instant::now()));
        tier
    }

    async fn fetch_tier(&self, user_id: &str) -> Result<Tier, sqlx::Error> {
        let row: Option<(String, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
            "SELECT tier, period_end FROM subscriptions WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some((tier, period_end)) = row else {
            return Ok(Tier::Free);
        };

        if let Some(period_end) = period_end
            && period_end <= Utc::now()
        {
            return Ok(Tier::Free);
        }

        Ok(Tier::parse(&tier))
    }

    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn no_subscription_resolves_to_free() {
        let db = test_db().await;
        let resolver = TierResolver::new(db, Duration::from_secs(300));
        assert_eq!(resolver.tier("nobody").await, Tier::Free);
    }

    #[tokio::test]
    async fn active_subscription_resolves_to_its_tier() {
        let db = test_db().await;
        sqlx::query(
            "INSERT INTO subscriptions (user_id, tier, status, period_end) VALUES (?, 'pro', 'active', ?)",
        )
        .bind("u1")
        .bind(Utc::now() + chrono::Duration::days(30))
        .execute(&db)
        .await
        .unwrap();

        let resolver = TierResolver::new(db, Duration::from_secs(300));
        assert_eq!(resolver.tier("u1").await, Tier::Pro);
    }

    #[tokio::test]
    async fn invalidate_forces_a_re_fetch() {
        let db = test_db().await;
        sqlx::query(
            "INSERT INTO subscriptions (user_id, tier, status, period_end) VALUES (?, 'pro', 'active', ?)",
        )
        .bind("u1")
        .bind(Utc::now() + chrono::Duration::days(30))
        .execute(&db)
        .await
        .unwrap();

        let resolver = TierResolver::new(db.clone(), Duration::from_secs(300));
        assert_eq!(resolver.tier("u1").await, Tier::Pro);

        sqlx::query("UPDATE subscriptions SET tier = 'free' WHERE user_id = 'u1'")
            .execute(&db)
            .await
            .unwrap();

        // still cached
        assert_eq!(resolver.tier("u1").await, Tier::Pro);

        resolver.invalidate("u1");
        assert_eq!(resolver.tier("u1").await, Tier::Free);
    }
}
