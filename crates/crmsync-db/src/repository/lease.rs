//! # Run Leases
//!
//! Guards against two sync runs for the same integration overlapping.
//!
//! ```text
//! acquire(integration, holder, ttl)
//!     no row                   ──► insert, acquired
//!     row expired              ──► take over, acquired
//!     row held by same holder  ──► refresh, acquired
//!     force                    ──► take over, acquired
//!     otherwise                ──► not acquired
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;

/// A held lease.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Lease {
    pub integration_name: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Repository for run leases.
#[derive(Debug, Clone)]
pub struct LeaseRepository {
    pool: SqlitePool,
}

impl LeaseRepository {
    /// Creates a new LeaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LeaseRepository { pool }
    }

    /// Tries to take the lease for an integration.
    ///
    /// ## Returns
    /// * `Ok(true)` - Lease is now held by `holder` until `now + ttl`
    /// * `Ok(false)` - Another holder has an unexpired lease
    pub async fn acquire(
        &self,
        integration: &str,
        holder: &str,
        ttl: Duration,
        force: bool,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_leases (integration_name, holder, acquired_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (integration_name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE sync_leases.expires_at <= ?3
               OR sync_leases.holder = ?2
               OR ?5 = 1
            "#,
        )
        .bind(integration)
        .bind(holder)
        .bind(now)
        .bind(now + ttl)
        .bind(force)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() > 0;

        if acquired {
            if force {
                warn!(integration = %integration, holder = %holder, "Lease taken by force");
            }
            debug!(integration = %integration, holder = %holder, "Lease acquired");
        }

        Ok(acquired)
    }

    /// Releases the lease if `holder` still owns it.
    pub async fn release(&self, integration: &str, holder: &str) -> DbResult<bool> {
        let result =
            sqlx::query("DELETE FROM sync_leases WHERE integration_name = ?1 AND holder = ?2")
                .bind(integration)
                .bind(holder)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Current lease for an integration, expired or not.
    pub async fn current(&self, integration: &str) -> DbResult<Option<Lease>> {
        let lease = sqlx::query_as::<_, Lease>(
            r#"
            SELECT integration_name, holder, acquired_at, expires_at
            FROM sync_leases WHERE integration_name = ?1
            "#,
        )
        .bind(integration)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_lease_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let leases = db.leases();
        let ttl = Duration::minutes(10);

        assert!(leases.acquire("crm", "run-a", ttl, false, at(0)).await.unwrap());
        assert!(!leases.acquire("crm", "run-b", ttl, false, at(5)).await.unwrap());

        // Other integrations are independent
        assert!(leases.acquire("other", "run-b", ttl, false, at(5)).await.unwrap());

        // Expired lease can be taken over
        assert!(leases.acquire("crm", "run-b", ttl, false, at(11)).await.unwrap());
        assert_eq!(leases.current("crm").await.unwrap().unwrap().holder, "run-b");

        // Only the holder can release
        assert!(!leases.release("crm", "run-a").await.unwrap());
        assert!(leases.release("crm", "run-b").await.unwrap());
        assert!(leases.current("crm").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_force_takeover() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let leases = db.leases();
        let ttl = Duration::minutes(10);

        assert!(leases.acquire("crm", "run-a", ttl, false, at(0)).await.unwrap());
        assert!(leases.acquire("crm", "run-b", ttl, true, at(1)).await.unwrap());
        assert_eq!(leases.current("crm").await.unwrap().unwrap().holder, "run-b");
    }
}
