//! # Mapping Store
//!
//! Persists the link between a local entity and its remote record, per
//! integration and object type.
//!
//! ## Table Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  integration_mappings                                                   │
//! │                                                                         │
//! │  (integration_name, object_type, local_entity_id)  ── UNIQUE            │
//! │        │                                                                │
//! │        └──► remote_record_id   (fixed once written)                     │
//! │             last_synced_at     (moved forward on every pull/push)       │
//! │                                                                         │
//! │  Pull:  put_batch(..)     every 100 records and at the end of a run     │
//! │  Push:  put(..)           after a remote create returns an id           │
//! │         touch_synced_at() after a remote update succeeds                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crmsync_core::{IntegrationMapping, MappingPair, ObjectType};

/// Repository for integration mappings.
#[derive(Debug, Clone)]
pub struct MappingRepository {
    pool: SqlitePool,
}

impl MappingRepository {
    /// Creates a new MappingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MappingRepository { pool }
    }

    /// Looks up the mapping for a local entity.
    ///
    /// ## Returns
    /// * `Ok(Some(mapping))` - Entity is linked to a remote record
    /// * `Ok(None)` - Entity has never been synced with this integration
    pub async fn get(
        &self,
        integration: &str,
        object_type: ObjectType,
        local_entity_id: &str,
    ) -> DbResult<Option<IntegrationMapping>> {
        let mapping = sqlx::query_as::<_, IntegrationMapping>(
            r#"
            SELECT id, integration_name, object_type, local_entity_id,
                   remote_record_id, last_synced_at, created_at
            FROM integration_mappings
            WHERE integration_name = ?1 AND object_type = ?2 AND local_entity_id = ?3
            "#,
        )
        .bind(integration)
        .bind(object_type)
        .bind(local_entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    /// Looks up the mapping that points at a remote record.
    ///
    /// If several local entities point at the same remote record the oldest
    /// mapping wins.
    pub async fn find_by_remote(
        &self,
        integration: &str,
        object_type: ObjectType,
        remote_record_id: &str,
    ) -> DbResult<Option<IntegrationMapping>> {
        let mapping = sqlx::query_as::<_, IntegrationMapping>(
            r#"
            SELECT id, integration_name, object_type, local_entity_id,
                   remote_record_id, last_synced_at, created_at
            FROM integration_mappings
            WHERE integration_name = ?1 AND object_type = ?2 AND remote_record_id = ?3
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(integration)
        .bind(object_type)
        .bind(remote_record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    /// Writes one mapping.
    pub async fn put(
        &self,
        integration: &str,
        object_type: ObjectType,
        pair: &MappingPair,
        synced_at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.put_batch(integration, object_type, std::slice::from_ref(pair), synced_at)
            .await?;
        Ok(())
    }

    /// Writes a batch of mappings in one transaction.
    ///
    /// New pairs are inserted. Pairs whose local entity is already mapped
    /// only get `last_synced_at` moved forward; their remote id is left as
    /// it was.
    ///
    /// ## Returns
    /// Number of pairs written.
    pub async fn put_batch(
        &self,
        integration: &str,
        object_type: ObjectType,
        pairs: &[MappingPair],
        synced_at: DateTime<Utc>,
    ) -> DbResult<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for pair in pairs {
            let result = sqlx::query(
                r#"
                INSERT INTO integration_mappings (
                    id, integration_name, object_type, local_entity_id,
                    remote_record_id, last_synced_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ON CONFLICT (integration_name, object_type, local_entity_id)
                DO UPDATE SET last_synced_at = excluded.last_synced_at
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(integration)
            .bind(object_type)
            .bind(&pair.local_entity_id)
            .bind(&pair.remote_record_id)
            .bind(synced_at)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        debug!(
            integration = %integration,
            object_type = %object_type,
            count = written,
            "Mapping batch written"
        );

        Ok(written)
    }

    /// Moves a mapping's `last_synced_at` forward after a successful push.
    pub async fn touch_synced_at(&self, mapping_id: &str, synced_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE integration_mappings SET last_synced_at = ?2 WHERE id = ?1")
            .bind(mapping_id)
            .bind(synced_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts mappings for one integration and object type.
    pub async fn count(&self, integration: &str, object_type: ObjectType) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM integration_mappings WHERE integration_name = ?1 AND object_type = ?2",
        )
        .bind(integration)
        .bind(object_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};

    fn pair(local: &str, remote: &str) -> MappingPair {
        MappingPair {
            local_entity_id: local.to_string(),
            remote_record_id: remote.to_string(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_put_batch_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.mappings();

        let written = repo
            .put_batch("acme", ObjectType::Contact, &[pair("l1", "10"), pair("l2", "11")], at(9))
            .await
            .unwrap();
        assert_eq!(written, 2);

        let mapping = repo.get("acme", ObjectType::Contact, "l1").await.unwrap().unwrap();
        assert_eq!(mapping.remote_record_id, "10");
        assert_eq!(mapping.object_type, ObjectType::Contact);
        assert_eq!(mapping.last_synced_at, Some(at(9)));

        let by_remote = repo
            .find_by_remote("acme", ObjectType::Contact, "11")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_remote.local_entity_id, "l2");

        // Scoped by integration and object type
        assert!(repo.get("other", ObjectType::Contact, "l1").await.unwrap().is_none());
        assert!(repo.get("acme", ObjectType::Company, "l1").await.unwrap().is_none());
        assert_eq!(repo.count("acme", ObjectType::Contact).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_remote_id_and_moves_timestamp() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.mappings();

        repo.put("acme", ObjectType::Company, &pair("c1", "7"), at(9))
            .await
            .unwrap();
        repo.put("acme", ObjectType::Company, &pair("c1", "99"), at(10))
            .await
            .unwrap();

        let mapping = repo.get("acme", ObjectType::Company, "c1").await.unwrap().unwrap();
        assert_eq!(mapping.remote_record_id, "7");
        assert_eq!(mapping.last_synced_at, Some(at(10)));
        assert_eq!(repo.count("acme", ObjectType::Company).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_touch_synced_at() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.mappings();

        repo.put("acme", ObjectType::Contact, &pair("l1", "10"), at(9))
            .await
            .unwrap();
        let mapping = repo.get("acme", ObjectType::Contact, "l1").await.unwrap().unwrap();

        let later = at(9) + Duration::minutes(30);
        repo.touch_synced_at(&mapping.id, later).await.unwrap();

        let mapping = repo.get("acme", ObjectType::Contact, "l1").await.unwrap().unwrap();
        assert_eq!(mapping.last_synced_at, Some(later));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let written = db
            .mappings()
            .put_batch("acme", ObjectType::Contact, &[], at(9))
            .await
            .unwrap();
        assert_eq!(written, 0);
    }
}
