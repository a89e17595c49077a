//! # Entity Store
//!
//! Local contacts and companies. Both tables share one shape, so a single
//! repository serves either object type; the table comes from the type's
//! [`ObjectProfile`](crmsync_core::ObjectProfile).
//!
//! ## Row Shape
//! ```text
//! ┌──────────┬─────────────┬────────────────┬──────────┬────────────┬────────────┐
//! │ id       │ natural_key │ fields (JSON)  │ owner_id │ created_at │ updated_at │
//! ├──────────┼─────────────┼────────────────┼──────────┼────────────┼────────────┤
//! │ uuid     │ ada@ex.com  │ {"email":..}   │ user id  │ RFC 3339   │ RFC 3339   │
//! └──────────┴─────────────┴────────────────┴──────────┴────────────┴────────────┘
//! ```
//!
//! ## Push Selection
//! ```text
//! to update:  mapped for this integration
//!             AND updated_at within the window
//!             AND (never synced OR updated_at > last_synced_at)
//! to create:  no mapping for this integration
//!             AND updated_at within the window
//!
//! Both pages are keyset-paginated on id: WHERE id > cursor ORDER BY id
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crmsync_core::{LocalEntity, ObjectType, UpsertOutcome};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    fields: String,
    owner_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn into_entity(self, object_type: ObjectType) -> DbResult<LocalEntity> {
        let fields: Map<String, Value> = serde_json::from_str(&self.fields)?;

        Ok(LocalEntity {
            id: self.id,
            object_type,
            fields,
            owner_id: self.owner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MappedRow {
    #[sqlx(flatten)]
    entity: EntityRow,
    mapping_id: String,
    remote_record_id: String,
}

/// A local entity together with the mapping that links it to a remote record.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEntity {
    pub entity: LocalEntity,
    pub mapping_id: String,
    pub remote_record_id: String,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for one local entity table.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
    object_type: ObjectType,
    table: &'static str,
}

impl EntityRepository {
    /// Creates a repository over the table for `object_type`.
    pub fn new(pool: SqlitePool, object_type: ObjectType) -> Self {
        EntityRepository {
            pool,
            object_type,
            table: object_type.profile().local_table,
        }
    }

    /// Normalized natural key (lowercased email or company name).
    fn natural_key(&self, fields: &Map<String, Value>) -> Option<String> {
        fields
            .get(self.object_type.profile().natural_key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets an entity by its local id.
    pub async fn get(&self, id: &str) -> DbResult<Option<LocalEntity>> {
        let sql = format!(
            "SELECT id, fields, owner_id, created_at, updated_at FROM {} WHERE id = ?1",
            self.table
        );

        sqlx::query_as::<_, EntityRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_entity(self.object_type))
            .transpose()
    }

    /// Finds an entity by natural key (case-insensitive).
    pub async fn find_by_natural_key(&self, key: &str) -> DbResult<Option<LocalEntity>> {
        let sql = format!(
            r#"
            SELECT id, fields, owner_id, created_at, updated_at FROM {}
            WHERE natural_key = ?1
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
            self.table
        );

        sqlx::query_as::<_, EntityRow>(&sql)
            .bind(key.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_entity(self.object_type))
            .transpose()
    }

    /// Counts all entities of this type.
    pub async fn count(&self) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts a new entity.
    pub async fn create(
        &self,
        fields: &Map<String, Value>,
        owner_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<LocalEntity> {
        let entity = LocalEntity {
            id: Uuid::new_v4().to_string(),
            object_type: self.object_type,
            fields: fields.clone(),
            owner_id: owner_id.map(str::to_string),
            created_at: at,
            updated_at: at,
        };

        let sql = format!(
            r#"
            INSERT INTO {} (id, natural_key, fields, owner_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            self.table
        );

        sqlx::query(&sql)
            .bind(&entity.id)
            .bind(self.natural_key(&entity.fields))
            .bind(serde_json::to_string(&entity.fields)?)
            .bind(&entity.owner_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        debug!(object_type = %self.object_type, id = %entity.id, "Entity created");

        Ok(entity)
    }

    /// Merges `fields` into an existing entity and bumps `updated_at`.
    ///
    /// Keys not present in `fields` keep their stored value. `owner_id` is
    /// only replaced when a new one is given.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No entity with this id
    pub async fn update(
        &self,
        id: &str,
        fields: &Map<String, Value>,
        owner_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<LocalEntity> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found(self.object_type.as_str(), id))?;

        self.merge_into(existing, fields, owner_id, at).await
    }

    async fn merge_into(
        &self,
        mut entity: LocalEntity,
        fields: &Map<String, Value>,
        owner_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<LocalEntity> {
        for (key, value) in fields {
            entity.fields.insert(key.clone(), value.clone());
        }
        if let Some(owner) = owner_id {
            entity.owner_id = Some(owner.to_string());
        }
        entity.updated_at = at;

        let sql = format!(
            r#"
            UPDATE {} SET
                natural_key = ?2,
                fields = ?3,
                owner_id = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
            self.table
        );

        sqlx::query(&sql)
            .bind(&entity.id)
            .bind(self.natural_key(&entity.fields))
            .bind(serde_json::to_string(&entity.fields)?)
            .bind(&entity.owner_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(entity)
    }

    /// Creates or updates the local entity for a pulled record.
    ///
    /// ## Matching Order
    /// 1. `known_id` (the mapped local entity), if it still exists
    /// 2. An entity with the same natural key
    /// 3. Otherwise a new entity is inserted
    ///
    /// ## Returns
    /// The local id and whether a new row was inserted.
    pub async fn upsert(
        &self,
        known_id: Option<&str>,
        fields: &Map<String, Value>,
        owner_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<UpsertOutcome> {
        let mut existing = match known_id {
            Some(id) => self.get(id).await?,
            None => None,
        };

        if existing.is_none() {
            if let Some(key) = self.natural_key(fields) {
                existing = self.find_by_natural_key(&key).await?;
            }
        }

        match existing {
            Some(entity) => {
                let entity = self.merge_into(entity, fields, owner_id, at).await?;
                Ok(UpsertOutcome {
                    entity_id: entity.id,
                    created: false,
                })
            }
            None => {
                let entity = self.create(fields, owner_id, at).await?;
                Ok(UpsertOutcome {
                    entity_id: entity.id,
                    created: true,
                })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Push Selection
    // -------------------------------------------------------------------------

    /// Next page of mapped entities changed since their last sync.
    ///
    /// ## Arguments
    /// * `after` - Keyset cursor; pass `""` for the first page
    pub async fn find_to_update(
        &self,
        integration: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        after: &str,
        limit: u32,
    ) -> DbResult<Vec<MappedEntity>> {
        let sql = format!(
            r#"
            SELECT e.id, e.fields, e.owner_id, e.created_at, e.updated_at,
                   m.id AS mapping_id, m.remote_record_id
            FROM {} e
            JOIN integration_mappings m
              ON m.local_entity_id = e.id
             AND m.integration_name = ?1
             AND m.object_type = ?2
            WHERE e.updated_at >= ?3 AND e.updated_at <= ?4
              AND (m.last_synced_at IS NULL OR e.updated_at > m.last_synced_at)
              AND e.id > ?5
            ORDER BY e.id ASC
            LIMIT ?6
            "#,
            self.table
        );

        let rows = sqlx::query_as::<_, MappedRow>(&sql)
            .bind(integration)
            .bind(self.object_type)
            .bind(start)
            .bind(end)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(MappedEntity {
                    entity: row.entity.into_entity(self.object_type)?,
                    mapping_id: row.mapping_id,
                    remote_record_id: row.remote_record_id,
                })
            })
            .collect()
    }

    /// Counts what [`find_to_update`](Self::find_to_update) would return
    /// across all pages.
    pub async fn count_to_update(
        &self,
        integration: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<u64> {
        let sql = format!(
            r#"
            SELECT COUNT(*)
            FROM {} e
            JOIN integration_mappings m
              ON m.local_entity_id = e.id
             AND m.integration_name = ?1
             AND m.object_type = ?2
            WHERE e.updated_at >= ?3 AND e.updated_at <= ?4
              AND (m.last_synced_at IS NULL OR e.updated_at > m.last_synced_at)
            "#,
            self.table
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(integration)
            .bind(self.object_type)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Next page of entities with no mapping for this integration.
    pub async fn find_to_create(
        &self,
        integration: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        after: &str,
        limit: u32,
    ) -> DbResult<Vec<LocalEntity>> {
        let sql = format!(
            r#"
            SELECT e.id, e.fields, e.owner_id, e.created_at, e.updated_at
            FROM {} e
            LEFT JOIN integration_mappings m
              ON m.local_entity_id = e.id
             AND m.integration_name = ?1
             AND m.object_type = ?2
            WHERE m.id IS NULL
              AND e.updated_at >= ?3 AND e.updated_at <= ?4
              AND e.id > ?5
            ORDER BY e.id ASC
            LIMIT ?6
            "#,
            self.table
        );

        let rows = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(integration)
            .bind(self.object_type)
            .bind(start)
            .bind(end)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| row.into_entity(self.object_type))
            .collect()
    }

    /// Counts what [`find_to_create`](Self::find_to_create) would return
    /// across all pages.
    pub async fn count_to_create(
        &self,
        integration: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<u64> {
        let sql = format!(
            r#"
            SELECT COUNT(*)
            FROM {} e
            LEFT JOIN integration_mappings m
              ON m.local_entity_id = e.id
             AND m.integration_name = ?1
             AND m.object_type = ?2
            WHERE m.id IS NULL
              AND e.updated_at >= ?3 AND e.updated_at <= ?4
            "#,
            self.table
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(integration)
            .bind(self.object_type)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use crmsync_core::MappingPair;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let contacts = db.entities(ObjectType::Contact);

        let created = contacts
            .create(&fields(json!({"email": "Ada@Example.com", "firstname": "Ada"})), None, at(9))
            .await
            .unwrap();

        let loaded = contacts.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.field("firstname"), &json!("Ada"));

        let by_key = contacts.find_by_natural_key("ada@example.com").await.unwrap();
        assert_eq!(by_key.map(|e| e.id), Some(created.id));
        assert_eq!(contacts.count().await.unwrap(), 1);
        assert_eq!(db.entities(ObjectType::Company).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_matching_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let contacts = db.entities(ObjectType::Contact);

        let first = contacts
            .upsert(None, &fields(json!({"email": "ada@example.com", "city": "London"})), None, at(9))
            .await
            .unwrap();
        assert!(first.created);

        // Natural key match, merged fields
        let second = contacts
            .upsert(None, &fields(json!({"email": "ADA@example.com", "phone": "123"})), None, at(10))
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.entity_id, first.entity_id);

        let merged = contacts.get(&first.entity_id).await.unwrap().unwrap();
        assert_eq!(merged.field("city"), &json!("London"));
        assert_eq!(merged.field("phone"), &json!("123"));
        assert_eq!(merged.updated_at, at(10));

        // Known id wins even when the natural key changes
        let third = contacts
            .upsert(
                Some(&first.entity_id),
                &fields(json!({"email": "lovelace@example.com"})),
                None,
                at(11),
            )
            .await
            .unwrap();
        assert_eq!(third.entity_id, first.entity_id);
        assert!(contacts.find_by_natural_key("lovelace@example.com").await.unwrap().is_some());

        // Stale known id falls through to insert
        let fourth = contacts
            .upsert(Some("missing"), &fields(json!({"email": "grace@example.com"})), None, at(11))
            .await
            .unwrap();
        assert!(fourth.created);
        assert_eq!(contacts.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_entity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db
            .entities(ObjectType::Company)
            .update("nope", &Map::new(), None, at(9))
            .await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_push_selection() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let contacts = db.entities(ObjectType::Contact);
        let mappings = db.mappings();

        let synced = contacts
            .create(&fields(json!({"email": "a@example.com"})), None, at(9))
            .await
            .unwrap();
        let edited = contacts
            .create(&fields(json!({"email": "b@example.com"})), None, at(9))
            .await
            .unwrap();
        let fresh = contacts
            .create(&fields(json!({"email": "c@example.com"})), None, at(10))
            .await
            .unwrap();

        for (entity, remote) in [(&synced, "1"), (&edited, "2")] {
            let pair = MappingPair {
                local_entity_id: entity.id.clone(),
                remote_record_id: remote.to_string(),
            };
            mappings
                .put("acme", ObjectType::Contact, &pair, at(9))
                .await
                .unwrap();
        }

        // Local edit after the last sync
        contacts
            .update(&edited.id, &fields(json!({"city": "Paris"})), None, at(9) + Duration::minutes(5))
            .await
            .unwrap();

        let start = at(8);
        let end = at(12);

        let to_update = contacts
            .find_to_update("acme", start, end, "", 100)
            .await
            .unwrap();
        assert_eq!(to_update.len(), 1);
        assert_eq!(to_update[0].entity.id, edited.id);
        assert_eq!(to_update[0].remote_record_id, "2");
        assert_eq!(contacts.count_to_update("acme", start, end).await.unwrap(), 1);

        let to_create = contacts
            .find_to_create("acme", start, end, "", 100)
            .await
            .unwrap();
        assert_eq!(to_create.len(), 1);
        assert_eq!(to_create[0].id, fresh.id);
        assert_eq!(contacts.count_to_create("acme", start, end).await.unwrap(), 1);

        // Another integration has no mappings at all
        assert_eq!(contacts.count_to_create("other", start, end).await.unwrap(), 3);

        // Window excludes rows outside it
        assert_eq!(
            contacts.count_to_create("acme", at(11), end).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_keyset_pagination() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let companies = db.entities(ObjectType::Company);

        for n in 0..5 {
            companies
                .create(&fields(json!({"name": format!("Company {}", n)})), None, at(9))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = String::new();
        loop {
            let page = companies
                .find_to_create("acme", at(8), at(10), &cursor, 2)
                .await
                .unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 2);
            cursor = page.last().map(|e| e.id.clone()).unwrap();
            seen.extend(page.into_iter().map(|e| e.id));
        }

        assert_eq!(seen.len(), 5);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }
}
