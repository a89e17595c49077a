//! # Activity Repository
//!
//! Contact activity history (page hits, email reads, form submissions).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbResult;
use crmsync_core::activity::ActivityRecord;

/// Repository for contact activity history.
#[derive(Debug, Clone)]
pub struct ActivityRepository {
    pool: SqlitePool,
}

impl ActivityRepository {
    /// Creates a new ActivityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActivityRepository { pool }
    }

    /// Records an activity for a contact.
    pub async fn record(&self, contact_id: &str, activity: &ActivityRecord) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO contact_activities (id, contact_id, event, label, link, occurred_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(contact_id)
        .bind(&activity.event)
        .bind(&activity.label)
        .bind(&activity.link)
        .bind(activity.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Activities of one contact within `[start, end]`, oldest first.
    pub async fn for_contact(
        &self,
        contact_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<ActivityRecord>> {
        let records = sqlx::query_as::<_, ActivityRecord>(
            r#"
            SELECT event, label, link, occurred_at
            FROM contact_activities
            WHERE contact_id = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(contact_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
