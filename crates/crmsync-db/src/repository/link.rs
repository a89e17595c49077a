//! # Company Links
//!
//! Contact ⇄ company membership, with at most one primary company per contact.

use sqlx::SqlitePool;

use crate::error::DbResult;
use crmsync_core::ObjectType;

/// Repository for the `company_contacts` join table.
#[derive(Debug, Clone)]
pub struct CompanyLinkRepository {
    pool: SqlitePool,
}

impl CompanyLinkRepository {
    /// Creates a new CompanyLinkRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CompanyLinkRepository { pool }
    }

    /// Makes `company_id` the contact's primary company.
    ///
    /// Any other primary link of the contact is demoted. A `None` position
    /// keeps the stored one.
    pub async fn link_primary(
        &self,
        contact_id: &str,
        company_id: &str,
        position: Option<&str>,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE company_contacts SET is_primary = 0 WHERE contact_id = ?1 AND company_id != ?2",
        )
        .bind(contact_id)
        .bind(company_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO company_contacts (company_id, contact_id, is_primary, position)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (company_id, contact_id) DO UPDATE SET
                is_primary = 1,
                position = COALESCE(excluded.position, company_contacts.position)
            "#,
        )
        .bind(company_id)
        .bind(contact_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Local id of the contact's primary company, if any.
    pub async fn primary_company_id(&self, contact_id: &str) -> DbResult<Option<String>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT company_id FROM company_contacts WHERE contact_id = ?1 AND is_primary = 1 LIMIT 1",
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    /// Remote id of the contact's primary company for one integration.
    ///
    /// `None` when the contact has no primary company or that company has
    /// not been synced with the integration yet.
    pub async fn primary_company_remote_id(
        &self,
        integration: &str,
        contact_id: &str,
    ) -> DbResult<Option<String>> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT m.remote_record_id
            FROM company_contacts cc
            JOIN integration_mappings m
              ON m.local_entity_id = cc.company_id
             AND m.integration_name = ?1
             AND m.object_type = ?2
            WHERE cc.contact_id = ?3 AND cc.is_primary = 1
            LIMIT 1
            "#,
        )
        .bind(integration)
        .bind(ObjectType::Company)
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}
