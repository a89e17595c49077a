//! # Push Engine
//!
//! Local → remote for one object type, in two phases:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  estimate = count_to_update + count_to_create                           │
//! │                                                                         │
//! │  Update phase (mapped, changed in window, not synced since)             │
//! │    fetch ≤ limit after cursor ──► PATCH /<collection>/<remote id>       │
//! │      ok        → touch last_synced_at, updated += 1                     │
//! │      ApiError  → errored += 1 (404: "record does not exist remotely")   │
//! │    until a fetch returns nothing                                        │
//! │                                                                         │
//! │  Create phase (no mapping, changed in window)                           │
//! │    fetch ≤ limit after cursor ──► POST /<collection>                    │
//! │      data.id   → new mapping, created += 1                              │
//! │      no id     → neither created nor errored                            │
//! │      ApiError  → errored += 1                                           │
//! │                                                                         │
//! │  ignored = estimate - (updated + created + errored)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both phases walk candidates by ascending local id, so a record is
//! offered to the remote at most once per run.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::api::CrmApi;
use crate::config::IntegrationConfig;
use crate::error::SyncResult;
use crate::progress::ProgressReporter;
use crate::runner::StageReport;
use crmsync_core::activity::activities_payload;
use crmsync_core::field_map::{attach_owner, attach_primary_company};
use crmsync_core::{Feature, LocalEntity, MappingPair, ObjectType, RunContext, SyncCounters};
use crmsync_db::Database;

/// Pushes local changes of one object type to the remote service.
pub struct PushEngine {
    api: CrmApi,
    db: Database,
    integration: IntegrationConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl PushEngine {
    pub fn new(
        api: CrmApi,
        db: Database,
        integration: IntegrationConfig,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        PushEngine {
            api,
            db,
            integration,
            progress,
        }
    }

    /// Runs the push stage for `object_type`.
    ///
    /// Per-record API errors are counted; anything else ends the stage and
    /// is carried in the report.
    pub async fn push(&self, run: &RunContext, object_type: ObjectType) -> StageReport {
        info!(
            integration = %run.integration,
            object_type = %object_type,
            start = %run.window.start,
            end = %run.window.end,
            limit = run.window.limit,
            "Push started"
        );

        let requests_before = self.api.request_count();
        let mut counters = SyncCounters::default();

        let error = match self.push_phases(run, object_type, &mut counters).await {
            Ok(()) => None,
            Err(e) => {
                error!(
                    integration = %run.integration,
                    object_type = %object_type,
                    error = %e,
                    "Push failed"
                );
                Some(e)
            }
        };

        self.progress.finish();

        info!(
            integration = %run.integration,
            object_type = %object_type,
            counters = %counters,
            requests = self.api.request_count().saturating_sub(requests_before),
            "Push finished"
        );

        StageReport {
            object_type,
            feature: Feature::Push,
            counters,
            mapping_flushes: Vec::new(),
            error,
        }
    }

    async fn push_phases(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        counters: &mut SyncCounters,
    ) -> SyncResult<()> {
        let entities = self.db.entities(object_type);
        let window = &run.window;

        let to_update = entities
            .count_to_update(&run.integration, window.start, window.end)
            .await?;
        let to_create = entities
            .count_to_create(&run.integration, window.start, window.end)
            .await?;
        let estimate = to_update + to_create;

        debug!(object_type = %object_type, to_update, to_create, "Push candidates counted");
        self.progress.start(&format!("push {}", object_type), estimate);

        let mut fetched = self.update_phase(run, object_type, counters).await?;
        fetched += self.create_phase(run, object_type, counters).await?;

        counters.ignored = ignored_count(object_type, estimate, fetched, counters);
        Ok(())
    }

    /// Returns the number of candidates fetched.
    async fn update_phase(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        counters: &mut SyncCounters,
    ) -> SyncResult<u64> {
        let entities = self.db.entities(object_type);
        let mappings = self.db.mappings();
        let window = &run.window;

        let mut after = String::new();
        let mut fetched = 0u64;

        loop {
            let batch = entities
                .find_to_update(&run.integration, window.start, window.end, &after, window.limit)
                .await?;

            let Some(last) = batch.last() else {
                break;
            };
            after = last.entity.id.clone();
            fetched += batch.len() as u64;

            for mapped in batch {
                let payload = self.payload(run, object_type, &mapped.entity).await?;

                match self
                    .api
                    .update(object_type, &mapped.remote_record_id, payload)
                    .await
                {
                    Ok(()) => {
                        mappings.touch_synced_at(&mapped.mapping_id, Utc::now()).await?;
                        counters.updated += 1;
                    }
                    Err(e) if e.is_not_found() => {
                        warn!(
                            object_type = %object_type,
                            local_id = %mapped.entity.id,
                            remote_id = %mapped.remote_record_id,
                            "Record missing remotely"
                        );
                        counters.errored += 1;
                    }
                    Err(e) => {
                        warn!(
                            object_type = %object_type,
                            local_id = %mapped.entity.id,
                            remote_id = %mapped.remote_record_id,
                            error = %e,
                            "Update failed"
                        );
                        counters.errored += 1;
                    }
                }

                self.progress.advance(1);
            }
        }

        Ok(fetched)
    }

    /// Returns the number of candidates fetched.
    async fn create_phase(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        counters: &mut SyncCounters,
    ) -> SyncResult<u64> {
        let entities = self.db.entities(object_type);
        let mappings = self.db.mappings();
        let window = &run.window;

        let mut after = String::new();
        let mut fetched = 0u64;

        loop {
            let batch = entities
                .find_to_create(&run.integration, window.start, window.end, &after, window.limit)
                .await?;

            let Some(last) = batch.last() else {
                break;
            };
            after = last.id.clone();
            fetched += batch.len() as u64;

            for entity in batch {
                let payload = self.payload(run, object_type, &entity).await?;

                match self.api.create(object_type, payload).await {
                    Ok(Some(remote_id)) => {
                        let pair = MappingPair {
                            local_entity_id: entity.id.clone(),
                            remote_record_id: remote_id,
                        };
                        mappings
                            .put(&run.integration, object_type, &pair, Utc::now())
                            .await?;
                        counters.created += 1;
                    }
                    Ok(None) => {
                        warn!(
                            object_type = %object_type,
                            local_id = %entity.id,
                            "Create response carried no id"
                        );
                    }
                    Err(e) => {
                        warn!(
                            object_type = %object_type,
                            local_id = %entity.id,
                            error = %e,
                            "Create failed"
                        );
                        counters.errored += 1;
                    }
                }

                self.progress.advance(1);
            }
        }

        Ok(fetched)
    }

    /// Builds the remote payload for one entity, resolving relationships by
    /// side lookup.
    async fn payload(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        entity: &LocalEntity,
    ) -> SyncResult<Map<String, Value>> {
        let profile = object_type.profile();
        let mut payload = self.integration.field_map(object_type).to_external(&entity.fields);

        if profile.resolves_relationships {
            if let Some(company_id) = self
                .db
                .company_links()
                .primary_company_remote_id(&run.integration, &entity.id)
                .await?
            {
                attach_primary_company(&mut payload, &company_id);
            }

            if let Some(owner_id) = entity.owner_id.as_deref() {
                if let Some(owner) = self.db.users().get(owner_id).await? {
                    attach_owner(&mut payload, &owner.display_name());
                }
            }
        }

        if profile.carries_activities && !self.integration.activity_events.is_empty() {
            let records = self
                .db
                .activities()
                .for_contact(&entity.id, run.window.start, run.window.end)
                .await?;
            let activities = activities_payload(&records, &self.integration.activity_events);
            if !activities.is_empty() {
                payload.insert("activities".to_string(), Value::Array(activities));
            }
        }

        Ok(payload)
    }
}

/// Candidates neither pushed nor failed.
///
/// When more records were processed than estimated (candidates appeared
/// after counting), the number actually fetched replaces the estimate.
fn ignored_count(
    object_type: ObjectType,
    estimate: u64,
    fetched: u64,
    counters: &SyncCounters,
) -> u64 {
    let processed = counters.processed();

    match estimate.checked_sub(processed) {
        Some(ignored) => ignored,
        None => {
            warn!(
                object_type = %object_type,
                estimate,
                processed,
                fetched,
                "Processed more records than estimated, using fetched count"
            );
            fetched.saturating_sub(processed)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
