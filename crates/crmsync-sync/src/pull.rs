//! # Pull Engine
//!
//! Remote → local for one object type.
//!
//! ## Page Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  query = {page: 1, modified_since: window.start}                        │
//! │                                                                         │
//! │  ┌──► GET /<collection>?query                                           │
//! │  │      first page: expected = meta.total, progress.start(expected)     │
//! │  │      each record: map → upsert entity → queue {local, remote}        │
//! │  │      every 100 processed: flush mapping batch, release memory        │
//! │  │                                                                      │
//! │  │    links.next?  ──yes──► page = next.page, retries = 0 ──────────┐   │
//! │  │        │ no                                                     │   │
//! │  │        ▼                                                        │   │
//! │  │    processed >= expected ──yes──► final flush, done             │   │
//! │  │        │ no                                                     │   │
//! │  │        ▼                                                        │   │
//! │  │    retries < 5 ──no──► FatalSync { expected, actual }           │   │
//! │  │        │ yes: sleep, retry the same query                       │   │
//! │  └────────┴────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records already seen in this stage are skipped, so a retried page never
//! counts a record twice. A `next` link that does not move past the current
//! page ends the stage with `FatalSync`. Any error ends the stage with the
//! counters accumulated so far.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::api::{CrmApi, PageQuery};
use crate::config::{IntegrationConfig, SyncSettings};
use crate::error::{SyncError, SyncResult};
use crate::progress::ProgressReporter;
use crate::runner::StageReport;
use crmsync_core::field_map::{remote_id, PrimaryCompany};
use crmsync_core::{Feature, MappingPair, ObjectType, RunContext, SyncCounters};
use crmsync_db::Database;

// =============================================================================
// Pull State
// =============================================================================

/// Mutable state of one pull stage.
#[derive(Debug, Default)]
struct PullState {
    counters: SyncCounters,

    /// Records taken from pages, whatever their outcome.
    processed: u64,

    /// `meta.total` of the first page.
    expected: Option<u64>,

    started: bool,

    /// Remote ids processed in this stage. Grows with the collection (one
    /// short string per record) and is the only per-stage state that does;
    /// it is what keeps a retried page from counting a record twice.
    seen: HashSet<String>,

    /// Mappings of the pulled object type not yet written.
    pending: Vec<MappingPair>,

    /// Company mappings discovered through contacts' primary companies.
    pending_companies: Vec<MappingPair>,

    /// Remote → local id of companies in the pending batch.
    pending_company_ids: HashMap<String, String>,

    /// `processed` at each flush.
    flushes: Vec<u64>,
}

impl PullState {
    fn since_last_flush(&self) -> u64 {
        self.processed - self.flushes.last().copied().unwrap_or(0)
    }
}

// =============================================================================
// Pull Engine
// =============================================================================

/// Pulls one remote collection into the local store.
pub struct PullEngine {
    api: CrmApi,
    db: Database,
    integration: IntegrationConfig,
    settings: SyncSettings,
    progress: Arc<dyn ProgressReporter>,
}

impl PullEngine {
    pub fn new(
        api: CrmApi,
        db: Database,
        integration: IntegrationConfig,
        settings: SyncSettings,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        PullEngine {
            api,
            db,
            integration,
            settings,
            progress,
        }
    }

    /// Runs the pull stage for `object_type`.
    ///
    /// Never fails: an error ends the stage and is carried in the report
    /// together with the partial counters.
    pub async fn pull(&self, run: &RunContext, object_type: ObjectType) -> StageReport {
        info!(
            integration = %run.integration,
            object_type = %object_type,
            since = %run.window.start,
            "Pull started"
        );

        let mut state = PullState::default();

        let error = match self.pull_pages(run, object_type, &mut state).await {
            Ok(()) => None,
            Err(e) => {
                error!(
                    integration = %run.integration,
                    object_type = %object_type,
                    processed = state.processed,
                    error = %e,
                    "Pull failed"
                );

                // Entities already upserted keep their mappings.
                if let Err(flush_err) = self.flush(run, object_type, &mut state).await {
                    warn!(error = %flush_err, "Could not flush pending mappings");
                }
                Some(e)
            }
        };

        if state.started {
            self.progress.finish();
        }

        info!(
            integration = %run.integration,
            object_type = %object_type,
            counters = %state.counters,
            "Pull finished"
        );

        StageReport {
            object_type,
            feature: Feature::Pull,
            counters: state.counters,
            mapping_flushes: state.flushes,
            error,
        }
    }

    async fn pull_pages(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        state: &mut PullState,
    ) -> SyncResult<()> {
        let mut query = PageQuery::since(run.window.start);
        let mut retries = 0u32;

        loop {
            let page = self.api.fetch_page(object_type, &query).await?;

            if !state.started {
                state.started = true;
                state.expected = page.meta.total;
                self.progress
                    .start(&format!("pull {}", object_type), page.meta.total.unwrap_or(0));
            }

            for record in &page.data {
                self.pull_record(run, object_type, record, state).await?;

                if state.since_last_flush() >= self.settings.mapping_batch_size as u64 {
                    self.flush(run, object_type, state).await?;
                }
            }

            if page.has_next() {
                let next = page.next_page_number().unwrap_or(query.page + 1);
                if next <= query.page {
                    warn!(
                        object_type = %object_type,
                        page = query.page,
                        next,
                        "Next link does not advance"
                    );
                    return Err(SyncError::FatalSync {
                        object_type,
                        expected: state.expected.unwrap_or(state.processed),
                        actual: state.processed,
                    });
                }

                query.page = next;
                retries = 0;
                continue;
            }

            let Some(expected) = state.expected else {
                break;
            };
            if state.processed >= expected {
                break;
            }

            if retries >= self.settings.page_retry_limit {
                return Err(SyncError::FatalSync {
                    object_type,
                    expected,
                    actual: state.processed,
                });
            }

            retries += 1;
            warn!(
                object_type = %object_type,
                page = query.page,
                expected,
                processed = state.processed,
                retry = retries,
                "Pagination ended short of the reported total, retrying"
            );
            tokio::time::sleep(self.settings.page_retry_delay()).await;
        }

        self.flush(run, object_type, state).await
    }

    async fn pull_record(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        record: &Value,
        state: &mut PullState,
    ) -> SyncResult<()> {
        if let Some(id) = record.get("id").and_then(remote_id) {
            if !state.seen.insert(id) {
                return Ok(());
            }
        }

        state.processed += 1;
        self.progress.advance(1);

        let flat = match self.integration.field_map(object_type).to_local(
            object_type,
            record,
            &self.integration.custom_field_aliases,
        ) {
            Ok(flat) => flat,
            Err(e) => {
                warn!(object_type = %object_type, error = %e, "Skipping unmappable record");
                state.counters.errored += 1;
                return Ok(());
            }
        };

        if !flat.unresolved_aliases.is_empty() {
            warn!(
                remote_id = %flat.remote_id,
                aliases = ?flat.unresolved_aliases,
                "Dropped custom fields with unknown aliases"
            );
        }

        let owner_id = match flat.owner.as_ref().and_then(|o| o.email.as_deref()) {
            Some(email) => self.db.users().find_by_email(email).await?.map(|u| u.id),
            None => None,
        };

        let known_id = self
            .db
            .mappings()
            .find_by_remote(&run.integration, object_type, &flat.remote_id)
            .await?
            .map(|m| m.local_entity_id);

        let outcome = self
            .db
            .entities(object_type)
            .upsert(
                known_id.as_deref(),
                &flat.fields,
                owner_id.as_deref(),
                run.started_at,
            )
            .await?;

        if outcome.created {
            state.counters.created += 1;
        } else {
            state.counters.updated += 1;
        }

        debug!(
            remote_id = %flat.remote_id,
            local_id = %outcome.entity_id,
            created = outcome.created,
            "Record pulled"
        );

        state.pending.push(MappingPair {
            local_entity_id: outcome.entity_id.clone(),
            remote_record_id: flat.remote_id,
        });

        if let Some(company) = flat.primary_company {
            self.pull_primary_company(run, &outcome.entity_id, company, state)
                .await?;
        }

        Ok(())
    }

    /// Upserts a contact's primary company and links it to the contact.
    async fn pull_primary_company(
        &self,
        run: &RunContext,
        contact_id: &str,
        company: PrimaryCompany,
        state: &mut PullState,
    ) -> SyncResult<()> {
        let known_id = match company.remote_id.as_deref() {
            Some(rid) => match state.pending_company_ids.get(rid) {
                Some(local) => Some(local.clone()),
                None => self
                    .db
                    .mappings()
                    .find_by_remote(&run.integration, ObjectType::Company, rid)
                    .await?
                    .map(|m| m.local_entity_id),
            },
            None => None,
        };

        let mut fields = match company.remote_id {
            Some(_) => self
                .integration
                .field_map(ObjectType::Company)
                .to_local(
                    ObjectType::Company,
                    &company.record,
                    &self.integration.custom_field_aliases,
                )
                .map(|flat| flat.fields)
                .unwrap_or_default(),
            None => Map::new(),
        };
        fields
            .entry(ObjectType::Company.profile().natural_key)
            .or_insert_with(|| Value::String(company.name.clone()));

        let outcome = self
            .db
            .entities(ObjectType::Company)
            .upsert(known_id.as_deref(), &fields, None, run.started_at)
            .await?;

        let position = company.position.as_ref().and_then(Value::as_str);
        self.db
            .company_links()
            .link_primary(contact_id, &outcome.entity_id, position)
            .await?;

        if let Some(rid) = company.remote_id {
            if !state.pending_company_ids.contains_key(&rid) {
                state
                    .pending_company_ids
                    .insert(rid.clone(), outcome.entity_id.clone());
                state.pending_companies.push(MappingPair {
                    local_entity_id: outcome.entity_id,
                    remote_record_id: rid,
                });
            }
        }

        Ok(())
    }

    /// Writes pending mappings as one batch per object type, then lets the
    /// store drop cached pages.
    async fn flush(
        &self,
        run: &RunContext,
        object_type: ObjectType,
        state: &mut PullState,
    ) -> SyncResult<()> {
        if state.since_last_flush() == 0 && state.pending.is_empty() {
            return Ok(());
        }

        let mappings = self.db.mappings();

        let written = mappings
            .put_batch(&run.integration, object_type, &state.pending, run.started_at)
            .await?;
        state.pending.clear();

        if !state.pending_companies.is_empty() {
            mappings
                .put_batch(
                    &run.integration,
                    ObjectType::Company,
                    &state.pending_companies,
                    run.started_at,
                )
                .await?;
            state.pending_companies.clear();
            state.pending_company_ids.clear();
        }

        state.flushes.push(state.processed);
        debug!(
            object_type = %object_type,
            processed = state.processed,
            written,
            "Mapping batch flushed"
        );

        self.db.release_memory().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Method;
    use crate::testing::{
        contact, pull_engine, pull_engine_with_progress, run_context, test_db, FakeApi,
        RecordingProgress,
    };
    use serde_json::json;

    #[tokio::test]
    async fn test_pull_250_contacts_in_three_pages() {
        let db = test_db().await;
        let records: Vec<Value> = (1..=250).map(contact).collect();
        let fake = Arc::new(FakeApi::new().with_records(ObjectType::Contact, records, 100));
        let engine = pull_engine(fake.clone(), &db);
        let run = run_context(&[ObjectType::Contact]);

        let report = engine.pull(&run, ObjectType::Contact).await;

        assert!(report.error.is_none());
        assert_eq!(report.counters.created, 250);
        assert_eq!(report.counters.updated, 0);
        assert_eq!(report.mapping_flushes, vec![100, 200, 250]);

        let requests = fake.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.method == Method::Get));
        let pages: Vec<_> = requests.iter().map(|r| r.parameters["page"].clone()).collect();
        assert_eq!(pages, vec![json!(1), json!(2), json!(3)]);
        assert!(requests[0].parameters.get("modified_since").is_some());

        assert_eq!(db.mappings().count("acme", ObjectType::Contact).await.unwrap(), 250);
        assert_eq!(db.entities(ObjectType::Contact).count().await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_progress_follows_reported_total() {
        let db = test_db().await;
        let records: Vec<Value> = (1..=250).map(contact).collect();
        let fake = Arc::new(FakeApi::new().with_records(ObjectType::Contact, records, 100));
        let progress = Arc::new(RecordingProgress::default());
        let engine = pull_engine_with_progress(fake, &db, progress.clone());

        let report = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;
        assert!(report.error.is_none());

        let log = progress.log();
        assert_eq!(log.starts, vec![("pull contact".to_string(), 250)]);
        assert_eq!(log.advances, 250);
        assert_eq!(log.finishes, 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_batch_size_has_no_extra_flush() {
        let db = test_db().await;
        let records: Vec<Value> = (1..=200).map(contact).collect();
        let fake = Arc::new(FakeApi::new().with_records(ObjectType::Contact, records, 100));
        let engine = pull_engine(fake, &db);

        let report = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;

        assert!(report.error.is_none());
        assert_eq!(report.counters.created, 200);
        assert_eq!(report.mapping_flushes, vec![100, 200]);
        assert_eq!(db.mappings().count("acme", ObjectType::Contact).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_next_link_to_same_page_is_fatal() {
        let db = test_db().await;
        let page = json!({
            "data": [contact(1), contact(2)],
            "meta": { "total": 10 },
            "links": { "next": "https://crm.test/api/v1/people?page=1" }
        });
        let fake = Arc::new(FakeApi::new().with_pages(ObjectType::Contact, vec![page]));
        let engine = pull_engine(fake.clone(), &db);

        let report = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;

        match report.error {
            Some(SyncError::FatalSync {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 2);
            }
            other => panic!("expected FatalSync, got {:?}", other),
        }
        assert_eq!(fake.requests().len(), 1);
        assert_eq!(report.counters.created, 2);
    }

    #[tokio::test]
    async fn test_pulling_twice_updates_instead_of_duplicating() {
        let db = test_db().await;
        let fake = Arc::new(FakeApi::new().with_records(
            ObjectType::Contact,
            vec![contact(7), contact(8)],
            100,
        ));
        let engine = pull_engine(fake, &db);

        let first = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;
        assert_eq!(first.counters.created, 2);

        let second = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;
        assert_eq!(second.counters.created, 0);
        assert_eq!(second.counters.updated, 2);

        assert_eq!(db.mappings().count("acme", ObjectType::Contact).await.unwrap(), 2);
        assert_eq!(db.entities(ObjectType::Contact).count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_short_pagination_fails_after_five_retries() {
        let db = test_db().await;
        let records: Vec<Value> = (1..=5).map(contact).collect();
        let fake = Arc::new(FakeApi::new().with_collection(ObjectType::Contact, records, 100, 10));
        let engine = pull_engine(fake.clone(), &db);

        let report = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;

        match report.error {
            Some(SyncError::FatalSync {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 5);
            }
            other => panic!("expected FatalSync, got {:?}", other),
        }

        // One request plus five retries of the same page
        let requests = fake.requests();
        assert_eq!(requests.len(), 6);
        assert!(requests.iter().all(|r| r.parameters["page"] == json!(1)));

        // Partial results are kept
        assert_eq!(report.counters.created, 5);
        assert_eq!(report.mapping_flushes, vec![5]);
        assert_eq!(db.mappings().count("acme", ObjectType::Contact).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_api_error_ends_stage() {
        let db = test_db().await;
        let fake = Arc::new(FakeApi::new().failing_collection(ObjectType::Company));
        let engine = pull_engine(fake, &db);

        let report = engine
            .pull(&run_context(&[ObjectType::Company]), ObjectType::Company)
            .await;

        assert!(matches!(report.error, Some(SyncError::Api(_))));
        assert_eq!(report.counters, SyncCounters::default());
    }

    #[tokio::test]
    async fn test_unmappable_record_is_skipped() {
        let db = test_db().await;
        let fake = Arc::new(FakeApi::new().with_records(
            ObjectType::Contact,
            vec![contact(1), json!({"email": "no-id@example.com"}), contact(2)],
            100,
        ));
        let engine = pull_engine(fake, &db);

        let report = engine
            .pull(&run_context(&[ObjectType::Contact]), ObjectType::Contact)
            .await;

        assert!(report.error.is_none());
        assert_eq!(report.counters.created, 2);
        assert_eq!(report.counters.errored, 1);
    }

    #[tokio::test]
    async fn test_contact_relationships_are_resolved() {
        let db = test_db().await;
        let owner = db
            .users()
            .create("owner@example.com", "Grace", "Hopper")
            .await
            .unwrap();

        let mut record = contact(1);
        record["user"] = json!({"email": "owner@example.com", "first_name": "Grace"});
        record["companies"] = json!([
            {"id": 9, "name": "Analytical Engines", "industry": "Computing",
             "pivot": {"primary": 1, "position": "CTO"}}
        ]);

        let fake = Arc::new(
            FakeApi::new()
                .with_records(ObjectType::Contact, vec![record], 100)
                .with_records(
                    ObjectType::Company,
                    vec![json!({"id": 9, "name": "Analytical Engines", "industry": "Engines"})],
                    100,
                ),
        );
        let engine = pull_engine(fake, &db);

        let report = engine
            .pull(&run_context(&ObjectType::ALL), ObjectType::Contact)
            .await;
        assert!(report.error.is_none());
        assert_eq!(report.counters.created, 1);

        let mapping = db
            .mappings()
            .find_by_remote("acme", ObjectType::Contact, "1")
            .await
            .unwrap()
            .unwrap();
        let stored = db
            .entities(ObjectType::Contact)
            .get(&mapping.local_entity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.owner_id.as_deref(), Some(owner.id.as_str()));
        assert_eq!(stored.fields["company"], json!("Analytical Engines"));
        assert_eq!(stored.fields["position"], json!("CTO"));

        let company_mapping = db
            .mappings()
            .find_by_remote("acme", ObjectType::Company, "9")
            .await
            .unwrap()
            .unwrap();
        let primary = db
            .company_links()
            .primary_company_id(&stored.id)
            .await
            .unwrap();
        assert_eq!(primary.as_deref(), Some(company_mapping.local_entity_id.as_str()));

        // The company pull finds the company through its mapping
        let companies = engine
            .pull(&run_context(&ObjectType::ALL), ObjectType::Company)
            .await;
        assert_eq!(companies.counters.updated, 1);
        assert_eq!(companies.counters.created, 0);
        assert_eq!(db.entities(ObjectType::Company).count().await.unwrap(), 1);
    }
}
