//! # Sync Runner
//!
//! Runs one sync of one integration: authorizes, takes the run lease, then
//! executes the enabled pull and push stages in a fixed order.
//!
//! ## Run States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Idle ──► Authorizing ──► Pulling(contact) ──► Pulling(company)         │
//! │               │                                      │                  │
//! │               │ configuration error                  ▼                  │
//! │               ▼                       Pushing(contact) ──► Pushing(company)
//! │            Aborted                                          │           │
//! │                                                             ▼           │
//! │                                                           Done          │
//! │                                                                         │
//! │  A stage runs only if the integration supports its direction and the   │
//! │  object type is both configured and selected for this run. A failed     │
//! │  stage is recorded in the report; the next stage still runs.            │
//! │  The lease is renewed before every stage; if another run has taken it   │
//! │  over, the remaining stages are skipped.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiClient, CrmApi, HttpApiClient};
use crate::config::{IntegrationConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::progress::{NoOpProgress, ProgressReporter};
use crate::pull::PullEngine;
use crate::push::PushEngine;
use crmsync_core::field_map::FieldCatalog;
use crmsync_core::{Feature, ObjectType, RunContext, SyncCounters, SyncWindow};
use crmsync_db::Database;

// =============================================================================
// Run State
// =============================================================================

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Authorizing,
    Pulling(ObjectType),
    Pushing(ObjectType),
    Done,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Authorizing => write!(f, "authorizing"),
            RunState::Pulling(ot) => write!(f, "pulling {}", ot),
            RunState::Pushing(ot) => write!(f, "pushing {}", ot),
            RunState::Done => write!(f, "done"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one stage (one object type, one direction).
#[derive(Debug)]
pub struct StageReport {
    pub object_type: ObjectType,
    pub feature: Feature,
    pub counters: SyncCounters,

    /// Processed-record marks at which pull mapping batches were written.
    pub mapping_flushes: Vec<u64>,

    /// The error that ended the stage early, if any.
    pub error: Option<SyncError>,
}

impl StageReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub integration: String,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Counters of every stage in one direction, summed.
    pub fn totals(&self, feature: Feature) -> SyncCounters {
        let mut totals = SyncCounters::default();
        for stage in self.stages.iter().filter(|s| s.feature == feature) {
            totals.absorb(&stage.counters);
        }
        totals
    }

    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(|s| !s.is_success())
    }

    pub fn stage(&self, feature: Feature, object_type: ObjectType) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|s| s.feature == feature && s.object_type == object_type)
    }
}

// =============================================================================
// Sync Runner
// =============================================================================

/// Runs syncs against the configured integrations.
pub struct SyncRunner {
    config: Arc<SyncConfig>,
    db: Database,
    client: Option<Arc<dyn ApiClient>>,
    progress: Arc<dyn ProgressReporter>,
    state: RwLock<RunState>,
}

impl SyncRunner {
    /// Creates a runner that talks HTTP and reports no progress.
    pub fn new(config: SyncConfig, db: Database) -> Self {
        SyncRunner {
            config: Arc::new(config),
            db,
            client: None,
            progress: Arc::new(NoOpProgress),
            state: RwLock::new(RunState::Idle),
        }
    }

    /// Uses `client` instead of building an HTTP client per integration.
    pub fn with_api_client(mut self, client: Arc<dyn ApiClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the current run state.
    pub async fn state(&self) -> RunState {
        *self.state.read().await
    }

    async fn transition(&self, next: RunState) {
        let mut state = self.state.write().await;
        debug!(from = %*state, to = %next, "Run state changed");
        *state = next;
    }

    /// Runs one sync.
    ///
    /// ## Arguments
    /// * `integration` - Configured integration name
    /// * `window` - Resolved run window (also carries the object selection)
    /// * `force` - Take over a lease another run still holds
    ///
    /// ## Returns
    /// * `Ok(RunReport)` - Every applicable stage ran; stage failures are in
    ///   the report
    /// * `Err(SyncError)` - The run was aborted before any stage
    pub async fn run(
        &self,
        integration: &str,
        window: SyncWindow,
        force: bool,
    ) -> SyncResult<RunReport> {
        self.transition(RunState::Authorizing).await;

        let prepared = match self.authorize(integration, &window) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(integration, error = %e, "Run aborted");
                self.transition(RunState::Aborted).await;
                return Err(e);
            }
        };
        let (cfg, objects, api) = prepared;

        let run = RunContext::new(integration, window);
        let holder = run.run_id.to_string();

        if let Err(e) = self.acquire_lease(&run, &holder, force).await {
            error!(integration, error = %e, "Run aborted");
            self.transition(RunState::Aborted).await;
            return Err(e);
        }

        info!(
            integration,
            run_id = %run.run_id,
            start = %run.window.start,
            end = %run.window.end,
            objects = ?objects,
            "Sync run started"
        );

        let stages = self.run_stages(&run, &holder, cfg, &objects, &api).await;

        match self.db.leases().release(integration, &holder).await {
            Ok(true) => debug!(integration, "Lease released"),
            Ok(false) => warn!(integration, "Lease was taken over during the run"),
            Err(e) => warn!(integration, error = %e, "Could not release lease"),
        }

        self.transition(RunState::Done).await;

        let report = RunReport {
            run_id: run.run_id,
            integration: integration.to_string(),
            started_at: run.started_at,
            stages,
        };

        info!(
            integration,
            run_id = %report.run_id,
            pulled = %report.totals(Feature::Pull),
            pushed = %report.totals(Feature::Push),
            requests = api.request_count(),
            "Sync run finished"
        );

        Ok(report)
    }

    /// Checks the integration and builds its API handle.
    fn authorize(
        &self,
        integration: &str,
        window: &SyncWindow,
    ) -> SyncResult<(&IntegrationConfig, Vec<ObjectType>, CrmApi)> {
        let cfg = self.config.integration(integration)?;

        if !cfg.is_authorized() {
            return Err(SyncError::NotAuthorized {
                integration: integration.to_string(),
            });
        }

        let objects: Vec<ObjectType> = ObjectType::ALL
            .into_iter()
            .filter(|ot| cfg.syncs(*ot) && window.includes(*ot))
            .collect();

        if objects.is_empty() {
            return Err(SyncError::NoObjectsConfigured {
                integration: integration.to_string(),
            });
        }

        for object_type in &objects {
            if cfg.field_map(*object_type).is_empty() {
                return Err(SyncError::EmptyFieldMap {
                    integration: integration.to_string(),
                    object_type: *object_type,
                });
            }
        }

        let api = self.api_for(cfg)?;
        Ok((cfg, objects, api))
    }

    fn api_for(&self, cfg: &IntegrationConfig) -> SyncResult<CrmApi> {
        let client: Arc<dyn ApiClient> = match self.client {
            Some(ref client) => client.clone(),
            None => Arc::new(HttpApiClient::new(
                &cfg.base_url,
                cfg.access_token.clone().unwrap_or_default(),
                self.config.sync.request_timeout(),
            )?),
        };
        Ok(CrmApi::new(client))
    }

    async fn acquire_lease(&self, run: &RunContext, holder: &str, force: bool) -> SyncResult<()> {
        let leases = self.db.leases();
        let acquired = leases
            .acquire(
                &run.integration,
                holder,
                self.config.sync.lease_ttl(),
                force,
                Utc::now(),
            )
            .await?;

        if acquired {
            return Ok(());
        }

        let holder = leases
            .current(&run.integration)
            .await?
            .map(|lease| lease.holder)
            .unwrap_or_else(|| "unknown".to_string());

        Err(SyncError::AlreadyRunning {
            integration: run.integration.clone(),
            holder,
        })
    }

    /// Extends the lease before a stage.
    ///
    /// Returns false once another holder has taken the lease over.
    async fn renew_lease(&self, integration: &str, holder: &str) -> bool {
        let renewed = self
            .db
            .leases()
            .acquire(
                integration,
                holder,
                self.config.sync.lease_ttl(),
                false,
                Utc::now(),
            )
            .await;

        match renewed {
            Ok(true) => true,
            Ok(false) => {
                error!(integration, holder, "Lease was taken over, skipping remaining stages");
                false
            }
            Err(e) => {
                warn!(integration, error = %e, "Could not renew lease");
                true
            }
        }
    }

    async fn run_stages(
        &self,
        run: &RunContext,
        holder: &str,
        cfg: &IntegrationConfig,
        objects: &[ObjectType],
        api: &CrmApi,
    ) -> Vec<StageReport> {
        let mut stages = Vec::new();

        if cfg.supports(Feature::Pull) {
            let engine = PullEngine::new(
                api.clone(),
                self.db.clone(),
                cfg.clone(),
                self.config.sync.clone(),
                self.progress.clone(),
            );
            for object_type in objects {
                if !self.renew_lease(&run.integration, holder).await {
                    return stages;
                }
                self.transition(RunState::Pulling(*object_type)).await;
                stages.push(engine.pull(run, *object_type).await);
            }
        }

        if cfg.supports(Feature::Push) {
            let engine = PushEngine::new(
                api.clone(),
                self.db.clone(),
                cfg.clone(),
                self.progress.clone(),
            );
            for object_type in objects {
                if !self.renew_lease(&run.integration, holder).await {
                    return stages;
                }
                self.transition(RunState::Pushing(*object_type)).await;
                stages.push(engine.push(run, *object_type).await);
            }
        }

        stages
    }

    /// Describes the remote fields of one object type.
    pub async fn describe_fields(
        &self,
        integration: &str,
        object_type: ObjectType,
    ) -> SyncResult<FieldCatalog> {
        let cfg = self.config.integration(integration)?;
        if !cfg.is_authorized() {
            return Err(SyncError::NotAuthorized {
                integration: integration.to_string(),
            });
        }

        self.api_for(cfg)?
            .describe_fields(object_type, &cfg.custom_field_aliases)
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
