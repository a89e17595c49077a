//! Test fixtures: a scripted API client, an in-memory database and a
//! ready-made `acme` integration.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiResponse, CrmApi, Method};
use crate::config::{IntegrationConfig, SyncConfig, SyncSettings};
use crate::error::ApiError;
use crate::progress::{NoOpProgress, ProgressReporter};
use crate::pull::PullEngine;
use crate::push::PushEngine;
use crmsync_core::validation::WindowRequest;
use crmsync_core::{ObjectType, RunContext, SyncWindow};
use crmsync_db::{Database, DbConfig};

// =============================================================================
// Fake API
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub operation: String,
    pub parameters: Value,
    pub method: Method,
}

#[derive(Default)]
struct FakeState {
    /// Collection path → page bodies, page 1 first.
    pages: HashMap<String, Vec<Value>>,
    failing_collections: HashSet<String>,
    missing_remotely: HashSet<String>,
    /// Emails whose POST is answered with a 422.
    rejected_creates: HashSet<String>,
    create_without_id: bool,
    next_id: u64,
    requests: Vec<RecordedRequest>,
}

/// Scripted [`ApiClient`] that records every request.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

fn collection(object_type: ObjectType) -> String {
    format!("/{}", object_type.profile().remote_collection)
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure(mut self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(self.state.get_mut().unwrap());
        self
    }

    /// Serves `records` in pages of `page_size`, reporting their count as
    /// the total.
    pub fn with_records(self, object_type: ObjectType, records: Vec<Value>, page_size: usize) -> Self {
        let total = records.len() as u64;
        self.with_collection(object_type, records, page_size, total)
    }

    /// Serves `records` in pages of `page_size` with an arbitrary reported
    /// total.
    pub fn with_collection(
        self,
        object_type: ObjectType,
        records: Vec<Value>,
        page_size: usize,
        total: u64,
    ) -> Self {
        let path = collection(object_type);
        let chunks: Vec<Vec<Value>> = records.chunks(page_size).map(|c| c.to_vec()).collect();
        let count = chunks.len();

        let pages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, data)| {
                let next = if i + 1 < count {
                    json!(format!("https://crm.test/api/v1{}?page={}", path, i + 2))
                } else {
                    Value::Null
                };
                json!({ "data": data, "meta": { "total": total }, "links": { "next": next } })
            })
            .collect();

        self.configure(|s| {
            s.pages.insert(path, pages);
        })
    }

    /// Serves hand-written page bodies, page 1 first.
    pub fn with_pages(self, object_type: ObjectType, pages: Vec<Value>) -> Self {
        self.configure(|s| {
            s.pages.insert(collection(object_type), pages);
        })
    }

    /// Answers every GET on the collection with a 500.
    pub fn failing_collection(self, object_type: ObjectType) -> Self {
        self.configure(|s| {
            s.failing_collections.insert(collection(object_type));
        })
    }

    /// Answers PATCH on this remote id with a 404.
    pub fn missing_remotely(self, remote_id: &str) -> Self {
        let id = remote_id.to_string();
        self.configure(|s| {
            s.missing_remotely.insert(id);
        })
    }

    /// Answers POST of the record with this email with a 422.
    pub fn failing_create(self, email: &str) -> Self {
        let email = email.to_string();
        self.configure(|s| {
            s.rejected_creates.insert(email);
        })
    }

    /// Answers POST with an envelope that has no id.
    pub fn create_without_id(self) -> Self {
        self.configure(|s| s.create_without_id = true)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl ApiClient for FakeApi {
    async fn request(
        &self,
        operation: &str,
        parameters: Value,
        method: Method,
    ) -> Result<ApiResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(RecordedRequest {
            operation: operation.to_string(),
            parameters: parameters.clone(),
            method,
        });

        let ok = |body: Value| -> Result<ApiResponse, ApiError> {
            Ok(ApiResponse {
                status_code: 200,
                body,
            })
        };

        match method {
            Method::Get => {
                if state.failing_collections.contains(operation) {
                    return Err(ApiError::new("Server Error", 500));
                }
                let page = parameters["page"].as_u64().unwrap_or(1).max(1) as usize;
                let body = state
                    .pages
                    .get(operation)
                    .and_then(|pages| pages.get(page - 1))
                    .cloned()
                    .unwrap_or_else(|| {
                        json!({ "data": [], "meta": { "total": 0 }, "links": { "next": null } })
                    });
                ok(body)
            }
            Method::Post => {
                let email = parameters["email"].as_str().unwrap_or_default();
                if state.rejected_creates.contains(email) {
                    return Err(ApiError::new("The email has already been taken.", 422));
                }
                if state.create_without_id {
                    return ok(json!({ "data": {} }));
                }
                state.next_id += 1;
                let id = 1000 + state.next_id;
                ok(json!({ "data": { "id": id } }))
            }
            Method::Patch => {
                let id = operation.rsplit('/').next().unwrap_or_default();
                if state.missing_remotely.contains(id) {
                    return Err(ApiError::new("Not Found", 404));
                }
                ok(json!({ "data": { "id": id } }))
            }
        }
    }

    fn request_count(&self) -> u64 {
        self.state.lock().unwrap().requests.len() as u64
    }
}

// =============================================================================
// Recording Progress
// =============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressLog {
    pub starts: Vec<(String, u64)>,
    pub advances: u64,
    pub finishes: u32,
}

/// [`ProgressReporter`] that keeps every call.
#[derive(Default)]
pub struct RecordingProgress {
    log: Mutex<ProgressLog>,
}

impl RecordingProgress {
    pub fn log(&self) -> ProgressLog {
        self.log.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn start(&self, label: &str, total: u64) {
        self.log.lock().unwrap().starts.push((label.to_string(), total));
    }

    fn advance(&self, n: u64) {
        self.log.lock().unwrap().advances += n;
    }

    fn finish(&self) {
        self.log.lock().unwrap().finishes += 1;
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn test_settings() -> SyncSettings {
    SyncSettings {
        page_retry_delay_ms: 1,
        ..Default::default()
    }
}

pub fn test_integration() -> IntegrationConfig {
    let mut integration = IntegrationConfig::new("https://crm.test");
    integration.access_token = Some("token".to_string());
    integration.objects = ObjectType::ALL.to_vec();
    integration.activity_events = vec!["page.hit".to_string()];
    integration.fields.contact = [
        ("email", "email"),
        ("first_name", "firstname"),
        ("company", "company"),
        ("position", "position"),
        ("custom_7", "tier"),
    ]
    .into_iter()
    .collect();
    integration.fields.company = [("name", "name"), ("industry", "industry")]
        .into_iter()
        .collect();
    integration
}

pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig {
        sync: test_settings(),
        ..Default::default()
    };
    config.integrations.insert("acme".to_string(), test_integration());
    config
}

/// A fetch-all window ending just before now.
pub fn window(objects: &[ObjectType]) -> SyncWindow {
    WindowRequest {
        fetch_all: true,
        objects: objects.to_vec(),
        ..Default::default()
    }
    .resolve(Utc::now() - Duration::milliseconds(1))
    .unwrap()
}

pub fn run_context(objects: &[ObjectType]) -> RunContext {
    RunContext::new("acme", window(objects))
}

/// A remote contact record.
pub fn contact(id: u64) -> Value {
    json!({
        "id": id,
        "email": format!("person{}@example.com", id),
        "first_name": format!("Person {}", id),
        "custom_fields": [{ "custom_field_id": 7, "value": "gold" }],
        "deals": [],
        "tags": []
    })
}

pub fn pull_engine(api: Arc<FakeApi>, db: &Database) -> PullEngine {
    pull_engine_with_progress(api, db, Arc::new(NoOpProgress))
}

pub fn pull_engine_with_progress(
    api: Arc<FakeApi>,
    db: &Database,
    progress: Arc<dyn ProgressReporter>,
) -> PullEngine {
    PullEngine::new(
        CrmApi::new(api),
        db.clone(),
        test_integration(),
        test_settings(),
        progress,
    )
}

pub fn push_engine(api: Arc<FakeApi>, db: &Database) -> PushEngine {
    PushEngine::new(
        CrmApi::new(api),
        db.clone(),
        test_integration(),
        Arc::new(NoOpProgress),
    )
}
