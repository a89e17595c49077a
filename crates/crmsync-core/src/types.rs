//! # Domain Types
//!
//! Core domain types shared by the pull and push engines.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │   ObjectType    │   │ IntegrationMapping  │   │   LocalEntity   │   │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ─────────────  │   │
//! │  │  Contact        │   │  integration_name   │   │  id (UUID)      │   │
//! │  │  Company        │   │  object_type        │   │  fields (JSON)  │   │
//! │  │       │         │   │  local_entity_id    │   │  owner_id       │   │
//! │  │       ▼         │   │  remote_record_id   │   │  updated_at     │   │
//! │  │  ObjectProfile  │   │  last_synced_at     │   └─────────────────┘   │
//! │  └─────────────────┘   └─────────────────────┘                          │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │   SyncWindow    │   │     RunContext      │   │  SyncCounters   │   │
//! │  │  start / end    │   │  run_id, started_at │   │  updated        │   │
//! │  │  limit          │   │  integration        │   │  created        │   │
//! │  │  fetch_all      │   │  window             │   │  errored        │   │
//! │  │  objects        │   └─────────────────────┘   │  ignored        │   │
//! │  └─────────────────┘                             └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Per-type behavior
//! Every difference between contacts and companies lives in the
//! [`ObjectProfile`] table. Engines never compare object-type strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// Object Type
// =============================================================================

/// The kinds of records this engine keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// A person record.
    Contact,
    /// An organisation record.
    Company,
}

impl ObjectType {
    /// All object types, in the order a run processes them.
    pub const ALL: [ObjectType; 2] = [ObjectType::Contact, ObjectType::Company];

    /// Returns the lowercase name used in storage and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Contact => "contact",
            ObjectType::Company => "company",
        }
    }

    /// Returns the per-type behavior table.
    pub fn profile(&self) -> &'static ObjectProfile {
        match self {
            ObjectType::Contact => &CONTACT_PROFILE,
            ObjectType::Company => &COMPANY_PROFILE,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contact" | "contacts" | "lead" | "leads" | "people" => Ok(ObjectType::Contact),
            "company" | "companies" => Ok(ObjectType::Company),
            other => Err(ValidationError::NotAllowed {
                field: format!("object type '{}'", other),
                allowed: vec!["contact".to_string(), "company".to_string()],
            }),
        }
    }
}

// =============================================================================
// Object Profile
// =============================================================================

/// Static description of how one object type is stored and translated.
#[derive(Debug)]
pub struct ObjectProfile {
    /// The type this profile describes.
    pub object_type: ObjectType,

    /// Path segment of the remote collection (`/people`, `/companies`).
    pub remote_collection: &'static str,

    /// Local table holding the entities.
    pub local_table: &'static str,

    /// Local field used to match an incoming record to an existing entity
    /// when no mapping exists yet.
    pub natural_key: &'static str,

    /// Nested collections dropped before a pulled record reaches the
    /// Entity Store.
    pub pull_skip_fields: &'static [&'static str],

    /// Fields left out when describing the remote schema.
    pub describe_skip_fields: &'static [&'static str],

    /// Whether owner and primary-company associations are resolved
    /// (flattened on pull, looked up on push).
    pub resolves_relationships: bool,

    /// Whether local activity history is attached to pushed records.
    pub carries_activities: bool,
}

static CONTACT_PROFILE: ObjectProfile = ObjectProfile {
    object_type: ObjectType::Contact,
    remote_collection: "people",
    local_table: "contacts",
    natural_key: "email",
    pull_skip_fields: &["opportunities", "deals", "activities", "notes", "tags"],
    describe_skip_fields: &["id", "deals", "company"],
    resolves_relationships: true,
    carries_activities: true,
};

static COMPANY_PROFILE: ObjectProfile = ObjectProfile {
    object_type: ObjectType::Company,
    remote_collection: "companies",
    local_table: "companies",
    natural_key: "name",
    pull_skip_fields: &[
        "opportunities",
        "deals",
        "activities",
        "notes",
        "tags",
        "contacts",
    ],
    describe_skip_fields: &["id", "deals", "contacts"],
    resolves_relationships: false,
    carries_activities: false,
};

// =============================================================================
// Feature
// =============================================================================

/// A sync capability an integration can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Remote → local.
    Pull,
    /// Local → remote.
    Push,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Pull => write!(f, "pull"),
            Feature::Push => write!(f, "push"),
        }
    }
}

// =============================================================================
// Integration Mapping
// =============================================================================

/// Durable association between one local entity and one remote record.
///
/// At most one row exists per `(integration_name, object_type,
/// local_entity_id)`; `remote_record_id` never changes once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct IntegrationMapping {
    /// Row identifier (UUID v4).
    pub id: String,

    /// Name of the configured integration.
    pub integration_name: String,

    /// Contact or company.
    pub object_type: ObjectType,

    /// Local entity id.
    pub local_entity_id: String,

    /// Remote record id, as the remote service reports it.
    pub remote_record_id: String,

    /// Last time this record was written in either direction.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// When the mapping was first recorded.
    pub created_at: DateTime<Utc>,
}

/// A `{local id → remote id}` pair waiting to be written to the Mapping Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPair {
    pub local_entity_id: String,
    pub remote_record_id: String,
}

// =============================================================================
// Local Entity
// =============================================================================

/// A contact or company as the local platform stores it.
///
/// `fields` is keyed by local field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEntity {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Contact or company.
    pub object_type: ObjectType,

    /// Field bag keyed by local field name.
    pub fields: Map<String, Value>,

    /// Owning local user, if any.
    pub owner_id: Option<String>,

    /// When the entity was created.
    pub created_at: DateTime<Utc>,

    /// When the entity was last modified.
    pub updated_at: DateTime<Utc>,
}

impl LocalEntity {
    /// Returns a field value, treating a missing key as JSON null.
    pub fn field(&self, key: &str) -> &Value {
        self.fields.get(key).unwrap_or(&Value::Null)
    }
}

/// Result of an Entity Store upsert.
///
/// `created` is only meaningful right after the upsert call returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub entity_id: String,
    pub created: bool,
}

// =============================================================================
// Sync Counters
// =============================================================================

/// Outcome counters for one stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    pub updated: u64,
    pub created: u64,
    pub errored: u64,
    pub ignored: u64,
}

impl SyncCounters {
    /// Records that reached the remote or local store, successfully or not.
    pub fn processed(&self) -> u64 {
        self.updated + self.created + self.errored
    }

    /// All four counters summed.
    pub fn total(&self) -> u64 {
        self.processed() + self.ignored
    }

    /// Adds another stage's counters into this one.
    pub fn absorb(&mut self, other: &SyncCounters) {
        self.updated += other.updated;
        self.created += other.created;
        self.errored += other.errored;
        self.ignored += other.ignored;
    }
}

impl std::fmt::Display for SyncCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} updated, {} created, {} errored, {} ignored",
            self.updated, self.created, self.errored, self.ignored
        )
    }
}

// =============================================================================
// Sync Window
// =============================================================================

/// Time range and limits governing one run. Immutable once resolved.
///
/// Build it with [`crate::validation::WindowRequest::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    /// Only records modified at or after this instant are considered.
    pub start: DateTime<Utc>,

    /// Only records modified at or before this instant are considered.
    pub end: DateTime<Utc>,

    /// Page size for push batching.
    pub limit: u32,

    /// Whether the date window was overridden to cover all history.
    pub fetch_all: bool,

    /// Object types selected for this run.
    pub objects: Vec<ObjectType>,
}

impl SyncWindow {
    /// Returns true if `object_type` is part of this run's selection.
    pub fn includes(&self, object_type: ObjectType) -> bool {
        self.objects.contains(&object_type)
    }

    /// Returns true if `at` lies within `[start, end]`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

// =============================================================================
// Run Context
// =============================================================================

/// Identity and timing of one run, passed explicitly into every stage.
///
/// `started_at` doubles as the modification and sync timestamp for every
/// record the run writes, so records pulled in this run are not seen as
/// locally modified by a later push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Unique id of this run (also the lease holder id).
    pub run_id: Uuid,

    /// Integration being synchronized.
    pub integration: String,

    /// Timestamp captured when the run started.
    pub started_at: DateTime<Utc>,

    /// The run's window.
    pub window: SyncWindow,
}

impl RunContext {
    /// Creates a context stamped with the current time.
    pub fn new(integration: impl Into<String>, window: SyncWindow) -> Self {
        Self::at(integration, window, Utc::now())
    }

    /// Creates a context with an explicit start timestamp.
    pub fn at(integration: impl Into<String>, window: SyncWindow, started_at: DateTime<Utc>) -> Self {
        RunContext {
            run_id: Uuid::new_v4(),
            integration: integration.into(),
            started_at,
            window,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
