//! # crmsync-core: Pure Sync Logic
//!
//! This crate holds everything the sync engine decides without touching a
//! database or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        crmsync Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/cli (crmsync binary)                    │   │
//! │  │          crmsync sync <integration> / crmsync fields            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    crmsync-sync (engine)                        │   │
//! │  │      SyncRunner ─► PullEngine / PushEngine ─► ApiClient         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ crmsync-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ field_map │  │ activity  │  │ validation│  │   │
//! │  │   │ObjectType │  │ FieldMap  │  │ payloads  │  │  windows  │  │   │
//! │  │   │ Counters  │  │ to_local  │  │           │  │ intervals │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  crmsync-db (Database Layer)                    │   │
//! │  │          mappings, contacts, companies, users, leases           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Object types, mappings, counters, windows, run context
//! - [`field_map`] - External ⇄ local record translation
//! - [`activity`] - Activity history payloads for pushed contacts
//! - [`validation`] - Window and interval parsing
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use crmsync_core::field_map::FieldMap;
//! use crmsync_core::ObjectType;
//! use serde_json::json;
//!
//! let map: FieldMap = [("email", "email"), ("custom_3", "tier")].into_iter().collect();
//! let record = json!({
//!     "id": 10,
//!     "email": "ada@example.com",
//!     "custom_fields": [{ "custom_field_id": 3, "value": "gold" }],
//! });
//!
//! let flat = map.to_local(ObjectType::Contact, &record, &Default::default()).unwrap();
//! assert_eq!(flat.remote_id, "10");
//! assert_eq!(flat.fields["tier"], json!("gold"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod activity;
pub mod error;
pub mod field_map;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use field_map::{FieldMap, FlattenedRecord};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of pulled records whose mappings are written as one batch.
pub const MAPPING_BATCH_SIZE: usize = 100;

/// Retries of the same page request when pagination ends short of the
/// reported total.
pub const PAGE_RETRY_LIMIT: u32 = 5;
