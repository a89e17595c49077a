//! # crmsync-sync: Sync Engine
//!
//! Keeps local contacts and companies consistent with a remote CRM reachable
//! through a paginated REST API, in both directions.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncRunner (orchestrator)                     │  │
//! │  │                                                                  │  │
//! │  │  Authorizing → lease → pull stages → push stages → release      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  PullEngine    │  │  PushEngine    │  │  ProgressReporter      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Pages remote   │  │ Update phase,  │  │ start / advance /      │    │
//! │  │ collection,    │  │ create phase,  │  │ finish; no-op default  │    │
//! │  │ batches of 100 │  │ counters       │  │                        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │          │                   │                                          │
//! │          ▼                   ▼                                          │
//! │  ┌─────────────────────────────────────┐  ┌────────────────────────┐   │
//! │  │ CrmApi → dyn ApiClient              │  │ crmsync-db             │   │
//! │  │ (HttpApiClient: reqwest + backoff)  │  │ mappings, entities,    │   │
//! │  └─────────────────────────────────────┘  │ links, users, leases   │   │
//! │                                           └────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`runner`] - `SyncRunner`, run states and reports
//! - [`pull`] - Remote → local
//! - [`push`] - Local → remote
//! - [`api`] - API client contract, HTTP implementation, wire shapes
//! - [`config`] - TOML configuration with environment overrides
//! - [`progress`] - Progress reporting
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crmsync_core::validation::WindowRequest;
//! use crmsync_sync::{SyncConfig, SyncRunner};
//!
//! let config = SyncConfig::load(None)?;
//! let window = WindowRequest::default().resolve(chrono::Utc::now())?;
//!
//! let runner = SyncRunner::new(config, database);
//! let report = runner.run("acme", window, false).await?;
//! println!("pulled: {}", report.totals(Feature::Pull));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod config;
pub mod error;
pub mod progress;
pub mod pull;
pub mod push;
pub mod runner;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{ApiClient, ApiResponse, CrmApi, HttpApiClient, Method};
pub use config::{IntegrationConfig, SyncConfig, SyncSettings};
pub use error::{ApiError, SyncError, SyncResult};
pub use progress::{LogProgress, NoOpProgress, ProgressReporter};
pub use pull::PullEngine;
pub use push::PushEngine;
pub use runner::{RunReport, RunState, StageReport, SyncRunner};
