//! # crmsync-db: Database Layer for crmsync
//!
//! Local storage for the sync engine: the CRM entities being synced and the
//! engine's own bookkeeping (mappings, leases). SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        crmsync Data Flow                                │
//! │                                                                         │
//! │  PullEngine / PushEngine (crmsync-sync)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   crmsync-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ MappingRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ EntityRepo     │    │ 001_initial  │  │   │
//! │  │   │ WAL, FKs on   │    │ Link/User/...  │    │ _schema.sql  │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/crmsync/crmsync.db                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crmsync_db::{Database, DbConfig};
//! use crmsync_core::ObjectType;
//!
//! let db = Database::new(DbConfig::new("crmsync.db")).await?;
//! let pending = db
//!     .entities(ObjectType::Contact)
//!     .count_to_create("acme", start, end)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::activity::ActivityRepository;
pub use repository::entity::{EntityRepository, MappedEntity};
pub use repository::lease::{Lease, LeaseRepository};
pub use repository::link::CompanyLinkRepository;
pub use repository::mapping::MappingRepository;
pub use repository::user::{User, UserRepository};
