//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌──────────────────┐  ┌───────────────────┐  │
//! │  │  Configuration      │  │   Stage          │  │  Infrastructure   │  │
//! │  │  (abort the run)    │  │  (end one stage) │  │                   │  │
//! │  │                     │  │                  │  │                   │  │
//! │  │  NotConfigured      │  │  FatalSync       │  │  Database         │  │
//! │  │  NotAuthorized      │  │  Api             │  │  Serialization    │  │
//! │  │  NoObjectsConfigured│  │  InvalidResponse │  │                   │  │
//! │  │  EmptyFieldMap      │  │  Mapping         │  │                   │  │
//! │  │  AlreadyRunning     │  │                  │  │                   │  │
//! │  │  InvalidConfig/Url  │  │                  │  │                   │  │
//! │  │  Validation         │  │                  │  │                   │  │
//! │  └─────────────────────┘  └──────────────────┘  └───────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crmsync_core::{CoreError, ObjectType, ValidationError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// API Error
// =============================================================================

/// A failed remote call.
///
/// `status_code` is the HTTP status, or `0` when no response arrived
/// (connection refused, timeout).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status_code})")]
pub struct ApiError {
    pub message: String,
    pub status_code: u16,
}

impl ApiError {
    /// Message used when a PATCH hits a record the remote no longer has.
    pub const MISSING_REMOTELY: &'static str = "record does not exist remotely";

    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        ApiError {
            message: message.into(),
            status_code,
        }
    }

    /// A failure below HTTP (no status code).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message, 0)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }

    pub fn is_transport(&self) -> bool {
        self.status_code == 0
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Integration name has no section in the config file.
    #[error("Integration '{integration}' is not configured (available: {available})")]
    NotConfigured {
        integration: String,
        available: String,
    },

    /// Integration has no access token.
    #[error("Integration '{integration}' is not authorized")]
    NotAuthorized { integration: String },

    /// Integration enables no object types.
    #[error("Integration '{integration}' has no object types configured")]
    NoObjectsConfigured { integration: String },

    /// An enabled object type has no field mapping.
    #[error("Integration '{integration}' has no field mapping for {object_type}")]
    EmptyFieldMap {
        integration: String,
        object_type: ObjectType,
    },

    /// Another run holds the lease for this integration.
    #[error("A sync for '{integration}' is already running (held by {holder}); use --force to take over")]
    AlreadyRunning { integration: String, holder: String },

    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Invalid run options (date range, interval, limit).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Stage Errors
    // =========================================================================
    /// Pagination accounting could not be reconciled.
    #[error("Fatal sync error for {object_type}: expected {expected} records, processed {actual}")]
    FatalSync {
        object_type: ObjectType,
        expected: u64,
        actual: u64,
    },

    /// Remote call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Remote response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A remote record could not be mapped.
    #[error("Mapping failed: {0}")]
    Mapping(#[from] CoreError),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// JSON encode/decode failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<crmsync_db::DbError> for SyncError {
    fn from(err: crmsync_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true for errors that abort the whole run before any stage.
    ///
    /// The CLI maps these to exit code 255.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SyncError::NotConfigured { .. }
                | SyncError::NotAuthorized { .. }
                | SyncError::NoObjectsConfigured { .. }
                | SyncError::EmptyFieldMap { .. }
                | SyncError::AlreadyRunning { .. }
                | SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::Validation(_)
        )
    }
}
