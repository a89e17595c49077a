//! # Error Types
//!
//! Domain-specific error types for crmsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  crmsync-core errors (this file)                                        │
//! │  ├── CoreError        - Record shape / mapping failures                 │
//! │  └── ValidationError  - Input validation failures (dates, keys)         │
//! │                                                                         │
//! │  crmsync-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  crmsync-sync errors (separate crate)                                   │
//! │  └── SyncError        - Configuration, API, pagination failures         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → CLI exit code          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while translating records between the two stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The external record carries no usable `id`.
    #[error("{object_type} record has no remote id")]
    MissingRemoteId { object_type: String },

    /// The external record is not a JSON object.
    #[error("Expected a JSON object for {object_type} record, got {actual}")]
    NotAnObject {
        object_type: String,
        actual: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before a run starts, while the sync window and the field maps
/// are being resolved.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unparsable date or interval).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Window start lies after its end.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    /// A `custom_` field key without a numeric id.
    #[error("Custom field key '{key}' must end in a numeric id")]
    InvalidCustomFieldKey { key: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
