//! # Remote API
//!
//! The seam between the engine and the remote CRM.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PullEngine / PushEngine                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CrmApi            fetch_page / create / update / describe_fields       │
//! │       │            (collection paths, 404 → "record does not exist      │
//! │       │             remotely", response decoding)                       │
//! │       ▼                                                                 │
//! │  dyn ApiClient     request(operation, parameters, method)               │
//! │       │            status > 299 → ApiError                              │
//! │       ▼                                                                 │
//! │  HttpApiClient (reqwest)   or a scripted client in tests                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ApiError, SyncResult};
use crmsync_core::field_map::{describe_fields, CustomFieldAliases, FieldCatalog};
use crmsync_core::ObjectType;

pub use http::HttpApiClient;
pub use models::{envelope_id, CollectionPage, PageQuery};

// =============================================================================
// Client Contract
// =============================================================================

/// HTTP method of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    /// Whether sending the same request twice leaves the remote unchanged.
    ///
    /// A POST creates a record on every delivery.
    pub fn is_idempotent(self) -> bool {
        matches!(self, Method::Get | Method::Patch)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Patch => write!(f, "PATCH"),
        }
    }
}

/// A successful remote response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Value,
}

/// Raw access to the remote API.
///
/// Implementations must return `Err(ApiError)` for any status above 299.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Performs one operation.
    ///
    /// ## Arguments
    /// * `operation` - Path below the API root, e.g. `/people/42`
    /// * `parameters` - Query parameters for GET, JSON body otherwise
    /// * `method` - HTTP method
    async fn request(
        &self,
        operation: &str,
        parameters: Value,
        method: Method,
    ) -> Result<ApiResponse, ApiError>;

    /// Requests issued so far, retries included.
    fn request_count(&self) -> u64 {
        0
    }
}

// =============================================================================
// Resource Layer
// =============================================================================

/// Typed operations on the contact and company collections.
#[derive(Clone)]
pub struct CrmApi {
    client: Arc<dyn ApiClient>,
}

impl CrmApi {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        CrmApi { client }
    }

    pub fn request_count(&self) -> u64 {
        self.client.request_count()
    }

    fn collection_path(object_type: ObjectType) -> String {
        format!("/{}", object_type.profile().remote_collection)
    }

    /// Fetches one page of a collection.
    pub async fn fetch_page(
        &self,
        object_type: ObjectType,
        query: &PageQuery,
    ) -> SyncResult<CollectionPage> {
        debug!(object_type = %object_type, page = query.page, "Fetching page");

        let response = self
            .client
            .request(
                &Self::collection_path(object_type),
                query.to_parameters(),
                Method::Get,
            )
            .await?;

        CollectionPage::from_body(response.body)
    }

    /// Creates a remote record.
    ///
    /// ## Returns
    /// * `Ok(Some(id))` - Remote id from `data.id`
    /// * `Ok(None)` - Call succeeded but the response carried no id
    pub async fn create(
        &self,
        object_type: ObjectType,
        payload: Map<String, Value>,
    ) -> Result<Option<String>, ApiError> {
        let response = self
            .client
            .request(
                &Self::collection_path(object_type),
                Value::Object(payload),
                Method::Post,
            )
            .await?;

        Ok(envelope_id(&response.body))
    }

    /// Updates a remote record.
    ///
    /// A 404 comes back as [`ApiError::MISSING_REMOTELY`].
    pub async fn update(
        &self,
        object_type: ObjectType,
        remote_id: &str,
        payload: Map<String, Value>,
    ) -> Result<(), ApiError> {
        let operation = format!("{}/{}", Self::collection_path(object_type), remote_id);

        match self
            .client
            .request(&operation, Value::Object(payload), Method::Patch)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Err(ApiError::new(ApiError::MISSING_REMOTELY, 404)),
            Err(err) => Err(err),
        }
    }

    /// Describes the collection's fields from its first record.
    ///
    /// An empty collection yields an empty catalog.
    pub async fn describe_fields(
        &self,
        object_type: ObjectType,
        aliases: &CustomFieldAliases,
    ) -> SyncResult<FieldCatalog> {
        let page = self.fetch_page(object_type, &PageQuery::first()).await?;

        Ok(page
            .data
            .first()
            .and_then(Value::as_object)
            .map(|sample| describe_fields(object_type, sample, aliases))
            .unwrap_or_default())
    }
}
