//! Wire shapes of the remote CRM API.
//!
//! ```text
//! GET /people?page=2&modified_since=2024-03-05 09:00:00
//! {
//!   "data":  [ { "id": 1, ... }, ... ],
//!   "meta":  { "total": 250 },
//!   "links": { "next": "https://crm.example.com/api/v1/people?page=3" }
//! }
//!
//! POST /people, PATCH /people/42
//! { "data": { "id": 42, ... } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{SyncError, SyncResult};
use crmsync_core::field_map::remote_id;

/// Timestamp layout for the `modified_since` query parameter.
pub const QUERY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Collection Page
// =============================================================================

/// One page of a remote collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub data: Vec<Value>,

    #[serde(default)]
    pub meta: PageMeta,

    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Total records the server reports for the whole query.
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

impl CollectionPage {
    /// Decodes a collection response body.
    pub fn from_body(body: Value) -> SyncResult<Self> {
        serde_json::from_value(body)
            .map_err(|e| SyncError::InvalidResponse(format!("collection page: {}", e)))
    }

    /// Returns true when the server links a further page.
    pub fn has_next(&self) -> bool {
        self.links
            .next
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }

    /// Page number carried by the `next` link's `page` query parameter.
    pub fn next_page_number(&self) -> Option<u32> {
        let next = self.links.next.as_deref()?;

        let parsed = url::Url::parse(next).or_else(|_| {
            url::Url::parse("http://localhost/").and_then(|base| base.join(next))
        });

        parsed
            .ok()?
            .query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    }
}

// =============================================================================
// Single Record Envelope
// =============================================================================

/// Reads `data.id` from a create/update response.
pub fn envelope_id(body: &Value) -> Option<String> {
    body.get("data").and_then(|data| data.get("id")).and_then(remote_id)
}

// =============================================================================
// Page Query
// =============================================================================

/// Parameters of one collection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub modified_since: Option<DateTime<Utc>>,
}

impl PageQuery {
    /// First page, no modification filter.
    pub fn first() -> Self {
        PageQuery {
            page: 1,
            modified_since: None,
        }
    }

    /// First page of records modified since `start`.
    pub fn since(start: DateTime<Utc>) -> Self {
        PageQuery {
            page: 1,
            modified_since: Some(start),
        }
    }

    pub fn to_parameters(&self) -> Value {
        let mut params = json!({ "page": self.page });
        if let Some(since) = self.modified_since {
            params["modified_since"] = json!(since.format(QUERY_TIMESTAMP_FORMAT).to_string());
        }
        params
    }
}
