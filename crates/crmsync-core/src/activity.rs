//! # Activity Payloads
//!
//! Converts local contact activity history into the `activities` section of
//! a pushed contact.
//!
//! ```text
//! local event       details_type
//! ──────────────    ──────────────────────
//! email.read     →  App\EmailActivity
//! page.hit       →  App\PageHitActivity
//! form.submitted →  App\FormSubmitActivity
//! point.gained   →  App\PointChangeActivity
//! anything else  →  the event name itself
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Timestamp layout the remote service expects in `details.created_at`.
pub const ACTIVITY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry of a contact's local activity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ActivityRecord {
    /// Event type, e.g. `page.hit`.
    pub event: String,

    /// Human-readable label.
    pub label: String,

    /// Optional link (page URL, email preview).
    pub link: Option<String>,

    /// When the event happened.
    pub occurred_at: DateTime<Utc>,
}

/// Returns the remote details type for a local event name.
pub fn details_type(event: &str) -> &str {
    match event {
        "email.read" => "App\\EmailActivity",
        "page.hit" => "App\\PageHitActivity",
        "form.submitted" => "App\\FormSubmitActivity",
        "point.gained" => "App\\PointChangeActivity",
        other => other,
    }
}

/// Builds the remote payload for one activity.
pub fn activity_payload(record: &ActivityRecord) -> Value {
    let mut details = json!({
        "created_at": record.occurred_at.format(ACTIVITY_TIMESTAMP_FORMAT).to_string(),
    });

    // Read receipts carry no body locally.
    if record.event == "email.read" {
        details["content"] = json!("Unknown");
    }

    json!({
        "details_type": details_type(&record.event),
        "name": record.label,
        "description": record.link.clone().unwrap_or_default(),
        "completed": 1,
        "details": details,
    })
}

/// Builds the `activities` array for a contact payload.
///
/// Only events named in `include` are sent; an empty `include` sends nothing.
pub fn activities_payload(records: &[ActivityRecord], include: &[String]) -> Vec<Value> {
    records
        .iter()
        .filter(|r| include.iter().any(|e| e == &r.event))
        .map(activity_payload)
        .collect()
}
