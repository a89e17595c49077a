//! # Field Mapper
//!
//! Translates between the remote record shape and the local entity shape.
//!
//! ## Pull direction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  External record                         Flattened (external keys)      │
//! │  ───────────────                         ─────────────────────────      │
//! │  id: 42                          ──►     remote_id = "42"               │
//! │  custom_fields: [                                                       │
//! │    {custom_field_id: 7, value}   ──►     custom_7: value                │
//! │    {alias: "tier", value}        ──►     custom_<aliases["tier"]>       │
//! │  ]                                                                      │
//! │  companies: [{name, pivot:{primary:1, position}}]                       │
//! │                                  ──►     company: name, position        │
//! │  user: {email, first_name, ...}  ──►     owner_email, owner_name        │
//! │  status: {name: "Lead"}          ──►     status: "Lead"                 │
//! │  deals / notes / tags / ...      ──►     (dropped)                      │
//! │                                                                         │
//! │  Then every FieldMap entry (external → local) is applied; keys the map  │
//! │  does not name never reach the Entity Store.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Push direction
//! Each FieldMap entry reads the local key; `custom_<id>` entries go into a
//! `custom_fields: [{custom_field_id, value}]` section, every other entry
//! becomes a top-level payload key.
//!
//! ## Custom-field keys
//! The canonical key is the numeric id (`custom_<id>`). Remote payloads that
//! name a custom field by alias are translated through the integration's
//! alias table; aliases the table does not know are reported back to the
//! caller instead of being invented.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{ObjectProfile, ObjectType};
use crate::validation::ValidationResult;

// =============================================================================
// Custom Field Keys
// =============================================================================

/// Prefix marking a dynamic (custom) field key.
pub const CUSTOM_FIELD_PREFIX: &str = "custom_";

/// Alias → numeric id translation table for custom fields.
pub type CustomFieldAliases = BTreeMap<String, u64>;

/// Builds the canonical key for a custom field id.
pub fn custom_field_key(id: u64) -> String {
    format!("{}{}", CUSTOM_FIELD_PREFIX, id)
}

/// Extracts the numeric id from a `custom_<id>` key.
///
/// ## Returns
/// * `Some(id)` - key carries the prefix followed by digits only
/// * `None` - not a custom key, or the suffix is not numeric
pub fn parse_custom_field_key(key: &str) -> Option<u64> {
    let suffix = key.strip_prefix(CUSTOM_FIELD_PREFIX)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Resolves a custom-field identifier that may be a numeric id or an alias.
pub fn resolve_custom_field(key: &str, aliases: &CustomFieldAliases) -> Option<u64> {
    key.trim()
        .parse::<u64>()
        .ok()
        .or_else(|| aliases.get(key).copied())
}

/// Reads a remote identifier that may arrive as a JSON number or string.
pub fn remote_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Converts a stored remote id back to the JSON form the API expects.
///
/// Numeric ids go back out as numbers.
pub fn remote_id_value(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

// =============================================================================
// Field Map
// =============================================================================

/// Ordered mapping from external field key to local field key.
///
/// ## Example
/// ```rust
/// use crmsync_core::field_map::FieldMap;
///
/// let map: FieldMap = [("first_name", "firstname"), ("custom_12", "industry")]
///     .into_iter()
///     .collect();
///
/// assert_eq!(map.local_key("custom_12"), Some("industry"));
/// assert!(map.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    entries: IndexMap<String, String>,
}

impl FieldMap {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry, keeping first-insertion order.
    pub fn insert(&mut self, external: impl Into<String>, local: impl Into<String>) {
        self.entries.insert(external.into(), local.into());
    }

    /// Returns the local key mapped from `external`.
    pub fn local_key(&self, external: &str) -> Option<&str> {
        self.entries.get(external).map(String::as_str)
    }

    /// Iterates `(external, local)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(e, l)| (e.as_str(), l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every custom key carries a numeric id and that no
    /// entry maps to an empty local key.
    pub fn validate(&self) -> ValidationResult<()> {
        for (external, local) in self.iter() {
            if external.starts_with(CUSTOM_FIELD_PREFIX) && parse_custom_field_key(external).is_none() {
                return Err(ValidationError::InvalidCustomFieldKey {
                    key: external.to_string(),
                });
            }
            if local.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: format!("local field for '{}'", external),
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Pull: external → local
    // =========================================================================

    /// Flattens an external record and maps it onto local field names.
    ///
    /// ## Arguments
    /// * `object_type` - Selects the skip list and relationship handling
    /// * `record` - One element of a collection page's `data` array
    /// * `aliases` - Custom-field alias table for this integration
    ///
    /// ## Returns
    /// * `Ok(FlattenedRecord)` - Local fields plus side information
    ///   (owner, primary company, unresolved aliases)
    /// * `Err(CoreError)` - Record is not an object or has no id
    pub fn to_local(
        &self,
        object_type: ObjectType,
        record: &Value,
        aliases: &CustomFieldAliases,
    ) -> CoreResult<FlattenedRecord> {
        let record = record.as_object().ok_or_else(|| CoreError::NotAnObject {
            object_type: object_type.to_string(),
            actual: json_kind(record).to_string(),
        })?;

        let remote_id = record
            .get("id")
            .and_then(remote_id)
            .ok_or_else(|| CoreError::MissingRemoteId {
                object_type: object_type.to_string(),
            })?;

        let profile = object_type.profile();
        let mut flat = record.clone();
        let mut unresolved_aliases = Vec::new();

        strip_skipped(&mut flat, profile);

        if let Some(raw) = flat.remove("custom_fields") {
            fold_custom_fields(raw, aliases, &mut flat, &mut unresolved_aliases);
        }

        let mut owner = None;
        let mut primary_company = None;

        if profile.resolves_relationships {
            if let Some(found) = take_primary_company(&mut flat) {
                flat.insert("company".to_string(), Value::String(found.name.clone()));
                if let Some(position) = found.position.clone() {
                    flat.insert("position".to_string(), position);
                }
                primary_company = Some(found);
            }

            if let Some(found) = take_owner(&mut flat) {
                if let Some(ref email) = found.email {
                    flat.insert("owner_email".to_string(), Value::String(email.clone()));
                }
                if let Some(ref name) = found.name {
                    flat.insert("owner_name".to_string(), Value::String(name.clone()));
                }
                owner = Some(found);
            }
        }

        flatten_status(&mut flat);

        let mut fields = Map::new();
        for (external, local) in self.iter() {
            if let Some(value) = flat.get(external) {
                fields.insert(local.to_string(), value.clone());
            }
        }

        Ok(FlattenedRecord {
            remote_id,
            fields,
            owner,
            primary_company,
            unresolved_aliases,
        })
    }

    // =========================================================================
    // Push: local → external
    // =========================================================================

    /// Serializes local fields into a remote payload.
    ///
    /// Missing local values are sent as `null` so the remote side sees
    /// every mapped key.
    pub fn to_external(&self, local: &Map<String, Value>) -> Map<String, Value> {
        let mut payload = Map::new();
        let mut custom_fields = Vec::new();

        for (external, local_key) in self.iter() {
            let value = local.get(local_key).cloned().unwrap_or(Value::Null);

            match parse_custom_field_key(external) {
                Some(id) => custom_fields.push(json!({
                    "custom_field_id": id,
                    "value": value,
                })),
                None => {
                    payload.insert(external.to_string(), value);
                }
            }
        }

        if !custom_fields.is_empty() {
            payload.insert("custom_fields".to_string(), Value::Array(custom_fields));
        }

        payload
    }
}

impl<E: Into<String>, L: Into<String>> FromIterator<(E, L)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (E, L)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (external, local) in iter {
            map.insert(external, local);
        }
        map
    }
}

// =============================================================================
// Flattened Record
// =============================================================================

/// A pulled record after flattening and field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedRecord {
    /// Remote id of the record.
    pub remote_id: String,

    /// Mapped fields keyed by local field name.
    pub fields: Map<String, Value>,

    /// Owner association, if the record carried one.
    pub owner: Option<OwnerRef>,

    /// Primary company association, if the record carried one.
    pub primary_company: Option<PrimaryCompany>,

    /// Custom-field aliases with no entry in the alias table.
    pub unresolved_aliases: Vec<String>,
}

/// Owner of a remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// The company a remote contact marks as primary.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryCompany {
    /// Remote id of the company, when the association carries one.
    pub remote_id: Option<String>,

    /// Display name.
    pub name: String,

    /// Contact's position at the company.
    pub position: Option<Value>,

    /// The nested company record without its pivot.
    pub record: Value,
}

// =============================================================================
// Push Payload Helpers
// =============================================================================

/// Adds the primary-company association to a contact payload.
pub fn attach_primary_company(payload: &mut Map<String, Value>, company_remote_id: &str) {
    payload.insert(
        "companies".to_string(),
        json!([{ "id": remote_id_value(company_remote_id), "pivot": { "primary": 1 } }]),
    );
}

/// Adds the owner's display name to a payload.
pub fn attach_owner(payload: &mut Map<String, Value>, owner_name: &str) {
    payload.insert("owner_name".to_string(), Value::String(owner_name.to_string()));
}

// =============================================================================
// Field Discovery
// =============================================================================

/// Advisory description of one remote field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub label: String,
    pub required: bool,
}

/// Remote fields discovered from a sample record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    pub fields: IndexMap<String, FieldDescriptor>,
    pub unresolved_aliases: Vec<String>,
}

/// Describes the fields of a sample remote record for configuration.
///
/// The object type's natural key is the one field marked required; every
/// other field is optional. Nothing in the engine enforces this.
pub fn describe_fields(
    object_type: ObjectType,
    sample: &Map<String, Value>,
    aliases: &CustomFieldAliases,
) -> FieldCatalog {
    let profile = object_type.profile();
    let mut catalog = FieldCatalog::default();

    for (key, value) in sample {
        if profile.describe_skip_fields.contains(&key.as_str()) {
            continue;
        }

        if key == "custom_fields" {
            describe_custom_fields(value, aliases, &mut catalog);
            continue;
        }

        catalog.fields.insert(
            key.clone(),
            FieldDescriptor {
                label: key.clone(),
                required: key == profile.natural_key,
            },
        );
    }

    catalog
}

fn describe_custom_fields(raw: &Value, aliases: &CustomFieldAliases, catalog: &mut FieldCatalog) {
    let mut add = |label: &str, id: Option<u64>| match id {
        Some(id) => {
            catalog.fields.insert(
                custom_field_key(id),
                FieldDescriptor {
                    label: label.to_string(),
                    required: false,
                },
            );
        }
        None => catalog.unresolved_aliases.push(label.to_string()),
    };

    match raw {
        Value::Object(entries) => {
            for key in entries.keys() {
                add(key, resolve_custom_field(key, aliases));
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let label = entry
                    .get("label")
                    .or_else(|| entry.get("alias"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let id = custom_entry_id(entry, aliases);
                let label = label.unwrap_or_else(|| id.map(custom_field_key).unwrap_or_default());
                add(&label, id);
            }
        }
        _ => {}
    }
}

// =============================================================================
// Internals
// =============================================================================

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn strip_skipped(flat: &mut Map<String, Value>, profile: &ObjectProfile) {
    for key in profile.pull_skip_fields {
        flat.remove(*key);
    }
}

fn custom_entry_id(entry: &Value, aliases: &CustomFieldAliases) -> Option<u64> {
    let numeric = entry
        .get("custom_field_id")
        .or_else(|| entry.get("id"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

    numeric.or_else(|| {
        entry
            .get("alias")
            .and_then(Value::as_str)
            .and_then(|alias| aliases.get(alias).copied())
    })
}

fn unwrap_custom_value(value: Value) -> Value {
    match value {
        Value::Object(mut inner) if inner.contains_key("value") => {
            inner.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn fold_custom_fields(
    raw: Value,
    aliases: &CustomFieldAliases,
    flat: &mut Map<String, Value>,
    unresolved: &mut Vec<String>,
) {
    match raw {
        Value::Array(entries) => {
            for entry in entries {
                match custom_entry_id(&entry, aliases) {
                    Some(id) => {
                        let value = entry.get("value").cloned().unwrap_or(Value::Null);
                        flat.insert(custom_field_key(id), value);
                    }
                    None => {
                        let alias = entry
                            .get("alias")
                            .and_then(Value::as_str)
                            .unwrap_or("<unnamed>");
                        unresolved.push(alias.to_string());
                    }
                }
            }
        }
        Value::Object(entries) => {
            for (key, value) in entries {
                match resolve_custom_field(&key, aliases) {
                    Some(id) => {
                        flat.insert(custom_field_key(id), unwrap_custom_value(value));
                    }
                    None => unresolved.push(key),
                }
            }
        }
        _ => {}
    }
}

fn take_primary_company(flat: &mut Map<String, Value>) -> Option<PrimaryCompany> {
    let companies = flat.remove("companies")?;
    let entry = companies
        .as_array()?
        .iter()
        .find(|c| is_truthy(c.pointer("/pivot/primary")))?;

    let mut record = entry.as_object()?.clone();
    let pivot = record.remove("pivot");
    let name = record.get("name")?.as_str()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    Some(PrimaryCompany {
        remote_id: record.get("id").and_then(remote_id),
        name,
        position: pivot
            .as_ref()
            .and_then(|p| p.get("position"))
            .filter(|p| !p.is_null())
            .cloned(),
        record: Value::Object(record),
    })
}

fn take_owner(flat: &mut Map<String, Value>) -> Option<OwnerRef> {
    let user = flat.remove("user")?;
    let user = user.as_object()?;

    let email = user
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string);

    let name = user
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            let first = user.get("first_name").and_then(Value::as_str).unwrap_or("");
            let last = user.get("last_name").and_then(Value::as_str).unwrap_or("");
            let full = format!("{} {}", first, last).trim().to_string();
            (!full.is_empty()).then_some(full)
        });

    if email.is_none() && name.is_none() {
        return None;
    }

    Some(OwnerRef { email, name })
}

fn flatten_status(flat: &mut Map<String, Value>) {
    let name = match flat.get("status") {
        Some(Value::Object(status)) => status.get("name").cloned().unwrap_or(Value::Null),
        _ => return,
    };
    flat.insert("status".to_string(), name);
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_map() -> FieldMap {
        [
            ("email", "email"),
            ("first_name", "firstname"),
            ("company", "company"),
            ("position", "position"),
            ("status", "stage"),
            ("owner_email", "owner_email"),
            ("custom_7", "tier"),
            ("custom_12", "industry"),
        ]
        .into_iter()
        .collect()
    }

    fn aliases() -> CustomFieldAliases {
        [("industry_code".to_string(), 12u64)].into_iter().collect()
    }

    #[test]
    fn test_custom_field_keys() {
        assert_eq!(custom_field_key(7), "custom_7");
        assert_eq!(parse_custom_field_key("custom_7"), Some(7));
        assert_eq!(parse_custom_field_key("custom_0042"), Some(42));
        assert_eq!(parse_custom_field_key("custom_"), None);
        assert_eq!(parse_custom_field_key("custom_tier"), None);
        assert_eq!(parse_custom_field_key("email"), None);
    }

    #[test]
    fn test_validate_rejects_alias_keys() {
        let good = contact_map();
        assert!(good.validate().is_ok());

        let bad: FieldMap = [("custom_tier", "tier")].into_iter().collect();
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::InvalidCustomFieldKey { .. })
        ));

        let empty_local: FieldMap = [("email", " ")].into_iter().collect();
        assert!(empty_local.validate().is_err());
    }

    #[test]
    fn test_to_local_flattens_contact() {
        let record = json!({
            "id": 42,
            "email": "ada@example.com",
            "first_name": "Ada",
            "custom_fields": [
                { "custom_field_id": 7, "value": "gold" },
                { "alias": "industry_code", "value": "ENG" },
                { "alias": "mystery", "value": "?" }
            ],
            "companies": [
                { "id": 3, "name": "Other", "pivot": { "primary": 0 } },
                { "id": 9, "name": "Analytical Engines", "pivot": { "primary": 1, "position": "CTO" } }
            ],
            "user": { "email": "owner@example.com", "first_name": "Grace", "last_name": "Hopper" },
            "status": { "id": 1, "name": "Customer" },
            "deals": [{ "id": 1 }],
            "notes": [],
            "tags": ["vip"]
        });

        let flat = contact_map()
            .to_local(ObjectType::Contact, &record, &aliases())
            .unwrap();

        assert_eq!(flat.remote_id, "42");
        assert_eq!(flat.fields["email"], json!("ada@example.com"));
        assert_eq!(flat.fields["firstname"], json!("Ada"));
        assert_eq!(flat.fields["tier"], json!("gold"));
        assert_eq!(flat.fields["industry"], json!("ENG"));
        assert_eq!(flat.fields["company"], json!("Analytical Engines"));
        assert_eq!(flat.fields["position"], json!("CTO"));
        assert_eq!(flat.fields["stage"], json!("Customer"));
        assert_eq!(flat.fields["owner_email"], json!("owner@example.com"));
        assert!(!flat.fields.contains_key("deals"));
        assert_eq!(flat.unresolved_aliases, vec!["mystery".to_string()]);

        let owner = flat.owner.unwrap();
        assert_eq!(owner.name.as_deref(), Some("Grace Hopper"));

        let company = flat.primary_company.unwrap();
        assert_eq!(company.remote_id.as_deref(), Some("9"));
        assert!(company.record.get("pivot").is_none());
    }

    #[test]
    fn test_to_local_object_form_custom_fields() {
        let record = json!({
            "id": "abc",
            "custom_fields": { "7": "silver", "industry_code": { "value": "OPS" } }
        });

        let flat = contact_map()
            .to_local(ObjectType::Contact, &record, &aliases())
            .unwrap();

        assert_eq!(flat.remote_id, "abc");
        assert_eq!(flat.fields["tier"], json!("silver"));
        assert_eq!(flat.fields["industry"], json!("OPS"));
        assert!(flat.unresolved_aliases.is_empty());
    }

    #[test]
    fn test_to_local_company_keeps_companies_untouched() {
        let map: FieldMap = [("name", "name"), ("contacts", "contacts")].into_iter().collect();
        let record = json!({ "id": 5, "name": "Acme", "contacts": [{ "id": 1 }] });

        let flat = map.to_local(ObjectType::Company, &record, &aliases()).unwrap();

        assert_eq!(flat.fields["name"], json!("Acme"));
        assert!(!flat.fields.contains_key("contacts"));
        assert!(flat.primary_company.is_none());
    }

    #[test]
    fn test_to_local_rejects_bad_records() {
        let map = contact_map();
        assert!(matches!(
            map.to_local(ObjectType::Contact, &json!({ "email": "x" }), &aliases()),
            Err(CoreError::MissingRemoteId { .. })
        ));
        assert!(matches!(
            map.to_local(ObjectType::Contact, &json!([1, 2]), &aliases()),
            Err(CoreError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_to_external_routes_custom_fields() {
        let map = contact_map();
        let mut local = Map::new();
        local.insert("email".into(), json!("ada@example.com"));
        local.insert("tier".into(), json!("gold"));

        let payload = map.to_external(&local);

        assert_eq!(payload["email"], json!("ada@example.com"));
        assert_eq!(payload["first_name"], Value::Null);
        assert!(!payload.contains_key("custom_7"));
        assert_eq!(
            payload["custom_fields"],
            json!([
                { "custom_field_id": 7, "value": "gold" },
                { "custom_field_id": 12, "value": null }
            ])
        );
    }

    #[test]
    fn test_custom_field_ids_survive_both_directions() {
        let map: FieldMap = [("custom_9001", "score")].into_iter().collect();
        let record = json!({ "id": 1, "custom_fields": [{ "custom_field_id": 9001, "value": 3 }] });

        let flat = map.to_local(ObjectType::Contact, &record, &aliases()).unwrap();
        let payload = map.to_external(&flat.fields);

        assert_eq!(payload["custom_fields"][0]["custom_field_id"], json!(9001));
        assert_eq!(payload["custom_fields"][0]["value"], json!(3));
    }

    #[test]
    fn test_payload_helpers() {
        let mut payload = Map::new();
        attach_primary_company(&mut payload, "17");
        attach_owner(&mut payload, "Grace Hopper");

        assert_eq!(
            payload["companies"],
            json!([{ "id": 17, "pivot": { "primary": 1 } }])
        );
        assert_eq!(payload["owner_name"], json!("Grace Hopper"));
    }

    #[test]
    fn test_describe_fields() {
        let sample = json!({
            "id": 1,
            "email": "a@b.c",
            "first_name": "A",
            "deals": [],
            "company": {},
            "custom_fields": { "industry_code": "ENG", "33": "x", "unknown": "y" }
        });

        let catalog = describe_fields(
            ObjectType::Contact,
            sample.as_object().unwrap(),
            &aliases(),
        );

        assert!(!catalog.fields.contains_key("id"));
        assert!(!catalog.fields.contains_key("deals"));
        assert!(!catalog.fields.contains_key("company"));
        assert!(catalog.fields["email"].required);
        assert!(!catalog.fields["first_name"].required);
        assert_eq!(catalog.fields["custom_12"].label, "industry_code");
        assert!(catalog.fields.contains_key("custom_33"));
        assert_eq!(catalog.unresolved_aliases, vec!["unknown".to_string()]);
    }
}
