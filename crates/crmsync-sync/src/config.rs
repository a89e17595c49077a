//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     CRMSYNC_DATABASE_PATH=/var/lib/crmsync/crmsync.db                   │
//! │     CRMSYNC_TOKEN_ACME=...          (per integration, upper-cased)      │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     --config PATH, or                                                   │
//! │     ~/.config/crmsync/config.toml (Linux)                               │
//! │     ~/Library/Application Support/com.crmsync.crmsync/config.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "crmsync.db"
//!
//! [sync]
//! mapping_batch_size = 100
//! page_retry_limit = 5
//! page_retry_delay_ms = 500
//!
//! [integrations.acme]
//! base_url = "https://crm.example.com"
//! objects = ["contact", "company"]
//! features = ["pull", "push"]
//! activity_events = ["email.read", "page.hit"]
//!
//! [integrations.acme.fields.contact]
//! email = "email"
//! first_name = "firstname"
//! custom_12 = "industry"
//!
//! [integrations.acme.fields.company]
//! name = "name"
//!
//! [integrations.acme.custom_field_aliases]
//! industry_code = 12
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crmsync_core::field_map::{CustomFieldAliases, FieldMap};
use crmsync_core::validation::{parse_interval, DEFAULT_LIMIT, DEFAULT_TIME_INTERVAL};
use crmsync_core::{Feature, ObjectType, MAPPING_BATCH_SIZE, PAGE_RETRY_LIMIT};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the local SQLite database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("crmsync.db"))
        .unwrap_or_else(|| PathBuf::from("crmsync.db"))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Engine tuning shared by every integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Pulled records per Mapping Store batch.
    #[serde(default = "default_mapping_batch_size")]
    pub mapping_batch_size: usize,

    /// Retries of the same page when pagination ends short of the total.
    #[serde(default = "default_page_retry_limit")]
    pub page_retry_limit: u32,

    /// Fixed delay between those retries (milliseconds).
    #[serde(default = "default_page_retry_delay")]
    pub page_retry_delay_ms: u64,

    /// Push page size when `--limit` is not given.
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Window size when no start date is given.
    #[serde(default = "default_interval")]
    pub default_interval: String,

    /// Per-request HTTP timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a run lease stays valid (seconds).
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

fn default_mapping_batch_size() -> usize {
    MAPPING_BATCH_SIZE
}
fn default_page_retry_limit() -> u32 {
    PAGE_RETRY_LIMIT
}
fn default_page_retry_delay() -> u64 {
    500
}
fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
fn default_interval() -> String {
    DEFAULT_TIME_INTERVAL.to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_lease_ttl() -> u64 {
    3600
}

/// Longest accepted `lease_ttl_secs` (30 days).
pub const MAX_LEASE_TTL_SECS: u64 = 30 * 24 * 3600;

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mapping_batch_size: default_mapping_batch_size(),
            page_retry_limit: default_page_retry_limit(),
            page_retry_delay_ms: default_page_retry_delay(),
            default_limit: default_limit(),
            default_interval: default_interval(),
            request_timeout_secs: default_request_timeout(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

impl SyncSettings {
    pub fn page_retry_delay(&self) -> Duration {
        Duration::from_millis(self.page_retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        let secs = self.lease_ttl_secs.min(MAX_LEASE_TTL_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }
}

// =============================================================================
// Integration Configuration
// =============================================================================

/// Field maps per object type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectFieldMaps {
    #[serde(default)]
    pub contact: FieldMap,

    #[serde(default)]
    pub company: FieldMap,
}

impl ObjectFieldMaps {
    pub fn get(&self, object_type: ObjectType) -> &FieldMap {
        match object_type {
            ObjectType::Contact => &self.contact,
            ObjectType::Company => &self.company,
        }
    }
}

/// One remote CRM the engine syncs with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Root of the remote service; the API lives under `/api/v1`.
    pub base_url: String,

    /// Bearer token. `None` means the integration is not authorized.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Object types to sync.
    #[serde(default)]
    pub objects: Vec<ObjectType>,

    /// Directions to sync.
    #[serde(default = "default_features")]
    pub features: Vec<Feature>,

    /// Local activity events sent with pushed contacts.
    #[serde(default)]
    pub activity_events: Vec<String>,

    /// External → local field maps.
    #[serde(default)]
    pub fields: ObjectFieldMaps,

    /// Custom-field alias → numeric id.
    #[serde(default)]
    pub custom_field_aliases: CustomFieldAliases,
}

fn default_features() -> Vec<Feature> {
    vec![Feature::Pull, Feature::Push]
}

impl IntegrationConfig {
    /// Creates an integration with both features and no objects.
    pub fn new(base_url: impl Into<String>) -> Self {
        IntegrationConfig {
            base_url: base_url.into(),
            access_token: None,
            objects: Vec::new(),
            features: default_features(),
            activity_events: Vec::new(),
            fields: ObjectFieldMaps::default(),
            custom_field_aliases: CustomFieldAliases::new(),
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.access_token
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn syncs(&self, object_type: ObjectType) -> bool {
        self.objects.contains(&object_type)
    }

    pub fn field_map(&self, object_type: ObjectType) -> &FieldMap {
        self.fields.get(object_type)
    }

    fn validate(&self, name: &str) -> SyncResult<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {} ({})", name, self.base_url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "{}: base_url must start with http:// or https://, got: {}",
                name, self.base_url
            )));
        }

        for object_type in ObjectType::ALL {
            self.field_map(object_type)
                .validate()
                .map_err(|e| SyncError::InvalidConfig(format!("{}.fields.{}: {}", name, object_type, e)))?;
        }

        Ok(())
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    /// Integrations by name.
    #[serde(default)]
    pub integrations: BTreeMap<String, IntegrationConfig>,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file
    /// 3. Environment variables
    ///
    /// An explicit `config_path` that does not exist is an error; a missing
    /// file at the default location is not.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        match config_path {
            Some(path) => {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml(&contents)?;
            }
            None => match Self::default_config_path() {
                Some(path) if path.exists() => {
                    info!(?path, "Loading sync config from file");
                    let contents = std::fs::read_to_string(&path)?;
                    config = Self::from_toml(&contents)?;
                }
                path => debug!(?path, "Config file not found, using defaults"),
            },
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document (no env overrides, no validation).
    pub fn from_toml(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.mapping_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "mapping_batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.page_retry_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "page_retry_limit must be greater than 0".into(),
            ));
        }

        if self.sync.default_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "default_limit must be greater than 0".into(),
            ));
        }

        if self.sync.lease_ttl_secs == 0 || self.sync.lease_ttl_secs > MAX_LEASE_TTL_SECS {
            return Err(SyncError::InvalidConfig(format!(
                "lease_ttl_secs must be between 1 and {}",
                MAX_LEASE_TTL_SECS
            )));
        }

        parse_interval(&self.sync.default_interval)?;

        for (name, integration) in &self.integrations {
            integration.validate(name)?;
        }

        Ok(())
    }

    /// Looks up an integration by name.
    ///
    /// ## Returns
    /// * `Err(SyncError::NotConfigured)` - No such integration
    pub fn integration(&self, name: &str) -> SyncResult<&IntegrationConfig> {
        self.integrations
            .get(name)
            .ok_or_else(|| SyncError::NotConfigured {
                integration: name.to_string(),
                available: if self.integrations.is_empty() {
                    "none".to_string()
                } else {
                    self.integrations.keys().cloned().collect::<Vec<_>>().join(", ")
                },
            })
    }

    /// Name of the environment variable carrying an integration's token.
    pub fn token_env_var(integration: &str) -> String {
        let suffix: String = integration
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("CRMSYNC_TOKEN_{}", suffix)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CRMSYNC_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        for (name, integration) in self.integrations.iter_mut() {
            if let Ok(token) = std::env::var(Self::token_env_var(name)) {
                debug!(integration = %name, "Overriding access token from environment");
                integration.access_token = Some(token);
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "crmsync", "crmsync")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [database]
        path = "/tmp/crmsync-test.db"

        [sync]
        page_retry_delay_ms = 10

        [integrations.acme]
        base_url = "https://crm.example.com"
        access_token = "secret"
        objects = ["contact", "company"]
        activity_events = ["page.hit"]

        [integrations.acme.fields.contact]
        email = "email"
        first_name = "firstname"
        custom_12 = "industry"

        [integrations.acme.fields.company]
        name = "name"

        [integrations.acme.custom_field_aliases]
        industry_code = 12
    "#;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.mapping_batch_size, 100);
        assert_eq!(config.sync.page_retry_limit, 5);
        assert_eq!(config.sync.default_limit, 100);
        assert_eq!(config.sync.default_interval, "15 minutes");
        assert!(config.integrations.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = SyncConfig::from_toml(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.page_retry_delay(), Duration::from_millis(10));
        assert_eq!(config.sync.mapping_batch_size, 100);

        let acme = config.integration("acme").unwrap();
        assert!(acme.is_authorized());
        assert!(acme.syncs(ObjectType::Contact));
        assert!(acme.supports(Feature::Pull));
        assert!(acme.supports(Feature::Push));
        assert_eq!(acme.field_map(ObjectType::Contact).len(), 3);
        assert_eq!(
            acme.field_map(ObjectType::Contact).local_key("first_name"),
            Some("firstname")
        );
        assert_eq!(acme.custom_field_aliases.get("industry_code"), Some(&12));

        // Field order follows the file
        let keys: Vec<_> = acme.field_map(ObjectType::Contact).iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["email", "first_name", "custom_12"]);
    }

    #[test]
    fn test_unknown_integration() {
        let config = SyncConfig::from_toml(SAMPLE).unwrap();
        let err = config.integration("globex").unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::from_toml(SAMPLE).unwrap();

        config.sync.mapping_batch_size = 0;
        assert!(config.validate().is_err());
        config.sync.mapping_batch_size = 100;

        config.sync.lease_ttl_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.sync.lease_ttl().num_seconds(), MAX_LEASE_TTL_SECS as i64);
        config.sync.lease_ttl_secs = 0;
        assert!(config.validate().is_err());
        config.sync.lease_ttl_secs = 600;
        assert_eq!(config.sync.lease_ttl().num_seconds(), 600);

        config.sync.default_interval = "soon".into();
        assert!(config.validate().is_err());
        config.sync.default_interval = "1 hour".into();

        if let Some(acme) = config.integrations.get_mut("acme") {
            acme.base_url = "ftp://crm.example.com".into();
        }
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        if let Some(acme) = config.integrations.get_mut("acme") {
            acme.base_url = "https://crm.example.com".into();
            acme.fields.contact.insert("custom_tier", "tier");
        }
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_token_env_override() {
        assert_eq!(SyncConfig::token_env_var("acme-eu"), "CRMSYNC_TOKEN_ACME_EU");

        let mut config = SyncConfig::default();
        config
            .integrations
            .insert("envtoken".into(), IntegrationConfig::new("https://crm.example.com"));
        assert!(!config.integration("envtoken").unwrap().is_authorized());

        std::env::set_var("CRMSYNC_TOKEN_ENVTOKEN", "from-env");
        config.apply_env_overrides();
        std::env::remove_var("CRMSYNC_TOKEN_ENVTOKEN");

        assert_eq!(
            config.integration("envtoken").unwrap().access_token.as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = SyncConfig::load(Some(PathBuf::from("/nonexistent/crmsync.toml"))).unwrap_err();
        assert!(matches!(err, SyncError::ConfigLoadFailed(_)));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_toml_roundtrip_keeps_sections() {
        let config = SyncConfig::from_toml(SAMPLE).unwrap();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[integrations.acme"));
    }
}
