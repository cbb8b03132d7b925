//! Engine configuration.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{Error, Result};
use crate::order::DEFAULT_LOOKBACK_DAYS;
use crate::session::DEFAULT_SESSION_TIMEOUT_SECS;

/// Candidate field names per logical field, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FieldAliases {
    #[validate(length(min = 1), custom(function = "validate_names"))]
    #[serde(default = "default_client_id_aliases")]
    pub client_id: Vec<String>,
    #[validate(length(min = 1), custom(function = "validate_names"))]
    #[serde(default = "default_event_name_aliases")]
    pub event_name: Vec<String>,
    #[validate(length(min = 1), custom(function = "validate_names"))]
    #[serde(default = "default_timestamp_aliases")]
    pub timestamp: Vec<String>,
    #[serde(default = "default_event_data_aliases")]
    pub event_data: Vec<String>,
    #[serde(default = "default_page_url_aliases")]
    pub page_url: Vec<String>,
    #[serde(default = "default_referrer_aliases")]
    pub referrer: Vec<String>,
    #[serde(default = "default_user_agent_aliases")]
    pub user_agent: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_client_id_aliases() -> Vec<String> {
    names(&["client_id", "clientId"])
}

fn default_event_name_aliases() -> Vec<String> {
    names(&["event_name", "eventName", "event"])
}

fn default_timestamp_aliases() -> Vec<String> {
    names(&["timestamp", "ts", "event_timestamp"])
}

fn default_event_data_aliases() -> Vec<String> {
    names(&["event_data", "eventData"])
}

fn default_page_url_aliases() -> Vec<String> {
    names(&["page_url", "pageUrl", "url"])
}

fn default_referrer_aliases() -> Vec<String> {
    names(&["referrer", "referer"])
}

fn default_user_agent_aliases() -> Vec<String> {
    names(&["user_agent", "userAgent"])
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            client_id: default_client_id_aliases(),
            event_name: default_event_name_aliases(),
            timestamp: default_timestamp_aliases(),
            event_data: default_event_data_aliases(),
            page_url: default_page_url_aliases(),
            referrer: default_referrer_aliases(),
            user_agent: default_user_agent_aliases(),
        }
    }
}

/// Which user agent heuristic to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClassifierKind {
    /// Substring heuristic (ipad/tablet, iphone/android/mobile)
    #[default]
    Keyword,
    /// woothee user agent parser
    Woothee,
}

/// Parameters consumed by the transformation stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Inactivity gap that closes a session, in seconds
    #[validate(range(min = 1, max = 86400))]
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Attribution lookback window, in days
    #[validate(range(max = 365))]
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    #[validate(nested)]
    #[serde(default)]
    pub aliases: FieldAliases,

    /// Marketing sources that never earn attribution credit
    #[serde(default = "default_non_touchpoint_sources")]
    pub non_touchpoint_sources: Vec<String>,

    /// Referrer domains (and their subdomains) treated as internal navigation
    #[serde(default = "default_internal_domains")]
    pub internal_domains: Vec<String>,

    #[serde(default)]
    pub device_classifier: DeviceClassifierKind,

    /// Client shards processed in parallel (0 = one per worker thread)
    #[validate(range(max = 4096))]
    #[serde(default)]
    pub shards: usize,
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_non_touchpoint_sources() -> Vec<String> {
    names(&["direct", "internal"])
}

fn default_internal_domains() -> Vec<String> {
    names(&["puffy.com"])
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            lookback_days: default_lookback_days(),
            aliases: FieldAliases::default(),
            non_touchpoint_sources: default_non_touchpoint_sources(),
            internal_domains: default_internal_domains(),
            device_classifier: DeviceClassifierKind::default(),
            shards: 0,
        }
    }
}

impl EngineConfig {
    /// Runs derive validations and maps failures onto a config error.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|e| Error::config(e.to_string()))
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_timeout_secs as i64)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.lookback_days as i64)
    }
}

fn validate_names(list: &Vec<String>) -> std::result::Result<(), ValidationError> {
    if list.iter().any(|name| name.trim().is_empty()) {
        return Err(ValidationError::new("blank_field_name"));
    }
    Ok(())
}
