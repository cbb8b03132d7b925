//! Raw and canonical event types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw record exactly as read from a partition file.
///
/// The field map carries no fixed schema; identity and other logical fields
/// may appear under any of several alias names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Partition name (file stem, one per calendar date)
    pub partition: String,
    /// 1-based line number inside the partition file
    pub line: u64,
    /// 0-based position in the whole run (partitions in name order, then line)
    pub ordinal: u64,
    /// Record fields as read
    pub fields: Map<String, Value>,
}

impl RawEvent {
    pub fn new(partition: impl Into<String>, line: u64, ordinal: u64, fields: Map<String, Value>) -> Self {
        Self {
            partition: partition.into(),
            line,
            ordinal,
            fields,
        }
    }

    /// Returns a field value, treating JSON null as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

/// Canonical event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pageview,
    AddToCart,
    CheckoutStarted,
    Purchase,
    Other,
}

impl EventType {
    /// Maps a raw event name onto a canonical type.
    ///
    /// Unknown names fall back to `Other` rather than failing.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "page_viewed" | "pageview" | "page_view" => Self::Pageview,
            "product_added_to_cart" | "add_to_cart" => Self::AddToCart,
            "checkout_started" => Self::CheckoutStarted,
            "checkout_completed" | "purchase" => Self::Purchase,
            _ => Self::Other,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pageview => "pageview",
            Self::AddToCart => "add_to_cart",
            Self::CheckoutStarted => "checkout_started",
            Self::Purchase => "purchase",
            Self::Other => "other",
        }
    }

    pub fn is_purchase(&self) -> bool {
        matches!(self, Self::Purchase)
    }
}

/// Outcome of parsing the optional JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStatus {
    Absent,
    Parsed,
    Malformed,
}

/// Inferred marketing source of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketingSource {
    GoogleAds,
    MetaAds,
    TiktokAds,
    MicrosoftAds,
    UtmTagged,
    GoogleOrganic,
    BingOrganic,
    OtherReferrer,
    Internal,
    Direct,
}

impl MarketingSource {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleAds => "google_ads",
            Self::MetaAds => "meta_ads",
            Self::TiktokAds => "tiktok_ads",
            Self::MicrosoftAds => "microsoft_ads",
            Self::UtmTagged => "utm_tagged",
            Self::GoogleOrganic => "google_organic",
            Self::BingOrganic => "bing_organic",
            Self::OtherReferrer => "other_referrer",
            Self::Internal => "internal",
            Self::Direct => "direct",
        }
    }
}

/// Device category inferred from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Bot,
    Other,
    Unknown,
}

impl DeviceType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Bot => "bot",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

/// A raw record normalized to the canonical schema.
///
/// `session_id` stays empty on the canonical stream and is filled in on the
/// enriched stream emitted by sessionization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: u64,
    pub partition: String,
    pub client_id: String,
    /// Raw event name as received (empty when missing)
    pub event_name: String,
    pub event_type: EventType,
    pub ts: DateTime<Utc>,
    pub event_date: NaiveDate,

    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,

    // Acquisition context
    pub ref_domain: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub marketing_source: MarketingSource,
    pub device_type: DeviceType,

    // Payload
    pub payload_status: PayloadStatus,
    pub transaction_id: Option<String>,
    pub revenue: Option<f64>,
    pub items_count: Option<u32>,

    #[serde(default)]
    pub session_id: Option<String>,
}
