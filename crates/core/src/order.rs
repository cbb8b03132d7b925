//! Order and attribution fact types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{DeviceType, MarketingSource};

/// Default attribution lookback window in days.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Attributed source used when no touchpoint qualifies.
pub const DIRECT_SOURCE: &str = "direct";

/// One order per unique business transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub transaction_id: String,
    /// Event the order was materialized from (latest purchase event of the transaction)
    pub event_id: u64,
    pub partition: String,
    pub client_id: String,
    pub session_id: String,
    pub order_ts: DateTime<Utc>,
    /// Carried through unmodified, including zero, negative and fractional values
    pub revenue: Option<f64>,
    pub items_count: Option<u32>,
    /// Duplicate purchase events folded into this order
    pub duplicates_discarded: u64,

    pub marketing_source: MarketingSource,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub ref_domain: Option<String>,
    pub device_type: DeviceType,
}

/// Attribution models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    FirstClick,
    LastClick,
}

impl AttributionModel {
    pub const ALL: [AttributionModel; 2] = [Self::FirstClick, Self::LastClick];

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstClick => "first_click",
            Self::LastClick => "last_click",
        }
    }
}

/// Credit assignment of one order under one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionFact {
    pub transaction_id: String,
    pub model: AttributionModel,
    pub client_id: String,
    pub order_ts: DateTime<Utc>,
    pub revenue: Option<f64>,
    /// Marketing source of the winning session, or `direct`
    pub attributed_source: String,
    pub attributed_session_id: Option<String>,
    pub touchpoint_start: Option<DateTime<Utc>>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub ref_domain: Option<String>,
}

impl AttributionFact {
    pub fn is_direct(&self) -> bool {
        self.attributed_session_id.is_none()
    }
}
