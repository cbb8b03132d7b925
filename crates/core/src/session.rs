//! Session fact type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{DeviceType, EventType, MarketingSource};

/// Default inactivity timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Builds the session id for a client's n-th session (1-based).
pub fn session_id_for(client_id: &str, session_index: u32) -> String {
    format!("{}-{}", client_id, session_index)
}

/// One visit: a contiguous run of a client's events with no gap above the timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub client_id: String,
    /// 1-based, increasing with time within a client
    pub session_index: u32,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub duration_secs: i64,
    pub events: u64,

    // Funnel counters
    pub pageviews: u64,
    pub add_to_cart: u64,
    pub checkout_started: u64,
    pub purchases: u64,

    // Landing context (first event of the session)
    pub landing_page_url: Option<String>,
    pub ref_domain: Option<String>,
    pub marketing_source: MarketingSource,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub device_type: DeviceType,
}

impl Session {
    /// Bumps the funnel counter matching an event type.
    pub fn count_event(&mut self, event_type: EventType) {
        self.events += 1;
        match event_type {
            EventType::Pageview => self.pageviews += 1,
            EventType::AddToCart => self.add_to_cart += 1,
            EventType::CheckoutStarted => self.checkout_started += 1,
            EventType::Purchase => self.purchases += 1,
            EventType::Other => {}
        }
    }

    /// Whether this session can earn attribution credit, given the sentinel sources.
    pub fn is_touchpoint(&self, non_touchpoint_sources: &[String]) -> bool {
        let source = self.marketing_source.as_str();
        !non_touchpoint_sources.iter().any(|s| s == source)
    }
}
