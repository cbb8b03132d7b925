//! Acquisition context and device inference.
//!
//! Both inferences are pure, total functions over free-text fields, kept
//! behind traits so the heuristics can be swapped without touching the
//! stages that consume them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use engine_core::{DeviceClassifierKind, DeviceType, MarketingSource};
use regex::Regex;
use woothee::parser::Parser;

/// Query keys of paid click identifiers, checked in order.
const PAID_CLICK_KEYS: &[(&[&str], MarketingSource)] = &[
    (&["gclid", "gbraid", "wbraid", "gad_source"], MarketingSource::GoogleAds),
    (&["fbclid"], MarketingSource::MetaAds),
    (&["ttclid"], MarketingSource::TiktokAds),
    (&["msclkid"], MarketingSource::MicrosoftAds),
];

const GOOGLE_HOSTS: &[&str] = &["google.com", "www.google.com"];
const BING_HOSTS: &[&str] = &["bing.com", "www.bing.com"];

/// Everything the source heuristics look at, extracted once per event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionSignals {
    /// Landing page query parameters with non-blank values (first value per key)
    pub query: BTreeMap<String, String>,
    /// Whether a non-blank referrer was present at all
    pub referrer_present: bool,
    /// Lowercased referrer host, when the referrer parses as an absolute URL
    pub ref_domain: Option<String>,
}

impl AcquisitionSignals {
    pub fn extract(page_url: Option<&str>, referrer: Option<&str>) -> Self {
        let referrer = referrer.map(str::trim).filter(|r| !r.is_empty());
        Self {
            query: page_url.map(query_params).unwrap_or_default(),
            referrer_present: referrer.is_some(),
            ref_domain: referrer.and_then(referrer_domain),
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.query.contains_key(key)
    }

    pub fn utm(&self, name: &str) -> Option<String> {
        self.query.get(&format!("utm_{}", name)).cloned()
    }
}

/// Parses the query string of a page URL.
///
/// Works for relative URLs too. Keys with blank values are skipped and the
/// first value of a repeated key wins.
pub fn query_params(page_url: &str) -> BTreeMap<String, String> {
    let Some((_, rest)) = page_url.split_once('?') else {
        return BTreeMap::new();
    };
    let query = rest.split('#').next().unwrap_or_default();

    let mut params = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.trim().is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Extracts the lowercased host of an absolute referrer URL.
pub fn referrer_domain(referrer: &str) -> Option<String> {
    url::Url::parse(referrer.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .filter(|h| !h.is_empty())
}

/// Infers the marketing source of a visit.
pub trait SourceClassifier: Send + Sync {
    fn classify(&self, signals: &AcquisitionSignals) -> MarketingSource;
}

/// Ordered rules: paid click ids, UTM tagging, organic search, then referrer buckets.
#[derive(Debug, Clone)]
pub struct RuleBasedSourceClassifier {
    internal_domains: Vec<String>,
}

impl RuleBasedSourceClassifier {
    pub fn new(internal_domains: &[String]) -> Self {
        Self {
            internal_domains: internal_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    fn is_internal(&self, host: &str) -> bool {
        self.internal_domains.iter().any(|d| {
            host == d
                || host
                    .strip_suffix(d.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl SourceClassifier for RuleBasedSourceClassifier {
    fn classify(&self, signals: &AcquisitionSignals) -> MarketingSource {
        for (keys, source) in PAID_CLICK_KEYS {
            if keys.iter().any(|k| signals.has_key(k)) {
                return *source;
            }
        }

        if signals.query.keys().any(|k| k.starts_with("utm_")) {
            return MarketingSource::UtmTagged;
        }

        let host = signals.ref_domain.as_deref();
        if host.is_some_and(|h| GOOGLE_HOSTS.contains(&h)) {
            return MarketingSource::GoogleOrganic;
        }
        if host.is_some_and(|h| BING_HOSTS.contains(&h)) {
            return MarketingSource::BingOrganic;
        }

        if !signals.referrer_present {
            return MarketingSource::Direct;
        }
        if host.is_some_and(|h| self.is_internal(h)) {
            return MarketingSource::Internal;
        }
        MarketingSource::OtherReferrer
    }
}

/// Infers the device category from a user agent.
pub trait DeviceClassifier: Send + Sync {
    fn classify(&self, user_agent: Option<&str>) -> DeviceType;
}

static TABLET_UA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ipad|tablet").expect("tablet pattern is valid"));
static MOBILE_UA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)iphone|android|mobile").expect("mobile pattern is valid"));

/// Substring heuristic: tablet markers, then phone markers, else desktop.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDeviceClassifier;

impl DeviceClassifier for KeywordDeviceClassifier {
    fn classify(&self, user_agent: Option<&str>) -> DeviceType {
        let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return DeviceType::Unknown;
        };
        if TABLET_UA.is_match(ua) {
            DeviceType::Tablet
        } else if MOBILE_UA.is_match(ua) {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }
}

/// User agent parsing via woothee.
///
/// woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc.
/// iPads are reported as smartphones and are split out by OS name.
pub struct WootheeDeviceClassifier {
    parser: Parser,
}

impl WootheeDeviceClassifier {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }
}

impl Default for WootheeDeviceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClassifier for WootheeDeviceClassifier {
    fn classify(&self, user_agent: Option<&str>) -> DeviceType {
        let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return DeviceType::Unknown;
        };
        let Some(result) = self.parser.parse(ua) else {
            return DeviceType::Unknown;
        };

        if result.os == "iPad" {
            return DeviceType::Tablet;
        }
        match result.category {
            "pc" => DeviceType::Desktop,
            "smartphone" | "mobilephone" => DeviceType::Mobile,
            "crawler" => DeviceType::Bot,
            "appliance" => DeviceType::Other,
            _ => DeviceType::Unknown,
        }
    }
}

/// Builds the configured device classifier.
pub fn device_classifier(kind: DeviceClassifierKind) -> Box<dyn DeviceClassifier> {
    match kind {
        DeviceClassifierKind::Keyword => Box::new(KeywordDeviceClassifier),
        DeviceClassifierKind::Woothee => Box::new(WootheeDeviceClassifier::new()),
    }
}
