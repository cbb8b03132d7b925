//! Raw record canonicalization.
//!
//! Resolves field aliases, parses timestamps and payloads, derives the
//! acquisition context, and assigns the surrogate `event_id`. Nothing
//! downstream ever sees an alias name.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use engine_core::{
    CanonicalEvent, EngineConfig, EventType, FieldAliases, PayloadStatus, RawEvent,
};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::enrichment::{
    device_classifier, AcquisitionSignals, DeviceClassifier, RuleBasedSourceClassifier,
    SourceClassifier,
};

/// Timestamp layouts tried after RFC 3339, all read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a raw record produced no canonical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// None of the identity aliases carried a value
    UnresolvedIdentity,
    /// The timestamp was missing or in no recognised format
    UnparseableTimestamp,
}

/// Counts from one canonicalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalizeStats {
    pub records: u64,
    pub events: u64,
    pub unresolved_identity: u64,
    pub unparseable_timestamp: u64,
    /// Malformed payloads on non-purchase events (tolerated)
    pub malformed_payloads: u64,
    /// Malformed payloads on purchase events (order fields unrecoverable)
    pub malformed_purchase_payloads: u64,
}

impl CanonicalizeStats {
    pub fn dropped(&self) -> u64 {
        self.unresolved_identity + self.unparseable_timestamp
    }

    pub fn merge(mut self, other: &Self) -> Self {
        self.records += other.records;
        self.events += other.events;
        self.unresolved_identity += other.unresolved_identity;
        self.unparseable_timestamp += other.unparseable_timestamp;
        self.malformed_payloads += other.malformed_payloads;
        self.malformed_purchase_payloads += other.malformed_purchase_payloads;
        self
    }

    fn observe(&mut self, outcome: &Result<CanonicalEvent, Rejection>) {
        self.records += 1;
        match outcome {
            Ok(event) => {
                self.events += 1;
                if event.payload_status == PayloadStatus::Malformed {
                    if event.event_type.is_purchase() {
                        self.malformed_purchase_payloads += 1;
                    } else {
                        self.malformed_payloads += 1;
                    }
                }
            }
            Err(Rejection::UnresolvedIdentity) => self.unresolved_identity += 1,
            Err(Rejection::UnparseableTimestamp) => self.unparseable_timestamp += 1,
        }
    }
}

/// Canonical events plus the counts that explain any difference to the input.
#[derive(Debug, Clone, Default)]
pub struct CanonicalizeOutcome {
    pub events: Vec<CanonicalEvent>,
    pub stats: CanonicalizeStats,
}

/// Normalizes raw records into canonical events.
pub struct Canonicalizer {
    aliases: FieldAliases,
    sources: Box<dyn SourceClassifier>,
    devices: Box<dyn DeviceClassifier>,
}

impl Canonicalizer {
    /// Builds a canonicalizer with the configured aliases and heuristics.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_classifiers(
            config.aliases.clone(),
            Box::new(RuleBasedSourceClassifier::new(&config.internal_domains)),
            device_classifier(config.device_classifier),
        )
    }

    pub fn with_classifiers(
        aliases: FieldAliases,
        sources: Box<dyn SourceClassifier>,
        devices: Box<dyn DeviceClassifier>,
    ) -> Self {
        Self {
            aliases,
            sources,
            devices,
        }
    }

    /// Canonicalizes one record.
    pub fn canonicalize(&self, raw: &RawEvent) -> Result<CanonicalEvent, Rejection> {
        let client_id =
            resolve_text(raw, &self.aliases.client_id).ok_or(Rejection::UnresolvedIdentity)?;

        let ts = resolve(raw, &self.aliases.timestamp)
            .and_then(timestamp_value)
            .ok_or(Rejection::UnparseableTimestamp)?;

        let event_name = resolve_text(raw, &self.aliases.event_name).unwrap_or_default();
        let event_type = EventType::from_name(&event_name);

        let page_url = resolve_text(raw, &self.aliases.page_url);
        let referrer = resolve_text(raw, &self.aliases.referrer);
        let user_agent = resolve_text(raw, &self.aliases.user_agent);

        let signals = AcquisitionSignals::extract(page_url.as_deref(), referrer.as_deref());
        let marketing_source = self.sources.classify(&signals);
        let device_type = self.devices.classify(user_agent.as_deref());

        let (payload_status, payload) = parse_payload(resolve(raw, &self.aliases.event_data));
        let payload = payload.unwrap_or_default();

        Ok(CanonicalEvent {
            event_id: raw.ordinal,
            partition: raw.partition.clone(),
            client_id,
            event_name,
            event_type,
            ts,
            event_date: ts.date_naive(),
            page_url,
            referrer,
            user_agent,
            utm_source: signals.utm("source"),
            utm_medium: signals.utm("medium"),
            utm_campaign: signals.utm("campaign"),
            ref_domain: signals.ref_domain,
            marketing_source,
            device_type,
            payload_status,
            transaction_id: payload.get("transaction_id").and_then(scalar_text),
            revenue: payload.get("revenue").and_then(number_value),
            items_count: payload
                .get("items")
                .and_then(Value::as_array)
                .map(|items| items.len().min(u32::MAX as usize) as u32),
            session_id: None,
        })
    }

    /// Canonicalizes a whole run in parallel, preserving input order.
    pub fn canonicalize_all(&self, records: &[RawEvent]) -> CanonicalizeOutcome {
        let results: Vec<Result<CanonicalEvent, Rejection>> =
            records.par_iter().map(|raw| self.canonicalize(raw)).collect();

        let mut stats = CanonicalizeStats::default();
        let mut events = Vec::with_capacity(results.len());
        for (raw, result) in records.iter().zip(results) {
            stats.observe(&result);
            match result {
                Ok(event) => events.push(event),
                Err(rejection) => debug!(
                    partition = %raw.partition,
                    line = raw.line,
                    ?rejection,
                    "Dropped raw record"
                ),
            }
        }

        CanonicalizeOutcome { events, stats }
    }
}

/// First alias carrying a non-null, non-blank value.
fn resolve<'a>(raw: &'a RawEvent, candidates: &[String]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|name| raw.field(name))
        .find(|value| !matches!(value, Value::String(s) if s.trim().is_empty()))
}

/// First alias whose value renders as text (strings and numbers).
fn resolve_text(raw: &RawEvent, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|name| raw.field(name))
        .find_map(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Parses an event timestamp into a UTC instant.
///
/// RFC 3339 with any offset first, then naive layouts taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parses the optional payload, which may arrive as a JSON string or inline object.
fn parse_payload(value: Option<&Value>) -> (PayloadStatus, Option<Map<String, Value>>) {
    match value {
        None => (PayloadStatus::Absent, None),
        Some(Value::Object(map)) => (PayloadStatus::Parsed, Some(map.clone())),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Object(map)) => (PayloadStatus::Parsed, Some(map)),
            _ => (PayloadStatus::Malformed, None),
        },
        Some(_) => (PayloadStatus::Malformed, None),
    }
}
