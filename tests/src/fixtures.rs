//! Test fixtures and raw event generators.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

/// Fixed reference instant, 2025-02-23T00:00:00Z.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 23, 0, 0, 0).unwrap()
}

/// `t0` plus a number of minutes, as an RFC 3339 string.
pub fn at_minutes(minutes: i64) -> String {
    (t0() + Duration::minutes(minutes)).to_rfc3339()
}

/// `t0` plus a number of seconds, as an RFC 3339 string.
pub fn at_seconds(seconds: i64) -> String {
    (t0() + Duration::seconds(seconds)).to_rfc3339()
}

/// Generate a pageview with the given landing URL and referrer.
pub fn pageview(client: &str, ts: &str, page_url: &str, referrer: Option<&str>) -> Value {
    let mut event = json!({
        "client_id": client,
        "event_name": "page_viewed",
        "timestamp": ts,
        "page_url": page_url,
        "user_agent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
    });
    if let Some(referrer) = referrer {
        event["referrer"] = json!(referrer);
    }
    event
}

/// Generate an add-to-cart event with no acquisition context.
pub fn add_to_cart(client: &str, ts: &str) -> Value {
    json!({
        "client_id": client,
        "event_name": "product_added_to_cart",
        "timestamp": ts,
        "page_url": "https://puffy.com/products/mattress",
        "referrer": "https://puffy.com/"
    })
}

/// Generate a purchase with a JSON-string payload.
pub fn purchase(client: &str, ts: &str, transaction_id: &str, revenue: f64) -> Value {
    json!({
        "client_id": client,
        "event_name": "checkout_completed",
        "timestamp": ts,
        "page_url": "https://puffy.com/checkout/thank-you",
        "referrer": "https://puffy.com/checkout",
        "event_data": json!({
            "transaction_id": transaction_id,
            "revenue": revenue,
            "items": [{"sku": "mattress-queen", "quantity": 1}]
        }).to_string()
    })
}

/// Generate a Google Ads landing (gclid present).
pub fn google_ads_landing(client: &str, ts: &str) -> Value {
    pageview(client, ts, "https://puffy.com/?gclid=abc123&utm_source=google&utm_medium=cpc", Some("https://www.google.com/"))
}

/// Generate a Meta Ads landing (fbclid present).
pub fn meta_ads_landing(client: &str, ts: &str) -> Value {
    pageview(client, ts, "https://puffy.com/?fbclid=xyz&utm_source=facebook", Some("https://m.facebook.com/"))
}

/// Generate a direct landing (no referrer, no tags).
pub fn direct_landing(client: &str, ts: &str) -> Value {
    pageview(client, ts, "https://puffy.com/", None)
}

/// Render events as CSV with the given header; absent or null fields are empty cells.
pub fn csv_table(columns: &[&str], events: &[Value]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).expect("Failed to write CSV header");
    for event in events {
        let row: Vec<String> = columns
            .iter()
            .map(|c| match event.get(*c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&row).expect("Failed to write CSV row");
    }
    let bytes = writer.into_inner().expect("Failed to flush CSV");
    String::from_utf8(bytes).expect("CSV is UTF-8")
}

/// Render events as JSON Lines.
pub fn jsonl(events: &[Value]) -> String {
    events.iter().map(|e| format!("{}\n", e)).collect()
}
