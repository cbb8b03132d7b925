//! End-to-end tests over partition files on disk.
//!
//! Each test writes raw partitions into a temp directory, runs the full
//! load -> transform -> publish path, and checks the published tables.

use std::collections::{BTreeMap, BTreeSet};

use engine_core::EngineConfig;
use integration_tests::fixtures::{self, at_minutes, at_seconds};
use integration_tests::setup::{read_jsonl, TestContext};
use serde_json::Value;

const DAY_MINUTES: i64 = 24 * 60;

fn facts_by_tx(ctx: &TestContext) -> BTreeMap<(String, String), Value> {
    ctx.read_table("fct_attribution.jsonl")
        .into_iter()
        .map(|f| {
            let key = (
                f["transaction_id"].as_str().unwrap().to_string(),
                f["model"].as_str().unwrap().to_string(),
            );
            (key, f)
        })
        .collect()
}

/// 29:59 gap stays in one session, 30:01 gap opens a new one
#[tokio::test]
async fn test_session_gap_boundaries() {
    let ctx = TestContext::new();
    let gap_below = 29 * 60 + 59;
    let gap_above = 30 * 60 + 1;
    ctx.write_partition(
        "2025-02-23",
        &[
            fixtures::direct_landing("a", &at_seconds(0)),
            fixtures::add_to_cart("a", &at_seconds(gap_below)),
            fixtures::direct_landing("a", &at_seconds(gap_below + gap_above)),
        ],
    );

    let output = ctx.run().await.unwrap();
    assert_eq!(output.sessions.len(), 2);

    let events = ctx.read_table("stg_events.jsonl");
    let ids: Vec<&str> = events.iter().map(|e| e["session_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a-1", "a-1", "a-2"]);

    let sessions = ctx.read_table("fct_sessions.jsonl");
    assert_eq!(sessions[0]["events"], 2);
    assert_eq!(sessions[0]["duration_secs"], gap_below);
    assert_eq!(sessions[1]["session_index"], 2);
}

/// Every staged event references exactly one published session
#[tokio::test]
async fn test_full_session_coverage() {
    let ctx = TestContext::new();
    let mut day1 = Vec::new();
    for client in ["a", "b", "c", "d"] {
        for i in 0..6 {
            day1.push(fixtures::direct_landing(client, &at_minutes(i * 45)));
        }
    }
    ctx.write_partition("2025-02-23", &day1);

    ctx.run().await.unwrap();

    let session_ids: BTreeSet<String> = ctx
        .read_table("fct_sessions.jsonl")
        .iter()
        .map(|s| s["session_id"].as_str().unwrap().to_string())
        .collect();
    let events = ctx.read_table("stg_events.jsonl");
    assert_eq!(events.len(), 24);
    for event in &events {
        let id = event["session_id"].as_str().expect("event without session");
        assert!(session_ids.contains(id), "orphan session id {}", id);
    }
    // Each 45 minute step exceeds the timeout
    assert_eq!(session_ids.len(), 24);
}

/// A touchpoint 2 days back earns credit, one 8 days back does not
#[tokio::test]
async fn test_lookback_window() {
    let ctx = TestContext::new();
    ctx.write_partition("2025-02-23", &[fixtures::meta_ads_landing("old", &at_minutes(0))]);
    ctx.write_partition(
        "2025-02-26",
        &[fixtures::google_ads_landing("recent", &at_minutes(3 * DAY_MINUTES))],
    );
    ctx.write_partition(
        "2025-02-28",
        &[fixtures::purchase("recent", &at_minutes(5 * DAY_MINUTES), "T-RECENT", 500.0)],
    );
    ctx.write_partition(
        "2025-03-03",
        &[fixtures::purchase("old", &at_minutes(8 * DAY_MINUTES), "T-OLD", 250.0)],
    );

    let output = ctx.run().await.unwrap();
    assert!(output.report.is_consistent(), "{:?}", output.report.warnings());

    let facts = facts_by_tx(&ctx);
    assert_eq!(facts.len(), 4);
    for model in ["first_click", "last_click"] {
        let recent = &facts[&("T-RECENT".to_string(), model.to_string())];
        assert_eq!(recent["attributed_source"], "google_ads");
        assert_eq!(recent["attributed_session_id"], "recent-1");

        let old = &facts[&("T-OLD".to_string(), model.to_string())];
        assert_eq!(old["attributed_source"], "direct");
        assert!(old["attributed_session_id"].is_null());
    }
}

/// First click and last click diverge across several touchpoints
#[tokio::test]
async fn test_first_and_last_click_diverge() {
    let ctx = TestContext::new();
    ctx.write_partition(
        "2025-02-23",
        &[
            fixtures::google_ads_landing("multi", &at_minutes(0)),
            fixtures::direct_landing("multi", &at_minutes(120)),
        ],
    );
    ctx.write_partition(
        "2025-02-25",
        &[
            fixtures::meta_ads_landing("multi", &at_minutes(2 * DAY_MINUTES)),
            fixtures::add_to_cart("multi", &at_minutes(2 * DAY_MINUTES + 5)),
            fixtures::purchase("multi", &at_minutes(2 * DAY_MINUTES + 10), "T-M", 899.0),
        ],
    );

    let output = ctx.run().await.unwrap();
    assert_eq!(output.attribution_stats.multi_touch_orders, 1);

    let facts = facts_by_tx(&ctx);
    let first = &facts[&("T-M".to_string(), "first_click".to_string())];
    let last = &facts[&("T-M".to_string(), "last_click".to_string())];
    assert_eq!(first["attributed_source"], "google_ads");
    assert_eq!(first["utm_source"], "google");
    assert_eq!(last["attributed_source"], "meta_ads");
    // The direct session in between never earns credit
    assert_eq!(first["attributed_session_id"], "multi-1");
    assert_eq!(last["attributed_session_id"], "multi-3");

    let orders = ctx.read_table("fct_orders.jsonl");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["session_id"], "multi-3");
    assert_eq!(orders[0]["revenue"], 899.0);
    assert_eq!(orders[0]["items_count"], 1);
}

/// A lone touchpoint is both the first and the last click
#[tokio::test]
async fn test_single_touchpoint_first_equals_last() {
    let ctx = TestContext::new();
    ctx.write_partition(
        "2025-02-23",
        &[
            fixtures::google_ads_landing("solo", &at_minutes(0)),
            fixtures::purchase("solo", &at_minutes(3), "T-S", 42.0),
        ],
    );

    ctx.run().await.unwrap();
    let facts = facts_by_tx(&ctx);
    let first = &facts[&("T-S".to_string(), "first_click".to_string())];
    let last = &facts[&("T-S".to_string(), "last_click".to_string())];
    assert_eq!(first["attributed_session_id"], last["attributed_session_id"]);
    assert_eq!(first["attributed_source"], last["attributed_source"]);
}

/// CSV exports and JSON Lines partitions load into one run
#[tokio::test]
async fn test_csv_and_jsonl_partitions_in_one_run() {
    let ctx = TestContext::new();
    let columns = ["client_id", "page_url", "referrer", "timestamp", "event_name", "event_data", "user_agent"];
    ctx.write_csv_partition(
        "2025-02-23",
        &columns,
        &[
            fixtures::google_ads_landing("csv-client", &at_minutes(0)),
            fixtures::purchase("csv-client", &at_minutes(4), "T-CSV", 320.5),
        ],
    );
    ctx.write_partition(
        "2025-02-24",
        &[
            fixtures::meta_ads_landing("csv-client", &at_minutes(DAY_MINUTES)),
            fixtures::purchase("csv-client", &at_minutes(DAY_MINUTES + 3), "T-JSON", 80.0),
        ],
    );

    let output = ctx.run().await.unwrap();
    assert!(output.report.is_consistent(), "{:?}", output.report.warnings());
    assert_eq!(output.report.raw_records, 4);
    assert_eq!(output.report.raw_lines, 4);

    let events = ctx.read_table("stg_events.jsonl");
    let ids: Vec<i64> = events.iter().map(|e| e["event_id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(events[0]["partition"], "2025-02-23");
    assert_eq!(events[0]["marketing_source"], "google_ads");

    let orders = ctx.read_table("fct_orders.jsonl");
    let csv_order = orders.iter().find(|o| o["transaction_id"] == "T-CSV").unwrap();
    assert_eq!(csv_order["revenue"], 320.5);
    assert_eq!(csv_order["items_count"], 1);

    let facts = facts_by_tx(&ctx);
    let first = &facts[&("T-JSON".to_string(), "first_click".to_string())];
    let last = &facts[&("T-JSON".to_string(), "last_click".to_string())];
    assert_eq!(first["attributed_source"], "google_ads");
    assert_eq!(last["attributed_source"], "meta_ads");
}

/// Two runs over the same input publish identical bytes, whatever the shard count
#[tokio::test]
async fn test_idempotent_across_shard_counts() {
    let ctx = TestContext::new();
    let mut day1 = Vec::new();
    let mut day2 = Vec::new();
    for c in 0..40 {
        let client = format!("client-{}", c);
        day1.push(fixtures::google_ads_landing(&client, &at_minutes(c)));
        day1.push(fixtures::add_to_cart(&client, &at_minutes(c + 5)));
        if c % 3 == 0 {
            day2.push(fixtures::meta_ads_landing(&client, &at_minutes(DAY_MINUTES + c)));
            day2.push(fixtures::purchase(&client, &at_minutes(DAY_MINUTES + c + 2), &format!("T{}", c), c as f64 * 10.5));
        }
    }
    ctx.write_partition("2025-02-23", &day1);
    ctx.write_partition("2025-02-24", &day2);

    let runs = [(1usize, "one"), (8, "eight"), (8, "eight-again")];
    for (shards, name) in runs {
        let config = EngineConfig {
            shards,
            ..Default::default()
        };
        let out = ctx.dir.path().join(name);
        ctx.run_with(config, &out.join("warehouse"), &out.join("reports"))
            .await
            .unwrap();
    }

    for file in [
        "warehouse/stg_events.jsonl",
        "warehouse/fct_sessions.jsonl",
        "warehouse/fct_orders.jsonl",
        "warehouse/fct_attribution.jsonl",
        "reports/reconciliation.json",
        "reports/reconciliation.md",
    ] {
        let baseline = std::fs::read(ctx.dir.path().join("one").join(file)).unwrap();
        for name in ["eight", "eight-again"] {
            let other = std::fs::read(ctx.dir.path().join(name).join(file)).unwrap();
            assert_eq!(baseline, other, "{} differs between runs", file);
        }
    }

    let orders = read_jsonl(&ctx.dir.path().join("one/warehouse/fct_orders.jsonl"));
    assert_eq!(orders.len(), 14);
}
