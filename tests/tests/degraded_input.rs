//! Schema drift, dirty records and structural failures.
//!
//! Data problems are counted and the run goes on; structural problems fail
//! the run before anything is published.

use engine_core::EngineConfig;
use integration_tests::fixtures::{self, at_minutes, jsonl};
use integration_tests::setup::TestContext;
use serde_json::json;

/// The identity column is renamed mid-export; both spellings resolve
#[tokio::test]
async fn test_identity_alias_drift() {
    let ctx = TestContext::new();
    ctx.write_partition(
        "2025-02-23",
        &[
            fixtures::direct_landing("a", &at_minutes(0)),
            json!({"clientId": "a", "event_name": "page_viewed", "timestamp": at_minutes(5)}),
            json!({"client_id": null, "clientId": "a", "event_name": "page_viewed", "timestamp": at_minutes(10)}),
        ],
    );

    let output = ctx.run().await.unwrap();
    assert_eq!(output.events.len(), 3);
    assert_eq!(output.sessions.len(), 1);
    assert_eq!(output.sessions[0].events, 3);
    assert_eq!(output.report.dropped_unresolved_identity, 0);
}

/// Records without identity or timestamp are dropped and explained
#[tokio::test]
async fn test_unrecoverable_records_dropped() {
    let ctx = TestContext::new();
    ctx.write_partition(
        "2025-02-23",
        &[
            fixtures::direct_landing("a", &at_minutes(0)),
            json!({"event_name": "page_viewed", "timestamp": at_minutes(1)}),
            json!({"client_id": "  ", "event_name": "page_viewed", "timestamp": at_minutes(2)}),
            json!({"client_id": "b", "event_name": "page_viewed", "timestamp": "yesterday"}),
            json!({"client_id": "b", "event_name": "page_viewed"}),
        ],
    );

    let output = ctx.run().await.unwrap();
    let report = &output.report;
    assert!(report.is_consistent(), "{:?}", report.warnings());
    assert_eq!(report.raw_records, 5);
    assert_eq!(report.canonical_events, 1);
    assert_eq!(report.dropped_unresolved_identity, 2);
    assert_eq!(report.dropped_unparseable_timestamp, 2);
    assert!(report.drops_explained);
}

/// Lines that are not JSON objects never reach the pipeline, but the report accounts for them
#[tokio::test]
async fn test_malformed_lines_skipped() {
    let ctx = TestContext::new();
    let mut content = jsonl(&[fixtures::direct_landing("a", &at_minutes(0))]);
    content.push_str("this is not json\n");
    content.push_str("[\"an\", \"array\"]\n");
    content.push('\n');
    content.push_str(&jsonl(&[fixtures::add_to_cart("a", &at_minutes(1))]));
    ctx.write_raw("2025-02-23.jsonl", &content);

    let output = ctx.run().await.unwrap();
    let report = &output.report;
    assert_eq!(report.raw_records, 2);
    assert_eq!(report.raw_lines, 5);
    assert_eq!(report.blank_lines, 1);
    assert_eq!(report.malformed_lines, 2);
    assert!(report.lines_explained);
    assert_eq!(output.events.len(), 2);
    // Ordinals stay contiguous across skipped lines
    assert_eq!(output.sessions.len(), 1);
    assert_eq!(output.events[1].event_id, 1);
}

/// Truncated purchase lines make the run inconsistent instead of vanishing
#[tokio::test]
async fn test_truncated_purchase_lines_reported() {
    let ctx = TestContext::new();
    let mut content = jsonl(&[fixtures::direct_landing("a", &at_minutes(0))]);
    for i in 0..5 {
        let line = fixtures::purchase("a", &at_minutes(i + 1), &format!("T{}", i), 100.0).to_string();
        content.push_str(&line[..line.len() / 2]);
        content.push('\n');
    }
    ctx.write_raw("2025-02-23.jsonl", &content);

    let output = ctx.run().await.unwrap();
    let report = &output.report;
    assert_eq!(report.raw_records, 1);
    assert_eq!(report.malformed_lines, 5);
    assert!(!report.is_consistent());
    assert!(report.warnings().iter().any(|w| w.contains("5 input lines")));

    let partition = &report.partitions[0];
    assert_eq!((partition.lines, partition.malformed_lines, partition.raw_records), (6, 5, 1));

    let markdown = std::fs::read_to_string(ctx.reports_dir().join("reconciliation.md")).unwrap();
    assert!(markdown.contains("Overall: **INCONSISTENT**"));
    assert!(markdown.contains("| Input lines explained | FAIL | 6 lines = 1 records + 0 blank + 5 malformed |"));
}

/// Rows with the wrong number of CSV cells are skipped and counted
#[tokio::test]
async fn test_short_csv_rows_counted() {
    let ctx = TestContext::new();
    let mut content = fixtures::csv_table(
        &["client_id", "event_name", "timestamp"],
        &[fixtures::direct_landing("a", &at_minutes(0))],
    );
    content.push_str("a,page_viewed\n");
    ctx.write_raw("2025-02-23.csv", &content);

    let output = ctx.run().await.unwrap();
    assert_eq!(output.report.raw_records, 1);
    assert_eq!(output.report.malformed_lines, 1);
    assert!(output.report.lines_explained);
    assert_eq!(output.events.len(), 1);
}

/// Unknown event names survive as `other` and still join sessions
#[tokio::test]
async fn test_unknown_event_names_kept() {
    let ctx = TestContext::new();
    ctx.write_partition(
        "2025-02-23",
        &[
            fixtures::direct_landing("a", &at_minutes(0)),
            json!({"client_id": "a", "event_name": "newsletter_signup", "timestamp": at_minutes(3)}),
        ],
    );

    let output = ctx.run().await.unwrap();
    assert_eq!(output.report.event_types["other"], 1);
    assert_eq!(output.report.event_names["newsletter_signup"], 1);
    assert_eq!(output.sessions[0].events, 2);
}

/// Missing input directory fails with INPUT_001 and publishes nothing
#[tokio::test]
async fn test_missing_input_directory() {
    let ctx = TestContext::new();
    std::fs::remove_dir(ctx.input_dir()).unwrap();

    let err = ctx.run().await.unwrap_err();
    assert_eq!(err.error_code(), Some("INPUT_001"));
    assert!(!ctx.output_dir().exists());
    assert!(!ctx.reports_dir().exists());
}

/// An input directory without partitions fails with INPUT_002
#[tokio::test]
async fn test_no_partitions() {
    let ctx = TestContext::new();
    ctx.write_raw("README.txt", "exports land here");

    let err = ctx.run().await.unwrap_err();
    assert_eq!(err.error_code(), Some("INPUT_002"));
    assert!(!ctx.output_dir().exists());
}

/// Invalid engine config fails with CONFIG_001 before any output
#[tokio::test]
async fn test_invalid_config() {
    let ctx = TestContext::with_config(EngineConfig {
        lookback_days: 1000,
        ..Default::default()
    });
    ctx.write_partition("2025-02-23", &[fixtures::direct_landing("a", &at_minutes(0))]);

    let err = ctx.run().await.unwrap_err();
    assert_eq!(err.error_code(), Some("CONFIG_001"));
    assert!(!ctx.output_dir().exists());
}

/// A failed publish leaves the previous run's artifacts in place
#[tokio::test]
async fn test_failed_publish_keeps_previous_artifacts() {
    let ctx = TestContext::new();
    ctx.write_partition("2025-02-23", &[fixtures::direct_landing("a", &at_minutes(0))]);
    ctx.run().await.unwrap();
    let before = std::fs::read(ctx.output_dir().join("stg_events.jsonl")).unwrap();

    ctx.write_partition(
        "2025-02-24",
        &[fixtures::direct_landing("b", &at_minutes(24 * 60))],
    );
    // Reports destination is a file, so the second publish cannot complete
    let blocked = ctx.dir.path().join("blocked");
    std::fs::write(&blocked, "").unwrap();
    let err = ctx
        .run_with(EngineConfig::default(), &ctx.output_dir(), &blocked)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some("OUTPUT_001"));

    let after = std::fs::read(ctx.output_dir().join("stg_events.jsonl")).unwrap();
    assert_eq!(before, after);
}
