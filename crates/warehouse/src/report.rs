//! Reconciliation report rendering.

use std::fmt::Write as _;

use engine_core::Result;
use pipeline::ReconciliationReport;

/// Pretty-printed JSON with a trailing newline.
pub fn render_json(report: &ReconciliationReport) -> Result<String> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    Ok(json)
}

fn status(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Markdown summary of every check.
pub fn render_markdown(report: &ReconciliationReport) -> String {
    let mut md = String::new();
    // Writing into a String cannot fail.
    let _ = write_markdown(&mut md, report);
    md
}

fn write_markdown(md: &mut String, r: &ReconciliationReport) -> std::fmt::Result {
    writeln!(md, "# Reconciliation report")?;
    writeln!(md)?;
    writeln!(
        md,
        "Overall: **{}**",
        if r.is_consistent() { "CONSISTENT" } else { "INCONSISTENT" }
    )?;
    writeln!(md)?;

    writeln!(md, "## Checks")?;
    writeln!(md)?;
    writeln!(md, "| Check | Status | Detail |")?;
    writeln!(md, "|---|---|---|")?;
    writeln!(
        md,
        "| Input lines explained | {} | {} lines = {} records + {} blank + {} malformed |",
        status(r.lines_explained && r.malformed_lines == 0),
        r.raw_lines,
        r.raw_records,
        r.blank_lines,
        r.malformed_lines
    )?;
    writeln!(
        md,
        "| Raw records explained | {} | {} raw = {} canonical + {} unresolved identity + {} unparseable timestamp |",
        status(r.drops_explained),
        r.raw_records,
        r.canonical_events,
        r.dropped_unresolved_identity,
        r.dropped_unparseable_timestamp
    )?;
    writeln!(
        md,
        "| Session coverage | {} | {} of {} events ({:.2}%), {} orphan refs |",
        status(r.session_coverage >= 1.0 && r.orphan_session_refs == 0),
        r.events_with_session,
        r.canonical_events,
        r.session_coverage * 100.0,
        r.orphan_session_refs
    )?;
    writeln!(
        md,
        "| Order ids unique | {} | {} orders |",
        status(r.order_ids_unique),
        r.orders
    )?;
    writeln!(
        md,
        "| Orders reconciled | {} | {} purchases - {} incomplete - {} duplicates - {} unresolved = {} orders |",
        status(r.orders_reconciled),
        r.raw_purchase_events,
        r.incomplete_purchase_events,
        r.duplicate_purchase_events,
        r.unresolved_orders,
        r.orders
    )?;
    writeln!(
        md,
        "| Revenue reconciled | {} | {:.2} raw - {:.2} incomplete - {:.2} duplicate - {:.2} unresolved = {:.2} orders |",
        status(r.revenue_reconciled),
        r.raw_revenue_sum,
        r.incomplete_revenue_sum,
        r.duplicate_revenue_sum,
        r.unresolved_revenue_sum,
        r.order_revenue_sum
    )?;
    let rows: Vec<String> = r
        .attribution_rows_by_model
        .iter()
        .map(|(model, n)| format!("{}={}", model, n))
        .collect();
    writeln!(
        md,
        "| Attribution complete | {} | {} |",
        status(r.attribution_complete),
        rows.join(", ")
    )?;
    writeln!(md)?;

    writeln!(md, "## Volumes")?;
    writeln!(md)?;
    writeln!(md, "- Clients: {}", r.clients)?;
    writeln!(md, "- Sessions: {}", r.session_rows)?;
    writeln!(md, "- Malformed payloads: {}", r.malformed_payloads)?;
    writeln!(md, "- Malformed purchase payloads: {}", r.malformed_purchase_payloads)?;
    writeln!(md, "- Direct attribution share: {:.2}%", r.direct_attribution_share * 100.0)?;
    writeln!(md)?;

    writeln!(md, "## Event types")?;
    writeln!(md)?;
    writeln!(md, "| Type | Events |")?;
    writeln!(md, "|---|---|")?;
    for (name, n) in &r.event_types {
        writeln!(md, "| {} | {} |", name, n)?;
    }
    writeln!(md)?;

    writeln!(md, "## Partitions")?;
    writeln!(md)?;
    writeln!(
        md,
        "| Partition | Lines | Malformed | Raw | Canonical | Purchases | Duplicates | Unresolved | Orders | Status |"
    )?;
    writeln!(md, "|---|---|---|---|---|---|---|---|---|---|")?;
    for p in &r.partitions {
        writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            p.partition,
            p.lines,
            p.malformed_lines,
            p.raw_records,
            p.canonical_events,
            p.purchase_events,
            p.duplicate_purchase_events,
            p.unresolved_orders,
            p.orders,
            status(p.reconciled && p.lines_explained)
        )?;
    }

    let warnings = r.warnings();
    if !warnings.is_empty() {
        writeln!(md)?;
        writeln!(md, "## Warnings")?;
        writeln!(md)?;
        for warning in warnings {
            writeln!(md, "- {}", warning)?;
        }
    }
    Ok(())
}
