//! Cross-stage reconciliation.
//!
//! Recounts every artifact of a run and checks the identities that prove no
//! event was lost or double-counted between stages. The report is data for
//! the caller; nothing here stops a run.

use std::collections::{BTreeMap, BTreeSet};

use engine_core::{AttributionFact, AttributionModel, CanonicalEvent, LoadStats, Order, RawEvent, Session};
use serde::{Deserialize, Serialize};

use crate::canonicalize::CanonicalizeStats;
use crate::orders::OrderStats;

/// Relative tolerance for revenue sums.
const REVENUE_TOLERANCE: f64 = 1e-6;

/// Everything one run produced, borrowed for checking.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInputs<'a> {
    /// Line accounting of the load that produced `raw`
    pub load: &'a LoadStats,
    pub raw: &'a [RawEvent],
    pub canonicalize: &'a CanonicalizeStats,
    /// Session-tagged canonical events
    pub events: &'a [CanonicalEvent],
    pub sessions: &'a [Session],
    pub orders: &'a [Order],
    pub order_stats: &'a OrderStats,
    pub facts: &'a [AttributionFact],
}

/// Per-partition record and order counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionReconciliation {
    pub partition: String,
    pub lines: u64,
    pub blank_lines: u64,
    pub malformed_lines: u64,
    pub raw_records: u64,
    /// `lines == raw_records + blank_lines + malformed_lines`
    pub lines_explained: bool,
    pub canonical_events: u64,
    /// Purchase events carrying a transaction id
    pub purchase_events: u64,
    pub duplicate_purchase_events: u64,
    pub unresolved_orders: u64,
    pub orders: u64,
    /// `purchase_events - duplicate_purchase_events - unresolved_orders == orders`
    pub reconciled: bool,
}

/// Aggregate cross-checks of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    // Input lines -> raw records
    pub raw_lines: u64,
    pub blank_lines: u64,
    pub malformed_lines: u64,
    pub lines_explained: bool,

    // Raw -> canonical
    pub raw_records: u64,
    pub canonical_events: u64,
    pub dropped_unresolved_identity: u64,
    pub dropped_unparseable_timestamp: u64,
    pub drops_explained: bool,
    pub malformed_payloads: u64,
    pub event_types: BTreeMap<String, u64>,
    pub event_names: BTreeMap<String, u64>,

    // Canonical -> sessions
    pub clients: u64,
    pub session_rows: u64,
    pub events_with_session: u64,
    pub orphan_session_refs: u64,
    pub session_coverage: f64,

    // Canonical -> orders
    pub raw_purchase_events: u64,
    pub incomplete_purchase_events: u64,
    pub malformed_purchase_payloads: u64,
    pub duplicate_purchase_events: u64,
    pub unresolved_orders: u64,
    pub orders: u64,
    pub order_ids_unique: bool,
    pub orders_reconciled: bool,

    // Revenue
    /// Every purchase event's revenue, with or without a transaction id
    pub raw_revenue_sum: f64,
    pub incomplete_revenue_sum: f64,
    pub duplicate_revenue_sum: f64,
    pub unresolved_revenue_sum: f64,
    pub order_revenue_sum: f64,
    pub revenue_reconciled: bool,

    // Orders -> attribution
    pub attribution_rows_by_model: BTreeMap<String, u64>,
    pub attribution_complete: bool,
    pub direct_attribution_share: f64,

    pub partitions: Vec<PartitionReconciliation>,
}

impl ReconciliationReport {
    /// Human-readable descriptions of every identity that failed.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.lines_explained {
            warnings.push(format!(
                "input lines ({}) do not equal records ({}) plus blank ({}) and malformed ({}) lines",
                self.raw_lines, self.raw_records, self.blank_lines, self.malformed_lines
            ));
        }
        if self.malformed_lines > 0 {
            warnings.push(format!(
                "{} input lines could not be read as records and were skipped",
                self.malformed_lines
            ));
        }
        if !self.drops_explained {
            warnings.push(format!(
                "raw records ({}) minus canonical events ({}) does not match counted drops ({})",
                self.raw_records,
                self.canonical_events,
                self.dropped_unresolved_identity + self.dropped_unparseable_timestamp
            ));
        }
        if self.session_coverage < 1.0 {
            warnings.push(format!(
                "session coverage is {:.4}: {} of {} events carry a session",
                self.session_coverage, self.events_with_session, self.canonical_events
            ));
        }
        if self.orphan_session_refs > 0 {
            warnings.push(format!(
                "{} events reference a session that was not emitted",
                self.orphan_session_refs
            ));
        }
        if !self.order_ids_unique {
            warnings.push("order table contains duplicate transaction ids".to_string());
        }
        if !self.orders_reconciled {
            warnings.push(format!(
                "purchase events ({}) minus incomplete ({}), duplicates ({}) and unresolved ({}) does not equal orders ({})",
                self.raw_purchase_events,
                self.incomplete_purchase_events,
                self.duplicate_purchase_events,
                self.unresolved_orders,
                self.orders
            ));
        }
        if !self.revenue_reconciled {
            warnings.push(format!(
                "raw revenue {:.2} minus incomplete {:.2}, duplicate {:.2} and unresolved {:.2} revenue does not equal order revenue {:.2}",
                self.raw_revenue_sum,
                self.incomplete_revenue_sum,
                self.duplicate_revenue_sum,
                self.unresolved_revenue_sum,
                self.order_revenue_sum
            ));
        }
        if !self.attribution_complete {
            warnings.push(format!(
                "attribution rows {:?} do not cover {} orders under every model",
                self.attribution_rows_by_model, self.orders
            ));
        }
        for p in self.partitions.iter().filter(|p| !p.lines_explained) {
            warnings.push(format!(
                "partition {}: lines ({}) do not equal records ({}) plus blank ({}) and malformed ({}) lines",
                p.partition, p.lines, p.raw_records, p.blank_lines, p.malformed_lines
            ));
        }
        for p in self.partitions.iter().filter(|p| !p.reconciled) {
            warnings.push(format!(
                "partition {}: purchase events ({}) minus duplicates ({}) and unresolved ({}) does not equal orders ({})",
                p.partition, p.purchase_events, p.duplicate_purchase_events, p.unresolved_orders, p.orders
            ));
        }

        warnings
    }

    pub fn is_consistent(&self) -> bool {
        self.warnings().is_empty()
    }
}

/// Builds the reconciliation report for one run.
pub fn reconcile(inputs: &ReconcileInputs<'_>) -> ReconciliationReport {
    let mut report = ReconciliationReport {
        raw_lines: inputs.load.lines,
        blank_lines: inputs.load.blank_lines,
        malformed_lines: inputs.load.malformed_lines,
        raw_records: inputs.raw.len() as u64,
        canonical_events: inputs.events.len() as u64,
        dropped_unresolved_identity: inputs.canonicalize.unresolved_identity,
        dropped_unparseable_timestamp: inputs.canonicalize.unparseable_timestamp,
        malformed_payloads: inputs.canonicalize.malformed_payloads,
        ..Default::default()
    };
    report.lines_explained =
        report.raw_lines == report.raw_records + report.blank_lines + report.malformed_lines;
    report.drops_explained = report.raw_records
        == report.canonical_events
            + report.dropped_unresolved_identity
            + report.dropped_unparseable_timestamp;

    check_sessions(inputs, &mut report);
    check_orders(inputs, &mut report);
    check_attribution(inputs, &mut report);
    report.partitions = partition_rows(inputs);
    report
}

fn check_sessions(inputs: &ReconcileInputs<'_>, report: &mut ReconciliationReport) {
    let session_ids: BTreeSet<&str> = inputs.sessions.iter().map(|s| s.session_id.as_str()).collect();
    let clients: BTreeSet<&str> = inputs.sessions.iter().map(|s| s.client_id.as_str()).collect();

    for event in inputs.events {
        *report
            .event_types
            .entry(event.event_type.as_str().to_string())
            .or_default() += 1;
        *report.event_names.entry(event.event_name.clone()).or_default() += 1;

        match event.session_id.as_deref() {
            Some(id) if session_ids.contains(id) => report.events_with_session += 1,
            Some(_) => report.orphan_session_refs += 1,
            None => {}
        }
    }

    report.clients = clients.len() as u64;
    report.session_rows = inputs.sessions.len() as u64;
    report.session_coverage = if inputs.events.is_empty() {
        1.0
    } else {
        report.events_with_session as f64 / inputs.events.len() as f64
    };
}

fn check_orders(inputs: &ReconcileInputs<'_>, report: &mut ReconciliationReport) {
    for event in inputs.events.iter().filter(|e| e.event_type.is_purchase()) {
        report.raw_purchase_events += 1;
        if event.payload_status == engine_core::PayloadStatus::Malformed {
            report.malformed_purchase_payloads += 1;
        }
        let revenue = event.revenue.unwrap_or(0.0);
        report.raw_revenue_sum += revenue;
        if event.transaction_id.is_none() {
            report.incomplete_purchase_events += 1;
            report.incomplete_revenue_sum += revenue;
        }
    }

    report.duplicate_purchase_events = inputs.order_stats.duplicate_events;
    report.duplicate_revenue_sum = inputs.order_stats.duplicate_revenue;
    report.unresolved_orders = inputs.order_stats.unresolved_orders;
    report.unresolved_revenue_sum = inputs.order_stats.unresolved_revenue;
    report.orders = inputs.orders.len() as u64;
    report.order_revenue_sum = inputs.orders.iter().filter_map(|o| o.revenue).sum();

    let unique: BTreeSet<&str> = inputs.orders.iter().map(|o| o.transaction_id.as_str()).collect();
    report.order_ids_unique = unique.len() == inputs.orders.len();

    report.orders_reconciled = report
        .raw_purchase_events
        .checked_sub(report.incomplete_purchase_events)
        .and_then(|n| n.checked_sub(report.duplicate_purchase_events))
        .and_then(|n| n.checked_sub(report.unresolved_orders))
        == Some(report.orders);

    let expected = report.raw_revenue_sum
        - report.incomplete_revenue_sum
        - report.duplicate_revenue_sum
        - report.unresolved_revenue_sum;
    let scale = report.raw_revenue_sum.abs().max(1.0);
    report.revenue_reconciled = (expected - report.order_revenue_sum).abs() <= REVENUE_TOLERANCE * scale;
}

fn check_attribution(inputs: &ReconcileInputs<'_>, report: &mut ReconciliationReport) {
    for model in AttributionModel::ALL {
        report.attribution_rows_by_model.insert(model.as_str().to_string(), 0);
    }
    for fact in inputs.facts {
        *report
            .attribution_rows_by_model
            .entry(fact.model.as_str().to_string())
            .or_default() += 1;
    }

    let mut per_order: BTreeMap<&str, BTreeSet<AttributionModel>> = BTreeMap::new();
    for fact in inputs.facts {
        per_order.entry(fact.transaction_id.as_str()).or_default().insert(fact.model);
    }
    report.attribution_complete = inputs.facts.len() == inputs.orders.len() * AttributionModel::ALL.len()
        && inputs.orders.iter().all(|o| {
            per_order
                .get(o.transaction_id.as_str())
                .is_some_and(|models| models.len() == AttributionModel::ALL.len())
        });

    let direct = inputs.facts.iter().filter(|f| f.is_direct()).count();
    report.direct_attribution_share = if inputs.facts.is_empty() {
        0.0
    } else {
        direct as f64 / inputs.facts.len() as f64
    };
}

fn partition_row<'m>(
    rows: &'m mut BTreeMap<String, PartitionReconciliation>,
    name: &str,
) -> &'m mut PartitionReconciliation {
    rows.entry(name.to_string()).or_insert_with(|| PartitionReconciliation {
        partition: name.to_string(),
        ..Default::default()
    })
}

fn partition_rows(inputs: &ReconcileInputs<'_>) -> Vec<PartitionReconciliation> {
    let mut rows: BTreeMap<String, PartitionReconciliation> = BTreeMap::new();

    for load in &inputs.load.partitions {
        let row = partition_row(&mut rows, &load.partition);
        row.lines += load.lines;
        row.blank_lines += load.blank_lines;
        row.malformed_lines += load.malformed_lines;
    }
    for raw in inputs.raw {
        partition_row(&mut rows, &raw.partition).raw_records += 1;
    }
    for event in inputs.events {
        partition_row(&mut rows, &event.partition).canonical_events += 1;
    }
    for (name, stats) in &inputs.order_stats.partitions {
        let row = partition_row(&mut rows, name);
        row.purchase_events = stats.purchase_events;
        row.duplicate_purchase_events = stats.duplicate_events;
        row.unresolved_orders = stats.unresolved_orders;
    }
    for order in inputs.orders {
        partition_row(&mut rows, &order.partition).orders += 1;
    }

    rows.into_values()
        .map(|mut r| {
            r.lines_explained = r.lines == r.raw_records + r.blank_lines + r.malformed_lines;
            r.reconciled = r
                .purchase_events
                .checked_sub(r.duplicate_purchase_events)
                .and_then(|n| n.checked_sub(r.unresolved_orders))
                == Some(r.orders);
            r
        })
        .collect()
}
