//! Order extraction and transaction deduplication.
//!
//! Purchase events sharing a `transaction_id` are retries or corrections of
//! one order: the latest `(ts, event_id)` wins and the rest are counted.

use std::collections::BTreeMap;

use engine_core::{CanonicalEvent, Order};
use serde::Serialize;
use tracing::debug;

/// Order counts attributed to the partition each event was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionOrderStats {
    /// Purchase events carrying a transaction id
    pub purchase_events: u64,
    pub duplicate_events: u64,
    pub unresolved_orders: u64,
    pub orders: u64,
}

/// Counts from one order build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderStats {
    /// All purchase-type canonical events
    pub purchase_events: u64,
    /// Purchase events with no recoverable transaction id
    pub incomplete_purchases: u64,
    /// Purchase events discarded as duplicates of a later event
    pub duplicate_events: u64,
    pub duplicate_revenue: f64,
    pub transactions_with_duplicates: u64,
    /// Transactions whose authoritative event has no session
    pub unresolved_orders: u64,
    pub unresolved_revenue: f64,
    pub orders: u64,
    pub partitions: BTreeMap<String, PartitionOrderStats>,
}

impl OrderStats {
    fn partition(&mut self, name: &str) -> &mut PartitionOrderStats {
        self.partitions.entry(name.to_string()).or_default()
    }
}

/// Orders sorted by `transaction_id`, plus counts.
#[derive(Debug, Clone, Default)]
pub struct OrderOutcome {
    pub orders: Vec<Order>,
    pub stats: OrderStats,
}

/// Materializes one order per unique transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderBuilder;

impl OrderBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds orders from the session-tagged event stream.
    ///
    /// Transactions span clients and partitions, so this stage runs over the
    /// whole stream rather than per shard.
    pub fn build(&self, events: &[CanonicalEvent]) -> OrderOutcome {
        let mut stats = OrderStats::default();
        let mut by_transaction: BTreeMap<&str, Vec<&CanonicalEvent>> = BTreeMap::new();

        for event in events.iter().filter(|e| e.event_type.is_purchase()) {
            stats.purchase_events += 1;
            match event.transaction_id.as_deref() {
                Some(tx) => {
                    stats.partition(&event.partition).purchase_events += 1;
                    by_transaction.entry(tx).or_default().push(event);
                }
                None => stats.incomplete_purchases += 1,
            }
        }

        let mut orders = Vec::with_capacity(by_transaction.len());
        for (transaction_id, group) in by_transaction {
            let Some(latest) = group
                .iter()
                .copied()
                .max_by(|a, b| a.ts.cmp(&b.ts).then(a.event_id.cmp(&b.event_id)))
            else {
                continue;
            };

            let duplicates = group.len() as u64 - 1;
            if duplicates > 0 {
                stats.transactions_with_duplicates += 1;
                for dup in group.iter().filter(|e| e.event_id != latest.event_id) {
                    stats.duplicate_events += 1;
                    stats.duplicate_revenue += dup.revenue.unwrap_or(0.0);
                    stats.partition(&dup.partition).duplicate_events += 1;
                }
                debug!(transaction_id, duplicates, kept_event_id = latest.event_id, "Resolved duplicate transaction");
            }

            let Some(session_id) = latest.session_id.clone() else {
                stats.unresolved_orders += 1;
                stats.unresolved_revenue += latest.revenue.unwrap_or(0.0);
                stats.partition(&latest.partition).unresolved_orders += 1;
                continue;
            };

            stats.orders += 1;
            stats.partition(&latest.partition).orders += 1;
            orders.push(Order {
                transaction_id: transaction_id.to_string(),
                event_id: latest.event_id,
                partition: latest.partition.clone(),
                client_id: latest.client_id.clone(),
                session_id,
                order_ts: latest.ts,
                revenue: latest.revenue,
                items_count: latest.items_count,
                duplicates_discarded: duplicates,
                marketing_source: latest.marketing_source,
                utm_source: latest.utm_source.clone(),
                utm_medium: latest.utm_medium.clone(),
                utm_campaign: latest.utm_campaign.clone(),
                ref_domain: latest.ref_domain.clone(),
                device_type: latest.device_type,
            });
        }

        OrderOutcome { orders, stats }
    }
}
