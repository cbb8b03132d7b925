//! First-click and last-click attribution over a trailing lookback window.

use std::collections::BTreeMap;

use chrono::Duration;
use engine_core::{AttributionFact, AttributionModel, EngineConfig, Order, Session, DIRECT_SOURCE};
use serde::Serialize;

use crate::shard::{effective_shards, run_sharded};

/// Counts from one attribution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributionStats {
    pub orders: u64,
    pub facts: u64,
    /// Orders with no qualifying touchpoint (both models fall back to direct)
    pub direct_fallbacks: u64,
    /// Orders whose first-click and last-click sessions differ
    pub multi_touch_orders: u64,
}

impl AttributionStats {
    pub fn merge(mut self, other: &Self) -> Self {
        self.orders += other.orders;
        self.facts += other.facts;
        self.direct_fallbacks += other.direct_fallbacks;
        self.multi_touch_orders += other.multi_touch_orders;
        self
    }
}

/// Facts sorted by `(transaction_id, model)`, plus counts.
#[derive(Debug, Clone, Default)]
pub struct AttributionOutcome {
    pub facts: Vec<AttributionFact>,
    pub stats: AttributionStats,
}

/// Assigns each order to the sessions that earned credit under each model.
///
/// Read-only over orders and sessions.
#[derive(Debug, Clone)]
pub struct AttributionEngine {
    lookback: Duration,
    non_touchpoint_sources: Vec<String>,
    shards: usize,
}

impl AttributionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            lookback: config.lookback(),
            non_touchpoint_sources: config.non_touchpoint_sources.clone(),
            shards: effective_shards(config.shards),
        }
    }

    pub fn with_lookback(lookback: Duration, non_touchpoint_sources: Vec<String>) -> Self {
        Self {
            lookback,
            non_touchpoint_sources,
            shards: 1,
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    pub fn attribute(&self, orders: &[Order], sessions: &[Session]) -> AttributionOutcome {
        let mut groups: BTreeMap<String, (Vec<&Order>, Vec<&Session>)> = BTreeMap::new();
        for order in orders {
            groups.entry(order.client_id.clone()).or_default().0.push(order);
        }
        for session in sessions {
            if !session.is_touchpoint(&self.non_touchpoint_sources) {
                continue;
            }
            // Clients without orders never need their touchpoints
            if let Some(group) = groups.get_mut(&session.client_id) {
                group.1.push(session);
            }
        }

        let per_client = run_sharded(groups, self.shards, |_, (orders, touchpoints)| {
            let mut facts = Vec::with_capacity(orders.len() * 2);
            let mut stats = AttributionStats::default();
            for order in orders {
                let (first, last) = self.select_touchpoints(order, &touchpoints);
                stats.orders += 1;
                match (first, last) {
                    (Some(f), Some(l)) if f.session_id != l.session_id => stats.multi_touch_orders += 1,
                    (None, _) | (_, None) => stats.direct_fallbacks += 1,
                    _ => {}
                }
                facts.push(build_fact(order, AttributionModel::FirstClick, first));
                facts.push(build_fact(order, AttributionModel::LastClick, last));
                stats.facts += 2;
            }
            (facts, stats)
        });

        let mut outcome = AttributionOutcome::default();
        for (facts, stats) in per_client {
            outcome.facts.extend(facts);
            outcome.stats = outcome.stats.merge(&stats);
        }
        outcome
            .facts
            .sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id).then(a.model.cmp(&b.model)));
        outcome
    }

    /// Picks the first-click and last-click touchpoints for one order.
    ///
    /// Candidates start within `[order_ts - lookback, order_ts]`, both ends
    /// inclusive. A window reaching past the earliest representable instant is
    /// open at the start. Co-timestamped candidates resolve to the greater
    /// session index.
    pub fn select_touchpoints<'a>(
        &self,
        order: &Order,
        touchpoints: &[&'a Session],
    ) -> (Option<&'a Session>, Option<&'a Session>) {
        let window_start = order.order_ts.checked_sub_signed(self.lookback);
        let candidates: Vec<&'a Session> = touchpoints
            .iter()
            .copied()
            .filter(|s| {
                s.client_id == order.client_id
                    && window_start.map_or(true, |start| s.session_start >= start)
                    && s.session_start <= order.order_ts
                    && s.is_touchpoint(&self.non_touchpoint_sources)
            })
            .collect();

        let first = candidates.iter().copied().min_by(|a, b| {
            a.session_start
                .cmp(&b.session_start)
                .then(b.session_index.cmp(&a.session_index))
        });
        let last = candidates.iter().copied().max_by(|a, b| {
            a.session_start
                .cmp(&b.session_start)
                .then(a.session_index.cmp(&b.session_index))
        });
        (first, last)
    }
}

fn build_fact(order: &Order, model: AttributionModel, session: Option<&Session>) -> AttributionFact {
    AttributionFact {
        transaction_id: order.transaction_id.clone(),
        model,
        client_id: order.client_id.clone(),
        order_ts: order.order_ts,
        revenue: order.revenue,
        attributed_source: session
            .map(|s| s.marketing_source.as_str())
            .unwrap_or(DIRECT_SOURCE)
            .to_string(),
        attributed_session_id: session.map(|s| s.session_id.clone()),
        touchpoint_start: session.map(|s| s.session_start),
        utm_source: session.and_then(|s| s.utm_source.clone()),
        utm_medium: session.and_then(|s| s.utm_medium.clone()),
        utm_campaign: session.and_then(|s| s.utm_campaign.clone()),
        ref_domain: session.and_then(|s| s.ref_domain.clone()),
    }
}
