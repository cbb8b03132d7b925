//! Batch runner that drives every stage over one input set.
//!
//! A run is:
//! 1. Canonicalize raw records (parallel per record)
//! 2. Sessionize per client (parallel per shard)
//! 3. Build deduplicated orders
//! 4. Attribute orders to touchpoints (parallel per shard)
//! 5. Reconcile every artifact against the inputs
//!
//! Nothing here touches the filesystem; the caller publishes `RunOutput`.

use engine_core::{AttributionFact, CanonicalEvent, EngineConfig, LoadedInput, Order, Result, Session};
use telemetry::StageTimings;
use tracing::{info, warn};

use crate::attribution::{AttributionEngine, AttributionStats};
use crate::canonicalize::{CanonicalizeStats, Canonicalizer};
use crate::orders::{OrderBuilder, OrderStats};
use crate::reconcile::{reconcile, ReconcileInputs, ReconciliationReport};
use crate::sessionize::{SessionizeStats, Sessionizer};

/// Every artifact of one run.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Canonical events tagged with their session, sorted by `event_id`
    pub events: Vec<CanonicalEvent>,
    /// Sorted by `(client_id, session_index)`
    pub sessions: Vec<Session>,
    /// Sorted by `transaction_id`
    pub orders: Vec<Order>,
    /// Sorted by `(transaction_id, model)`
    pub facts: Vec<AttributionFact>,
    pub report: ReconciliationReport,
    pub canonicalize_stats: CanonicalizeStats,
    pub sessionize_stats: SessionizeStats,
    pub order_stats: OrderStats,
    pub attribution_stats: AttributionStats,
    pub timings: StageTimings,
}

/// Configured stage chain.
pub struct Pipeline {
    config: EngineConfig,
    canonicalizer: Canonicalizer,
    sessionizer: Sessionizer,
    orders: OrderBuilder,
    attribution: AttributionEngine,
}

impl Pipeline {
    /// Validates the config and builds every stage from it.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            canonicalizer: Canonicalizer::new(&config),
            sessionizer: Sessionizer::new(&config),
            orders: OrderBuilder::new(),
            attribution: AttributionEngine::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs all stages over the loaded records.
    ///
    /// Output depends only on the input and the config, never on shard
    /// count or thread scheduling.
    pub fn run(&self, input: LoadedInput) -> RunOutput {
        let LoadedInput { records: raw, stats: load } = input;
        let mut timings = StageTimings::new();
        info!(
            lines = load.lines,
            records = raw.len(),
            session_timeout_secs = self.config.session_timeout_secs,
            lookback_days = self.config.lookback_days,
            "Pipeline run starting"
        );

        let canonical = timings.time("canonicalize", || self.canonicalizer.canonicalize_all(&raw));
        info!(
            events = canonical.stats.events,
            unresolved_identity = canonical.stats.unresolved_identity,
            unparseable_timestamp = canonical.stats.unparseable_timestamp,
            malformed_payloads = canonical.stats.malformed_payloads,
            "Canonicalized records"
        );
        let canonicalize_stats = canonical.stats;

        let sessionized = timings.time("sessionize", || self.sessionizer.sessionize(canonical.events));
        info!(
            clients = sessionized.stats.clients,
            sessions = sessionized.stats.sessions,
            single_event_sessions = sessionized.stats.single_event_sessions,
            "Sessionized events"
        );

        let orders = timings.time("orders", || self.orders.build(&sessionized.events));
        info!(
            orders = orders.stats.orders,
            duplicate_events = orders.stats.duplicate_events,
            incomplete_purchases = orders.stats.incomplete_purchases,
            unresolved_orders = orders.stats.unresolved_orders,
            "Built orders"
        );

        let attribution = timings.time("attribution", || {
            self.attribution.attribute(&orders.orders, &sessionized.sessions)
        });
        info!(
            facts = attribution.stats.facts,
            direct_fallbacks = attribution.stats.direct_fallbacks,
            multi_touch_orders = attribution.stats.multi_touch_orders,
            "Attributed orders"
        );

        let report = timings.time("reconcile", || {
            reconcile(&ReconcileInputs {
                load: &load,
                raw: &raw,
                canonicalize: &canonicalize_stats,
                events: &sessionized.events,
                sessions: &sessionized.sessions,
                orders: &orders.orders,
                order_stats: &orders.stats,
                facts: &attribution.facts,
            })
        });
        for warning in report.warnings() {
            warn!(warning = %warning, "Reconciliation check failed");
        }

        info!(
            total_ms = timings.total_ms(),
            slowest = timings.slowest().map(|s| s.stage).unwrap_or("none"),
            consistent = report.is_consistent(),
            "Pipeline run complete"
        );

        RunOutput {
            events: sessionized.events,
            sessions: sessionized.sessions,
            orders: orders.orders,
            facts: attribution.facts,
            report,
            canonicalize_stats,
            sessionize_stats: sessionized.stats,
            order_stats: orders.stats,
            attribution_stats: attribution.stats,
            timings,
        }
    }
}
