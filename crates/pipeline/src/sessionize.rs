//! Sessionization by inactivity gap.
//!
//! Each client's events are ordered by `(ts, event_id)` and cut wherever the
//! gap to the previous event strictly exceeds the timeout. A gap equal to the
//! timeout stays in the same session.

use chrono::{DateTime, Duration, Utc};
use engine_core::{session_id_for, CanonicalEvent, EngineConfig, Session};
use serde::Serialize;
use tracing::debug;

use crate::shard::{effective_shards, group_by_client, run_sharded};

/// Counts from one sessionization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionizeStats {
    pub events_in: u64,
    pub events_sessionized: u64,
    pub sessions: u64,
    pub single_event_sessions: u64,
    pub clients: u64,
}

impl SessionizeStats {
    pub fn merge(mut self, other: &Self) -> Self {
        self.events_in += other.events_in;
        self.events_sessionized += other.events_sessionized;
        self.sessions += other.sessions;
        self.single_event_sessions += other.single_event_sessions;
        self.clients += other.clients;
        self
    }

    fn for_client(events: &[CanonicalEvent], sessions: &[Session]) -> Self {
        Self {
            events_in: events.len() as u64,
            events_sessionized: events.iter().filter(|e| e.session_id.is_some()).count() as u64,
            sessions: sessions.len() as u64,
            single_event_sessions: sessions.iter().filter(|s| s.events == 1).count() as u64,
            clients: 1,
        }
    }
}

/// Session-tagged events, sessions, and counts.
#[derive(Debug, Clone, Default)]
pub struct SessionizeOutcome {
    /// Enriched stream: every input event with its `session_id`, ordered by `event_id`
    pub events: Vec<CanonicalEvent>,
    /// Ordered by `(client_id, session_index)`
    pub sessions: Vec<Session>,
    pub stats: SessionizeStats,
}

/// Positions in a time-ordered sequence where a new session starts.
pub fn session_boundaries(timestamps: &[DateTime<Utc>], timeout: Duration) -> Vec<usize> {
    if timestamps.is_empty() {
        return Vec::new();
    }
    std::iter::once(0)
        .chain(
            timestamps
                .windows(2)
                .enumerate()
                .filter(|(_, pair)| pair[1] - pair[0] > timeout)
                .map(|(i, _)| i + 1),
        )
        .collect()
}

/// Splits one client's events into sessions.
///
/// Returns the events in `(ts, event_id)` order with `session_id` set, plus
/// the sessions in index order.
pub fn sessionize_client(
    client_id: &str,
    mut events: Vec<CanonicalEvent>,
    timeout: Duration,
) -> (Vec<CanonicalEvent>, Vec<Session>) {
    events.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.event_id.cmp(&b.event_id)));

    let timestamps: Vec<DateTime<Utc>> = events.iter().map(|e| e.ts).collect();
    let starts = session_boundaries(&timestamps, timeout);

    let mut sessions = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(events.len());
        let index = (i + 1) as u32;
        let session = build_session(client_id, index, &events[start..end]);
        for event in &mut events[start..end] {
            event.session_id = Some(session.session_id.clone());
        }
        sessions.push(session);
    }

    (events, sessions)
}

/// Aggregates one session; landing context comes from the first event only.
fn build_session(client_id: &str, session_index: u32, events: &[CanonicalEvent]) -> Session {
    let first = &events[0];
    let last = &events[events.len() - 1];

    let mut session = Session {
        session_id: session_id_for(client_id, session_index),
        client_id: client_id.to_string(),
        session_index,
        session_start: first.ts,
        session_end: last.ts,
        duration_secs: (last.ts - first.ts).num_seconds(),
        events: 0,
        pageviews: 0,
        add_to_cart: 0,
        checkout_started: 0,
        purchases: 0,
        landing_page_url: first.page_url.clone(),
        ref_domain: first.ref_domain.clone(),
        marketing_source: first.marketing_source,
        utm_source: first.utm_source.clone(),
        utm_medium: first.utm_medium.clone(),
        utm_campaign: first.utm_campaign.clone(),
        device_type: first.device_type,
    };
    for event in events {
        session.count_event(event.event_type);
    }
    session
}

/// Groups canonical events into sessions, clients processed on parallel shards.
#[derive(Debug, Clone)]
pub struct Sessionizer {
    timeout: Duration,
    shards: usize,
}

impl Sessionizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            timeout: config.session_timeout(),
            shards: effective_shards(config.shards),
        }
    }

    pub fn with_timeout(timeout: Duration, shards: usize) -> Self {
        Self {
            timeout,
            shards: shards.max(1),
        }
    }

    pub fn sessionize(&self, events: Vec<CanonicalEvent>) -> SessionizeOutcome {
        let groups = group_by_client(events, |e| e.client_id.as_str());
        debug!(clients = groups.len(), shards = self.shards, "Sessionizing clients");

        let timeout = self.timeout;
        let per_client = run_sharded(groups, self.shards, |client, events| {
            let (events, sessions) = sessionize_client(&client, events, timeout);
            let stats = SessionizeStats::for_client(&events, &sessions);
            (events, sessions, stats)
        });

        let mut outcome = SessionizeOutcome::default();
        for (events, sessions, stats) in per_client {
            outcome.events.extend(events);
            outcome.sessions.extend(sessions);
            outcome.stats = outcome.stats.merge(&stats);
        }

        outcome.events.sort_by_key(|e| e.event_id);
        outcome
            .sessions
            .sort_by(|a, b| a.client_id.cmp(&b.client_id).then(a.session_index.cmp(&b.session_index)));
        outcome
    }
}
