//! Transformation stages for the event engine.
//!
//! Raw records flow through canonicalization, sessionization, order
//! deduplication and attribution, then get reconciled. `Pipeline` chains
//! the stages; each stage is also usable on its own.

pub mod attribution;
pub mod canonicalize;
pub mod enrichment;
pub mod orders;
pub mod reconcile;
pub mod runner;
pub mod sessionize;
pub mod shard;

pub use attribution::{AttributionEngine, AttributionOutcome, AttributionStats};
pub use canonicalize::{CanonicalizeOutcome, CanonicalizeStats, Canonicalizer, Rejection};
pub use enrichment::{DeviceClassifier, SourceClassifier};
pub use orders::{OrderBuilder, OrderOutcome, OrderStats, PartitionOrderStats};
pub use reconcile::{reconcile, PartitionReconciliation, ReconcileInputs, ReconciliationReport};
pub use runner::{Pipeline, RunOutput};
pub use sessionize::{SessionizeOutcome, SessionizeStats, Sessionizer};
