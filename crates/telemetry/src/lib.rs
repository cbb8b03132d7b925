//! Logging and timing for the transformation engine.
//!
//! Stage timings are owned by each run and only ever logged; they never
//! reach the output artifacts, so reruns stay byte-identical.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
