//! Core types, configuration, and errors for the event transformation engine.

pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod order;
pub mod session;

pub use config::*;
pub use error::{Error, InputErrorCode, OutputErrorCode, Result};
pub use events::*;
pub use input::{LoadStats, LoadedInput, PartitionLoad};
pub use order::*;
pub use session::*;
