//! Worker pool engine: the orchestrator and its workers.

pub mod map;
mod worker;

pub use map::{MapStream, map, map_with};
