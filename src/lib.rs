//! # para
//!
//! Fan-out/fan-in worker pool for batch jobs over in-memory items.
//!
//! [`map`] queues every item, starts a pool of workers that each run a
//! [`Process`] routine, and hands back a [`MapStream`] that yields the
//! emitted values as they arrive. Worker logs are funnelled through a
//! single consolidator so concurrent workers never garble the log.
//!
//! ```no_run
//! # async fn run() -> para::Result<()> {
//! let files = vec!["dump.xml", "dump2.xml"];
//! let mut values = para::map(
//!     |path: &'static str| vec![Ok::<_, String>(format!("{path}-line1"))],
//!     files,
//!     Some(2),
//! )?;
//! while let Some(value) = values.next().await {
//!     println!("{}", value?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod model;
pub mod process;
pub mod queue;
pub mod scan;
pub mod telemetry;

pub use engine::{MapStream, map, map_with};
pub use error::{BoxError, Error, Result};
pub use process::Process;
