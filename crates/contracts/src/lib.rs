//! # Contracts
//!
//! Shared interface contracts between the flushline crates.
//! Business crates depend on this crate only, never the other way around.
//!
//! ## Data model
//! - [`Record`]: an opaque, non-empty unit of caller data
//! - [`Sink`]: the bulk-ingestion target the engine delivers batches to
//! - [`StreamerConfig`]: the on-disk configuration surface

mod config;
mod error;
mod record;
mod sink;

pub use config::*;
pub use error::*;
pub use record::Record;
pub use sink::*;
