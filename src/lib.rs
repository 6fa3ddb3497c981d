//! Wearlog Engine - Wear/non-wear interval reconstruction from hand-logged events
//!
//! The engine turns sparse, partially missing per-day equipment logs
//! (start, up to two removal/re-application pairs, end) into continuous
//! wear intervals and their non-wear complement through a deterministic
//! pipeline: normalization → per-day rule evaluation → cross-day merging
//! → complement against the observation window.
//!
//! ## Modules
//!
//! - **Engine**: `normalizer`, `builder`, `merger`, `complement`
//! - **Loaders**: JSON and CSV wear logs with an explicit column schema
//! - **Reporting**: per-subject outcomes with diagnostics, batch report encoding

pub mod adapters;
pub mod audit;
pub mod builder;
pub mod complement;
pub mod config;
pub mod encoder;
pub mod error;
pub mod merger;
pub mod normalizer;
pub mod pipeline;
pub mod types;

pub use adapters::{ColumnSchema, CsvAdapter, JsonAdapter, RecordSource, SubjectInput, WindowRecord};
pub use builder::{IntervalBuilder, RulePolicy};
pub use complement::ComplementComputer;
pub use config::EngineConfig;
pub use error::{ComputeError, MalformedTimeField, SkipReason};
pub use merger::CrossDayMerger;
pub use normalizer::TimestampNormalizer;
pub use pipeline::{reconstruct_csv, reconstruct_json, WearProcessor};

/// Engine version embedded in all reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "wearlog-engine";
