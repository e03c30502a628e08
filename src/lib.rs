//! Coupler-log performance baselines.
//!
//! Locate the latest coupler log of a run, extract throughput and memory
//! usage from it, and compare them against (or record them as) baseline
//! values stored under a baseline directory.

pub mod baseline;
pub mod compare;
pub mod config;
pub mod extract;
pub mod fs;
pub mod locate;

pub use baseline::{BaselineError, MetricKind};
pub use compare::{compare_memory, compare_throughput, record_baselines, ComparisonResult};
pub use config::{Case, CaseConfig, ConfigError};
pub use fs::{FileSystem, MemFs, OsFs};
