//! chainpulse - time-windowed rollups over per-chain event logs
//!
//! ```text
//! Event Log → Aggregator → Rollup Store → Window Query Engine → caller
//!     └──────────────→ Chain Pair Aggregator ─────────────────→ caller
//! ```

pub mod aggregator;
pub mod backoff;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event_log;
pub mod query;
pub mod registry;
pub mod rollup;
pub mod scheduler;
pub mod service;
pub mod sqlite_pragma;
pub mod types;

pub use aggregator::{AdvanceReport, Aggregator, LogAlert, OperatorAlert};
pub use catalog::{ChainCatalog, ChainHandle};
pub use config::EngineConfig;
pub use error::CoreError;
pub use registry::{ChainRegistry, StaticChainRegistry};
pub use service::AnalyticsService;
