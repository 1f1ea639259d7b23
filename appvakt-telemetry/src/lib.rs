//! ## appvakt-telemetry
//! **Structured logging and operation counters**
//!
//! ### Components:
//! - `logging/`: tracing subscriber setup and audit events
//! - `metrics/`: Prometheus counters for rule mutations and reconcile passes

pub mod logging;
pub mod metrics;
