//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (Prometheus recorder + JSON snapshot)
//!
//! Consumers:
//!     → log aggregation (stdout)
//!     → GET /metrics (Prometheus scrape or JSON summary)
//! ```

pub mod logging;
pub mod metrics;
