//! Push-based observability
//!
//! Metrics are only ever written out, as `METRICS_JSON:` lines on stdout.
//! Nothing listens for incoming requests.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
