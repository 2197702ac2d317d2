//! Record/replay HTTP harness and lifecycle assertions for GCP provider
//! acceptance tests.
//!
//! A test creates a [`RunContext`] from [`HarnessConfig`], hands it to a
//! [`Provider`] through the lifecycle [`Driver`], and finishes it with the
//! outcome. Depending on `VCR_MODE` every API call is recorded to a
//! cassette, replayed from one, or sent live.

pub mod config;
pub mod context;
pub mod error;
pub mod gcp;
pub mod lifecycle;
pub mod resource;
pub mod vcr;

pub use config::{HarnessConfig, ProviderConfig};
pub use context::{RunContext, RunContextBuilder};
pub use error::{ApiError, Error, Result};
pub use lifecycle::{run_test, Check, Driver, Phase, Provider, TestCase, TestReport, TestStep};
pub use resource::{PredicateRegistry, ResourceAddress, ResourceInstance, State};
pub use vcr::RunMode;

/// Install a `RUST_LOG`-driven subscriber that writes through the test
/// harness's captured output. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}
