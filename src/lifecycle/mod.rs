//! Declarative apply / import / destroy lifecycle
//!
//! - [`step`] - Test cases, steps and checks
//! - [`provider`] - The provider collaborator the driver calls
//! - [`driver`] - Phase state machine with best-effort teardown
//! - [`import_verify`] - Attribute flattening and diff for import steps

pub mod driver;
pub mod import_verify;
pub mod provider;
pub mod step;

pub use driver::{Driver, Phase, StepOutcome, StepReport, TestReport};
pub use provider::Provider;
pub use step::{Check, TestCase, TestStep};

use crate::context::RunContext;
use crate::error::Result;
use crate::resource::PredicateRegistry;

/// Build a case from the context, run it with the built-in predicates and
/// finish the context with the outcome.
///
/// The returned report carries the test failure, if any; `Err` is reserved
/// for harness problems (bad predicate table, cassette write failure).
pub async fn run_test<F>(ctx: RunContext, provider: &dyn Provider, build: F) -> Result<TestReport>
where
    F: FnOnce(&RunContext) -> TestCase,
{
    run_test_with(ctx, provider, PredicateRegistry::builtin()?, build).await
}

/// [`run_test`] with a custom predicate registry
pub async fn run_test_with<F>(
    ctx: RunContext,
    provider: &dyn Provider,
    predicates: PredicateRegistry,
    build: F,
) -> Result<TestReport>
where
    F: FnOnce(&RunContext) -> TestCase,
{
    let case = build(&ctx);
    let report = Driver::with_predicates(&ctx, provider, predicates)
        .run(&case)
        .await;
    ctx.finish(report.passed()).await?;
    Ok(report)
}
