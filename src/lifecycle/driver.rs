//! Lifecycle Driver
//!
//! Runs a [`TestCase`] step by step against the provider:
//!
//! ```text
//! Init -> Applied -> Verified / ImportVerified -> Destroyed -> CheckedDestroyed
//! ```
//!
//! The first failing step stops the remaining ones, but teardown always
//! runs on the last known state. The destroy check uses the state as it
//! was just before teardown, so every instance a predicate looks at was
//! in the store when it ran.

use super::import_verify::verify_import;
use super::provider::Provider;
use super::step::{Check, TestCase, TestStep};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::resource::{expand_config, PredicateRegistry, ResourceAddress, State};
use std::fmt;

/// How far a test got
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Applied,
    Verified,
    ImportVerified,
    Destroyed,
    CheckedDestroyed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Applied => "applied",
            Phase::Verified => "verified",
            Phase::ImportVerified => "import-verified",
            Phase::Destroyed => "destroyed",
            Phase::CheckedDestroyed => "checked-destroyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed,
    Failed(String),
    /// Not run because an earlier step failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub kind: &'static str,
    pub outcome: StepOutcome,
}

/// Result of one test run
#[derive(Debug)]
pub struct TestReport {
    pub name: String,
    pub phase: Phase,
    pub steps: Vec<StepReport>,
    /// First failure of the run
    pub error: Option<Error>,
    /// Teardown failure that happened after an earlier error
    pub teardown_error: Option<String>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Drives test cases for one [`RunContext`]
pub struct Driver<'a> {
    ctx: &'a RunContext,
    provider: &'a dyn Provider,
    predicates: PredicateRegistry,
}

impl<'a> Driver<'a> {
    /// Driver using the built-in predicate table
    pub fn new(ctx: &'a RunContext, provider: &'a dyn Provider) -> Result<Self> {
        Ok(Self::with_predicates(ctx, provider, PredicateRegistry::builtin()?))
    }

    pub fn with_predicates(
        ctx: &'a RunContext,
        provider: &'a dyn Provider,
        predicates: PredicateRegistry,
    ) -> Self {
        Self {
            ctx,
            provider,
            predicates,
        }
    }

    fn advance(&self, case: &TestCase, phase: &mut Phase, next: Phase) {
        tracing::info!("{}: {} -> {}", case.name, phase, next);
        *phase = next;
    }

    /// Run every step, then teardown and the destroy check
    pub async fn run(&self, case: &TestCase) -> TestReport {
        let mut state = State::new();
        let mut phase = Phase::Init;
        let mut steps = Vec::with_capacity(case.steps.len());
        let mut failure: Option<Error> = None;

        for (index, step) in case.steps.iter().enumerate() {
            if failure.is_some() {
                steps.push(StepReport {
                    index,
                    kind: step.kind(),
                    outcome: StepOutcome::Skipped,
                });
                continue;
            }

            match self.run_step(case, step, &mut state).await {
                Ok(next) => {
                    self.advance(case, &mut phase, next);
                    steps.push(StepReport {
                        index,
                        kind: step.kind(),
                        outcome: StepOutcome::Passed,
                    });
                }
                Err(e) => {
                    tracing::error!("{}: step {} ({}) failed: {}", case.name, index, step.kind(), e);
                    steps.push(StepReport {
                        index,
                        kind: step.kind(),
                        outcome: StepOutcome::Failed(e.to_string()),
                    });
                    failure = Some(e);
                }
            }
        }

        let snapshot = state;
        let mut teardown_error = None;

        if snapshot.managed().next().is_some() {
            match self.provider.destroy(self.ctx, &snapshot).await {
                Ok(()) => {
                    if failure.is_none() {
                        self.advance(case, &mut phase, Phase::Destroyed);
                    }
                }
                Err(cause) => {
                    let e = Error::provider("destroy", cause);
                    if failure.is_none() {
                        tracing::error!("{}: teardown failed: {}", case.name, e);
                        failure = Some(e);
                    } else {
                        tracing::warn!("{}: best-effort teardown failed: {}", case.name, e);
                        teardown_error = Some(e.to_string());
                    }
                }
            }
        } else if failure.is_none() {
            self.advance(case, &mut phase, Phase::Destroyed);
        }

        if failure.is_none() && case.check_destroy {
            match self.check_destroyed(&snapshot).await {
                Ok(()) => self.advance(case, &mut phase, Phase::CheckedDestroyed),
                Err(e) => {
                    tracing::error!("{}: destroy check failed: {}", case.name, e);
                    failure = Some(e);
                }
            }
        }

        TestReport {
            name: case.name.clone(),
            phase,
            steps,
            error: failure,
            teardown_error,
        }
    }

    async fn run_step(&self, case: &TestCase, step: &TestStep, state: &mut State) -> Result<Phase> {
        match step {
            TestStep::Apply { config, checks } => {
                let config = expand_config(config, &case.vars)?;
                let applied = self
                    .provider
                    .apply(self.ctx, &config, state)
                    .await
                    .map_err(|cause| Error::provider("apply", cause))?;
                *state = applied;
                tracing::debug!("{}: applied, {} resources in state", case.name, state.len());

                for check in checks {
                    self.run_check(check, state).await?;
                }
                Ok(if checks.is_empty() {
                    Phase::Applied
                } else {
                    Phase::Verified
                })
            }
            TestStep::Import {
                resource_name,
                import_id,
                verify,
                ignore,
            } => {
                let address: ResourceAddress = resource_name.parse()?;
                let applied = state.get(&address).ok_or_else(|| Error::LifecycleAssertion {
                    resource: resource_name.clone(),
                    expected: "resource in state before import".to_string(),
                    actual: "not in state".to_string(),
                })?;
                let id = import_id
                    .clone()
                    .or_else(|| applied.id())
                    .ok_or_else(|| Error::LifecycleAssertion {
                        resource: resource_name.clone(),
                        expected: "an import id".to_string(),
                        actual: "no id attribute in state".to_string(),
                    })?;

                let imported = self
                    .provider
                    .import(self.ctx, &address, &id)
                    .await
                    .map_err(|cause| Error::provider("import", cause))?;

                if *verify {
                    verify_import(resource_name, applied, &imported, ignore)?;
                }
                Ok(Phase::ImportVerified)
            }
        }
    }

    async fn run_check(&self, check: &Check, state: &State) -> Result<()> {
        match check {
            Check::Exists(resource_type) => {
                let predicate = self.predicates.get(resource_type).ok_or_else(|| {
                    Error::Config(format!("no existence predicate registered for {resource_type}"))
                })?;
                if state.instances_of(resource_type).next().is_none() {
                    return Err(Error::LifecycleAssertion {
                        resource: resource_type.clone(),
                        expected: "an instance in state".to_string(),
                        actual: "none".to_string(),
                    });
                }
                if !predicate.exists(self.ctx, state).await? {
                    return Err(Error::LifecycleAssertion {
                        resource: resource_type.clone(),
                        expected: "resource to have been created".to_string(),
                        actual: "not found".to_string(),
                    });
                }
                Ok(())
            }
            Check::Attribute {
                address,
                key,
                expected,
            } => {
                let actual = self.attribute(state, address, key)?;
                if actual.as_deref() != Some(expected.as_str()) {
                    return Err(Error::LifecycleAssertion {
                        resource: format!("{address}.{key}"),
                        expected: format!("{expected:?}"),
                        actual: actual.map_or_else(|| "<unset>".to_string(), |v| format!("{v:?}")),
                    });
                }
                Ok(())
            }
            Check::AttributeSet { address, key } => {
                if self.attribute(state, address, key)?.is_none() {
                    return Err(Error::LifecycleAssertion {
                        resource: format!("{address}.{key}"),
                        expected: "a value".to_string(),
                        actual: "<unset>".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn attribute(&self, state: &State, address: &str, key: &str) -> Result<Option<String>> {
        let parsed: ResourceAddress = address.parse()?;
        let instance = state.get(&parsed).ok_or_else(|| Error::LifecycleAssertion {
            resource: address.to_string(),
            expected: "resource in state".to_string(),
            actual: "not in state".to_string(),
        })?;
        Ok(instance.string_attribute(key))
    }

    /// Fail if any predicate-backed resource in `snapshot` still exists.
    /// Resource types without a predicate are not verified.
    pub async fn check_destroyed(&self, snapshot: &State) -> Result<()> {
        for resource_type in snapshot.resource_types() {
            let Some(predicate) = self.predicates.get(resource_type) else {
                tracing::debug!("No predicate for {}, destroy not verified", resource_type);
                continue;
            };
            if predicate.exists(self.ctx, snapshot).await? {
                return Err(Error::LifecycleAssertion {
                    resource: resource_type.to_string(),
                    expected: "destroyed".to_string(),
                    actual: "resource still exists".to_string(),
                });
            }
        }
        Ok(())
    }
}
