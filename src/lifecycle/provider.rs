//! Provider collaborator
//!
//! The provider turns configuration text into API calls. The harness only
//! drives it: apply a configuration, import a resource by id, destroy what
//! the state holds. Implementations make their HTTP calls through the
//! [`RunContext`] so they are recorded and replayed with everything else.

use crate::context::RunContext;
use crate::resource::{ResourceAddress, ResourceInstance, State};
use async_trait::async_trait;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Apply `config` on top of `prior` and return the resulting state
    async fn apply(&self, ctx: &RunContext, config: &str, prior: &State) -> anyhow::Result<State>;

    /// Read a resource from the API by import id, independent of state
    async fn import(
        &self,
        ctx: &RunContext,
        address: &ResourceAddress,
        id: &str,
    ) -> anyhow::Result<ResourceInstance>;

    /// Delete every managed resource in `state`
    async fn destroy(&self, ctx: &RunContext, state: &State) -> anyhow::Result<()>;
}
