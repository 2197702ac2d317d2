//! Resource abstraction layer
//!
//! Tracks what a test has created and decides whether it still exists
//! remotely, without per-resource code for resource types that fit the
//! generic predicates.
//!
//! # Architecture
//!
//! - [`state`] - State Store: resource addresses and their attributes
//! - [`resolver`] - Expands URL templates against state and provider config
//! - [`predicate`] - Existence predicates (REST GET, named entry in a parent)
//! - [`registry`] - Predicates keyed by resource type, loaded from embedded JSON
//!
//! # Predicate Definitions
//!
//! Built-in predicates are defined in `src/resources/predicates.json`.
//!
//! # Example
//!
//! ```ignore
//! use gcpvcr::resource::PredicateRegistry;
//!
//! async fn still_there(ctx: &gcpvcr::RunContext, state: &gcpvcr::State) -> gcpvcr::Result<bool> {
//!     let registry = PredicateRegistry::builtin()?;
//!     let predicate = registry.get("google_storage_bucket").unwrap();
//!     predicate.exists(ctx, state).await
//! }
//! ```

pub mod predicate;
pub mod registry;
pub mod resolver;
pub mod state;

pub use predicate::{EntryLookup, ExistencePredicate, NamedEntryPredicate, RestGetPredicate};
pub use registry::{PredicateDef, PredicateRegistry};
pub use resolver::{expand_config, resolve, ResolveContext};
pub use state::{ResourceAddress, ResourceInstance, ResourceMode, State};
