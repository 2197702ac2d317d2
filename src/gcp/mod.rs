//! GCP API interaction module
//!
//! Everything needed to talk to Google REST APIs from a test: credentials,
//! the transport abstraction the cassette layer plugs into, and the REST
//! client that predicates and providers call.
//!
//! # Module Structure
//!
//! - [`auth`] - Token sources and gcloud configuration defaults
//! - [`http`] - Request/response values and the live reqwest transport
//! - [`client`] - REST client with retries and typed API errors
//! - [`json`] - Fallible accessors over decoded responses
//! - [`retry`] - Backoff policy for transient failures
//!
//! # Example
//!
//! ```ignore
//! use gcpvcr::gcp::client::RestClient;
//!
//! async fn example(client: &RestClient) -> gcpvcr::Result<()> {
//!     let url = "https://compute.googleapis.com/compute/v1/projects/p/global/backendBuckets/b";
//!     let bucket = client.send("GET", "", url, "gcpvcr/0.1.0", None).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod json;
pub mod retry;
