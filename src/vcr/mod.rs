//! Record/replay of HTTP interactions
//!
//! - [`cassette`] - On-disk format: one ordered YAML file per test
//! - [`signature`] - Request normalization used to match replays
//! - [`redact`] - Secret scrubbing applied before anything is stored
//! - [`transport`] - The [`Transport`](crate::gcp::http::Transport) that records or replays
//! - [`random`] - Seeded random names so replays issue identical requests

pub mod cassette;
pub mod random;
pub mod redact;
pub mod signature;
pub mod transport;

pub use cassette::{Cassette, Interaction, RecordedLocation, RecordedRequest, RecordedResponse};
pub use signature::RequestSignature;
pub use transport::CassetteTransport;

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a test run treats the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Call the API and write every interaction to a fresh cassette
    Record,
    /// Serve every request from an existing cassette; never touch the network
    Replay,
    /// Call the API, store nothing
    #[default]
    Live,
}

impl RunMode {
    pub fn uses_cassette(self) -> bool {
        matches!(self, RunMode::Record | RunMode::Replay)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Record => "record",
            RunMode::Replay => "replay",
            RunMode::Live => "live",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" | "recording" => Ok(RunMode::Record),
            "replay" | "replaying" => Ok(RunMode::Replay),
            "live" | "" => Ok(RunMode::Live),
            other => Err(Error::Config(format!(
                "unknown VCR_MODE {other:?} (expected RECORDING, REPLAYING or live)"
            ))),
        }
    }
}
