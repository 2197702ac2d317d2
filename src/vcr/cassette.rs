//! Cassette data structures for recording and replaying HTTP interactions.

use super::redact::{
    filter_headers, redact_body, redact_url, RECORDED_REQUEST_HEADERS, RECORDED_RESPONSE_HEADERS,
};
use super::signature::RequestSignature;
use crate::error::{Error, Result};
use crate::gcp::http::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The request half of an interaction, as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RecordedRequest {
    pub fn signature(&self) -> RequestSignature {
        RequestSignature::of(&self.method, &self.url, self.body.as_deref())
    }
}

/// The response half of an interaction, as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl From<&RecordedResponse> for HttpResponse {
    fn from(recorded: &RecordedResponse) -> Self {
        Self {
            status: recorded.status,
            headers: recorded
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body: recorded.body.clone(),
        }
    }
}

/// A single recorded HTTP exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    /// Position in the cassette, starting at 0
    pub seq: u64,
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

impl Interaction {
    /// Capture an exchange with secrets scrubbed and headers filtered
    pub fn capture(seq: u64, request: &HttpRequest, response: &HttpResponse) -> Self {
        Self {
            seq,
            request: RecordedRequest {
                method: request.method.clone(),
                url: redact_url(&request.url).into_owned(),
                headers: filter_headers(&request.headers, RECORDED_REQUEST_HEADERS),
                body: request
                    .body
                    .as_deref()
                    .map(|b| redact_body(b).into_owned()),
            },
            response: RecordedResponse {
                status: response.status,
                headers: filter_headers(&response.headers, RECORDED_RESPONSE_HEADERS),
                body: redact_body(&response.body).into_owned(),
            },
        }
    }
}

/// Project and location the recording ran against. Recorded URLs embed
/// them, so replay resolves templates with these instead of local settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedLocation {
    pub project: String,
    pub region: String,
    pub zone: String,
}

/// All interactions of one test, in the order they happened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cassette {
    /// Test name; also the file stem
    pub name: String,
    /// When this cassette was recorded
    pub recorded_at: DateTime<Utc>,
    /// Seed for random resource names, so replays build the same requests
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<RecordedLocation>,
    /// Ordered list of interactions
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl Cassette {
    pub fn new(name: &str, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            recorded_at: Utc::now(),
            seed,
            location: None,
            interactions: Vec::new(),
        }
    }

    /// Append an exchange, assigning the next sequence number
    pub fn record(&mut self, request: &HttpRequest, response: &HttpResponse) -> &Interaction {
        let seq = self.interactions.len() as u64;
        self.interactions
            .push(Interaction::capture(seq, request, response));
        &self.interactions[self.interactions.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Load a cassette from YAML
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Cassette {
            path: path.display().to_string(),
            message: if e.kind() == std::io::ErrorKind::NotFound {
                "no cassette recorded for this test; run it with VCR_MODE=RECORDING first"
                    .to_string()
            } else {
                e.to_string()
            },
        })?;
        let cassette: Cassette = serde_yaml::from_str(&content).map_err(|e| Error::Cassette {
            path: path.display().to_string(),
            message: format!("invalid cassette: {e}"),
        })?;

        for (index, interaction) in cassette.interactions.iter().enumerate() {
            if interaction.seq != index as u64 {
                return Err(Error::Cassette {
                    path: path.display().to_string(),
                    message: format!(
                        "interaction {} has seq {}; cassettes must be stored in order",
                        index, interaction.seq
                    ),
                });
            }
        }

        Ok(cassette)
    }

    /// Write the cassette as YAML, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let cassette_err = |message: String| Error::Cassette {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            serde_yaml::to_string(self).map_err(|e| cassette_err(format!("serialize: {e}")))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone());
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            cassette_err(format!("rename: {e}"))
        })?;

        tracing::info!(
            "Cassette {} saved with {} interactions",
            path.display(),
            self.interactions.len()
        );
        Ok(())
    }
}
