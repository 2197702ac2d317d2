//! Record/replay transport
//!
//! Sits between the REST client and the network. In record mode every
//! exchange is forwarded and appended to the cassette, failures included.
//! In replay mode requests are answered from the cassette only: each one
//! consumes the first unconsumed interaction with an equal signature, and a
//! request with no such interaction is a [`Error::CassetteMiss`], never a
//! live call.

use super::cassette::Cassette;
use super::signature::RequestSignature;
use super::RunMode;
use crate::error::{Error, Result};
use crate::gcp::http::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Tape {
    cassette: Cassette,
    /// Signature of each recorded interaction (replay only)
    signatures: Vec<RequestSignature>,
    consumed: Vec<bool>,
}

/// Transport that records to or replays from a cassette
pub struct CassetteTransport {
    mode: RunMode,
    live: Option<Arc<dyn Transport>>,
    tape: Mutex<Tape>,
}

impl CassetteTransport {
    /// Forward to `live` and append every exchange to `cassette`
    pub fn recording(cassette: Cassette, live: Arc<dyn Transport>) -> Self {
        Self::build(RunMode::Record, cassette, Some(live))
    }

    /// Serve requests from `cassette` only
    pub fn replaying(cassette: Cassette) -> Self {
        Self::build(RunMode::Replay, cassette, None)
    }

    /// Forward to `live`, store nothing
    pub fn live(name: &str, live: Arc<dyn Transport>) -> Self {
        Self::build(RunMode::Live, Cassette::new(name, 0), Some(live))
    }

    fn build(mode: RunMode, cassette: Cassette, live: Option<Arc<dyn Transport>>) -> Self {
        let signatures = if mode == RunMode::Replay {
            cassette
                .interactions
                .iter()
                .map(|i| i.request.signature())
                .collect()
        } else {
            Vec::new()
        };
        let consumed = vec![false; cassette.interactions.len()];
        Self {
            mode,
            live,
            tape: Mutex::new(Tape {
                cassette,
                signatures,
                consumed,
            }),
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Number of recorded interactions not yet replayed
    pub async fn unconsumed(&self) -> usize {
        let tape = self.tape.lock().await;
        tape.consumed.iter().filter(|c| !**c).count()
    }

    /// Copy of the cassette as it stands
    pub async fn snapshot(&self) -> Cassette {
        self.tape.lock().await.cassette.clone()
    }

    fn live_transport(&self, url: &str) -> Result<&Arc<dyn Transport>> {
        self.live.as_ref().ok_or_else(|| Error::Transport {
            url: url.to_string(),
            message: format!("no live transport configured in {} mode", self.mode),
        })
    }

    async fn replay(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let signature = RequestSignature::of(&request.method, &request.url, request.body.as_deref());
        let mut tape = self.tape.lock().await;

        let hit = tape
            .signatures
            .iter()
            .zip(tape.consumed.iter())
            .position(|(recorded, consumed)| !consumed && *recorded == signature);

        match hit {
            Some(index) => {
                tape.consumed[index] = true;
                let interaction = &tape.cassette.interactions[index];
                tracing::debug!(
                    "replay #{} {} {} -> {}",
                    interaction.seq,
                    signature.method,
                    signature.url,
                    interaction.response.status
                );
                Ok(HttpResponse::from(&interaction.response))
            }
            None => {
                let nearest = tape
                    .signatures
                    .iter()
                    .find(|s| s.method == signature.method && s.path() == signature.path())
                    .map(ToString::to_string);
                let consumed = tape.consumed.iter().filter(|c| **c).count();
                Err(Error::CassetteMiss {
                    cassette: tape.cassette.name.clone(),
                    request: signature.to_string(),
                    nearest,
                    consumed,
                    recorded: tape.cassette.interactions.len(),
                })
            }
        }
    }
}

#[async_trait]
impl Transport for CassetteTransport {
    async fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse> {
        match self.mode {
            RunMode::Replay => self.replay(request).await,
            RunMode::Live => self.live_transport(&request.url)?.round_trip(request).await,
            RunMode::Record => {
                let response = self.live_transport(&request.url)?.round_trip(request).await?;
                let mut tape = self.tape.lock().await;
                let interaction = tape.cassette.record(request, &response);
                tracing::debug!(
                    "recorded #{} {} {} -> {}",
                    interaction.seq,
                    interaction.request.method,
                    interaction.request.url,
                    interaction.response.status
                );
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse> {
            let status = if request.url.ends_with("/missing") { 404 } else { 200 };
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: format!(r#"{{"url":"{}"}}"#, request.url),
            })
        }
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest::new("GET", url)
    }

    async fn record(requests: &[HttpRequest]) -> Cassette {
        let transport = CassetteTransport::recording(Cassette::new("TestAccX", 1), Arc::new(Echo));
        for request in requests {
            transport.round_trip(request).await.unwrap();
        }
        transport.snapshot().await
    }

    #[tokio::test]
    async fn test_record_then_replay() {
        let cassette = record(&[get("https://x/a"), get("https://x/missing")]).await;
        assert_eq!(cassette.len(), 2);
        assert_eq!(cassette.interactions[1].response.status, 404);

        let replay = CassetteTransport::replaying(cassette);
        let missing = replay.round_trip(&get("https://x/missing")).await.unwrap();
        assert_eq!(missing.status, 404);
        let found = replay.round_trip(&get("https://x/a")).await.unwrap();
        assert_eq!(found.status, 200);
        assert_eq!(replay.unconsumed().await, 0);
    }

    #[tokio::test]
    async fn test_repeated_signature_consumes_in_order() {
        let mut cassette = Cassette::new("poll", 1);
        for status in [200u16, 200, 404] {
            cassette.record(
                &get("https://x/op"),
                &HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: String::new(),
                },
            );
        }
        let replay = CassetteTransport::replaying(cassette);
        let statuses = [
            replay.round_trip(&get("https://x/op")).await.unwrap().status,
            replay.round_trip(&get("https://x/op")).await.unwrap().status,
            replay.round_trip(&get("https://x/op")).await.unwrap().status,
        ];
        assert_eq!(statuses, [200, 200, 404]);
    }

    #[tokio::test]
    async fn test_exhaustion_is_cassette_miss() {
        let cassette = record(&[get("https://x/a")]).await;
        let replay = CassetteTransport::replaying(cassette);
        replay.round_trip(&get("https://x/a")).await.unwrap();
        let err = replay.round_trip(&get("https://x/a")).await.unwrap_err();
        match err {
            Error::CassetteMiss {
                consumed,
                recorded,
                nearest,
                ..
            } => {
                assert_eq!((consumed, recorded), (1, 1));
                assert!(nearest.is_some());
            }
            other => panic!("expected cassette miss, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_request_is_cassette_miss() {
        let cassette = record(&[get("https://x/a")]).await;
        let replay = CassetteTransport::replaying(cassette);
        let err = replay.round_trip(&get("https://x/other")).await.unwrap_err();
        assert!(matches!(err, Error::CassetteMiss { nearest: None, .. }));
    }

    #[tokio::test]
    async fn test_replay_matches_despite_key_order_and_secrets() {
        let post = |body: &str| {
            HttpRequest::new("POST", "https://x/keys")
                .header("content-type", "application/json")
                .body(body.to_string())
        };
        let cassette = record(&[post(r#"{"keyName":"k","keyValue":"s3cr3t"}"#)]).await;
        let stored = cassette.interactions[0].request.body.clone().unwrap();
        assert!(!stored.contains("s3cr3t"));

        let replay = CassetteTransport::replaying(cassette);
        let response = replay
            .round_trip(&post(r#"{"keyValue":"s3cr3t","keyName":"k"}"#))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_live_mode_stores_nothing() {
        let transport = CassetteTransport::live("TestAccX", Arc::new(Echo));
        transport.round_trip(&get("https://x/a")).await.unwrap();
        assert!(transport.snapshot().await.is_empty());
    }
}
