//! Per-test run context
//!
//! One [`RunContext`] exists per test invocation. It owns the test's
//! cassette transport, REST client, provider configuration and random
//! source; nothing in it is shared with other tests. It ends with
//! [`RunContext::finish`], which writes (record mode, passing test) or
//! discards the cassette.

use crate::config::{HarnessConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::gcp::auth::{GcpCredentials, StaticToken, TokenSource, REPLAY_TOKEN};
use crate::gcp::client::{RequestOptions, RestClient};
use crate::gcp::http::{ReqwestTransport, Transport};
use crate::gcp::retry::RetryPolicy;
use crate::vcr::random::SeededRandom;
use crate::vcr::{Cassette, CassetteTransport, RecordedLocation, RunMode};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Recorded URLs embed the recording's project and location, so replay
/// resolves with those whatever this machine's defaults are
fn use_recorded_location(provider: &mut ProviderConfig, location: &RecordedLocation) {
    if provider.project != location.project
        || provider.region != location.region
        || provider.zone != location.zone
    {
        tracing::info!(
            "Replaying with recorded location {}/{}/{} (local settings {}/{}/{})",
            location.project,
            location.region,
            location.zone,
            provider.project,
            provider.region,
            provider.zone
        );
    }
    provider.project = location.project.clone();
    provider.region = location.region.clone();
    provider.zone = location.zone.clone();
}

/// Builder for [`RunContext`], for callers that need to swap the token
/// source, live transport or retry policy
pub struct RunContextBuilder<'a> {
    test_name: String,
    config: &'a HarnessConfig,
    tokens: Option<Arc<dyn TokenSource>>,
    live: Option<Arc<dyn Transport>>,
    retry: Option<RetryPolicy>,
}

impl<'a> RunContextBuilder<'a> {
    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn live_transport(mut self, live: Arc<dyn Transport>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub async fn build(self) -> Result<RunContext> {
        let config = self.config;
        config.validate()?;
        let mode = config.mode;
        let cassette_path = config.cassette_path(&self.test_name);
        let mut provider = config.provider_config();

        let (transport, tokens, seed): (CassetteTransport, Arc<dyn TokenSource>, u64) = match mode
        {
            RunMode::Replay => {
                let path = cassette_path
                    .as_ref()
                    .ok_or_else(|| Error::Config("replay mode needs a cassette path".to_string()))?;
                let cassette = Cassette::load(path)?;
                tracing::info!(
                    "Replaying {} ({} interactions)",
                    path.display(),
                    cassette.len()
                );
                if let Some(location) = &cassette.location {
                    use_recorded_location(&mut provider, location);
                }
                let seed = cassette.seed;
                let tokens = self
                    .tokens
                    .unwrap_or_else(|| Arc::new(StaticToken(REPLAY_TOKEN.to_string())));
                (CassetteTransport::replaying(cassette), tokens, seed)
            }
            RunMode::Record | RunMode::Live => {
                let live = match self.live {
                    Some(live) => live,
                    None => Arc::new(ReqwestTransport::new(config.http_timeout())?),
                };
                let tokens: Arc<dyn TokenSource> = match self.tokens {
                    Some(tokens) => tokens,
                    None => Arc::new(GcpCredentials::new().await?),
                };
                let seed = SeededRandom::fresh_seed();
                let transport = if mode == RunMode::Record {
                    let mut cassette = Cassette::new(&self.test_name, seed);
                    cassette.location = Some(RecordedLocation {
                        project: provider.project.clone(),
                        region: provider.region.clone(),
                        zone: provider.zone.clone(),
                    });
                    CassetteTransport::recording(cassette, live)
                } else {
                    CassetteTransport::live(&self.test_name, live)
                };
                (transport, tokens, seed)
            }
        };

        let retry = self.retry.unwrap_or_default();
        let retry = if mode == RunMode::Replay {
            retry.without_delay()
        } else {
            retry
        };

        let transport = Arc::new(transport);
        let client = RestClient::new(transport.clone(), tokens, retry);

        tracing::info!(
            test = %self.test_name,
            mode = %mode,
            project = %provider.project,
            "Run context created"
        );

        Ok(RunContext {
            test_name: self.test_name,
            mode,
            provider,
            client,
            transport,
            random: SeededRandom::new(seed),
            cassette_path,
            finished: false,
        })
    }
}

/// Everything one test needs to talk to the API deterministically
pub struct RunContext {
    test_name: String,
    mode: RunMode,
    provider: ProviderConfig,
    client: RestClient,
    transport: Arc<CassetteTransport>,
    random: SeededRandom,
    cassette_path: Option<PathBuf>,
    finished: bool,
}

impl RunContext {
    /// Create a context with default credentials and transport
    pub async fn new(test_name: &str, config: &HarnessConfig) -> Result<Self> {
        Self::builder(test_name, config).build().await
    }

    pub fn builder<'a>(test_name: &str, config: &'a HarnessConfig) -> RunContextBuilder<'a> {
        RunContextBuilder {
            test_name: test_name.to_string(),
            config,
            tokens: None,
            live: None,
            retry: None,
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    /// Transport for provider implementations that need raw HTTP; it goes
    /// through the cassette like everything else
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Deterministic random suffix (same value on replay as on record)
    pub fn rand_string(&self, len: usize) -> String {
        self.random.rand_string(len)
    }

    pub fn rand_int(&self, upper: u64) -> u64 {
        self.random.rand_int(upper)
    }

    /// Send with the provider's billing project and user agent
    pub async fn send(&self, method: &str, url: &str, body: Option<&Value>) -> Result<Value> {
        self.client
            .send(
                method,
                &self.provider.billing_project,
                url,
                &self.provider.user_agent,
                body,
            )
            .await
    }

    /// [`send`](Self::send) with explicit request options
    pub async fn send_with(
        &self,
        method: &str,
        url: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        self.client
            .send_with(
                method,
                &self.provider.billing_project,
                url,
                &self.provider.user_agent,
                body,
                options,
            )
            .await
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.send("GET", url, None).await
    }

    /// End the run: persist the cassette if recording a passing test,
    /// otherwise discard it
    pub async fn finish(mut self, passed: bool) -> Result<()> {
        self.finished = true;
        match self.mode {
            RunMode::Record => {
                let Some(path) = self.cassette_path.as_ref() else {
                    return Ok(());
                };
                if passed {
                    self.transport.snapshot().await.save(path)
                } else {
                    tracing::warn!(
                        "Test {} failed; discarding recorded interactions",
                        self.test_name
                    );
                    Ok(())
                }
            }
            RunMode::Replay => {
                let unconsumed = self.transport.unconsumed().await;
                if unconsumed > 0 {
                    tracing::warn!(
                        "Test {} left {} recorded interactions unreplayed",
                        self.test_name,
                        unconsumed
                    );
                }
                Ok(())
            }
            RunMode::Live => Ok(()),
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if !self.finished && self.mode == RunMode::Record {
            tracing::warn!(
                "Run context for {} dropped without finish; cassette discarded",
                self.test_name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{resolve, ResolveContext};

    #[tokio::test]
    async fn test_replay_without_cassette_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            mode: RunMode::Replay,
            cassette_dir: Some(dir.path().to_path_buf()),
            project: Some("my-project-1".to_string()),
            ..Default::default()
        };
        let err = RunContext::new("TestAccMissing", &config).await.err().unwrap();
        assert!(matches!(err, Error::Cassette { .. }));
    }

    #[tokio::test]
    async fn test_replay_uses_cassette_seed() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            mode: RunMode::Replay,
            cassette_dir: Some(dir.path().to_path_buf()),
            project: Some("my-project-1".to_string()),
            ..Default::default()
        };
        Cassette::new("TestAccSeed", 1234)
            .save(&dir.path().join("TestAccSeed.yaml"))
            .unwrap();

        let ctx = RunContext::new("TestAccSeed", &config).await.unwrap();
        let expected = SeededRandom::new(1234).rand_string(10);
        assert_eq!(ctx.rand_string(10), expected);
        let retry = ctx.client().retry_policy();
        assert_eq!(retry.max_attempts, RetryPolicy::default().max_attempts);
        assert_eq!(retry.delay_for(2), std::time::Duration::ZERO);
        ctx.finish(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_resolves_with_recorded_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut cassette = Cassette::new("TestAccTpuNode", 1);
        cassette.location = Some(RecordedLocation {
            project: "my-project-1".to_string(),
            region: "europe-west4".to_string(),
            zone: "europe-west4-a".to_string(),
        });
        cassette
            .save(&dir.path().join("TestAccTpuNode.yaml"))
            .unwrap();

        let template = "{{TPUBasePath}}projects/{{project}}/locations/{{zone}}/nodes/tpu-1";
        let mut urls = Vec::new();
        for zone in ["europe-west4-a", "us-central1-f"] {
            let config = HarnessConfig {
                mode: RunMode::Replay,
                cassette_dir: Some(dir.path().to_path_buf()),
                project: Some("other-project-9".to_string()),
                zone: Some(zone.to_string()),
                ..Default::default()
            };
            let ctx = RunContext::new("TestAccTpuNode", &config).await.unwrap();
            let resolve_ctx = ResolveContext::new(ctx.provider_config());
            urls.push(resolve(template, &resolve_ctx).unwrap());
            ctx.finish(true).await.unwrap();
        }

        assert_eq!(urls[0], urls[1]);
        assert_eq!(
            urls[0],
            "https://tpu.googleapis.com/v1/projects/my-project-1/locations/europe-west4-a/nodes/tpu-1"
        );
    }
}
