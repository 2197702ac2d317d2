//! Configuration Management
//!
//! Process-wide harness settings: run mode, cassette location, project
//! defaults and API base paths. Read once (file, then environment) and
//! handed to [`RunContext`](crate::context::RunContext) explicitly.

use crate::error::{Error, Result};
use crate::gcp::auth::{gcloud_default_project, gcloud_default_zone, validate_project_id};
use crate::vcr::RunMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default region when neither config nor environment names one
pub const DEFAULT_REGION: &str = "us-central1";

/// Default zone when neither config nor environment nor gcloud names one
pub const DEFAULT_ZONE: &str = "us-central1-a";

/// Default bound on a single HTTP call
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Project variables gcloud and the client libraries honor, in order
const GCLOUD_PROJECT_VARS: &[&str] = &["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

/// API families: (base path key, default URL, custom endpoint env var)
pub const BASE_PATHS: &[(&str, &str, &str)] = &[
    (
        "ComputeBasePath",
        "https://compute.googleapis.com/compute/v1/",
        "GOOGLE_COMPUTE_CUSTOM_ENDPOINT",
    ),
    (
        "DataprocBasePath",
        "https://dataproc.googleapis.com/v1/",
        "GOOGLE_DATAPROC_CUSTOM_ENDPOINT",
    ),
    (
        "TPUBasePath",
        "https://tpu.googleapis.com/v1/",
        "GOOGLE_TPU_CUSTOM_ENDPOINT",
    ),
    (
        "StorageBasePath",
        "https://storage.googleapis.com/storage/v1/",
        "GOOGLE_STORAGE_CUSTOM_ENDPOINT",
    ),
    (
        "ResourceManagerBasePath",
        "https://cloudresourcemanager.googleapis.com/v1/",
        "GOOGLE_RESOURCE_MANAGER_CUSTOM_ENDPOINT",
    ),
];

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HarnessConfig {
    /// Record, replay or live
    #[serde(default)]
    pub mode: RunMode,
    /// Directory holding one cassette per test
    #[serde(default)]
    pub cassette_dir: Option<PathBuf>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    /// Project charged for quota on every call, if different from `project`
    #[serde(default)]
    pub billing_project: Option<String>,
    /// Appended to the harness user agent
    #[serde(default)]
    pub user_agent_suffix: Option<String>,
    /// Overrides keyed like `ComputeBasePath`
    #[serde(default)]
    pub base_paths: BTreeMap<String, String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

/// Settings the provider and predicates see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub project: String,
    pub region: String,
    pub zone: String,
    pub billing_project: String,
    pub user_agent: String,
    pub base_paths: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// Base URL for an API family, e.g. `base_path("ComputeBasePath")`
    pub fn base_path(&self, key: &str) -> Option<&str> {
        self.base_paths.get(key).map(String::as_str)
    }

    /// Provider-level value for a template placeholder
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "project" | "Project" => self.project.as_str(),
            "region" | "Region" => self.region.as_str(),
            "zone" | "Zone" => self.zone.as_str(),
            "billing_project" | "BillingProject" => self.billing_project.as_str(),
            "UserAgent" => self.user_agent.as_str(),
            other => return self.base_path(other),
        };
        Some(value).filter(|v| !v.is_empty())
    }
}

impl HarnessConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GCPVCR_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("gcpvcr").join("config.json"))
    }

    /// Load the config file (if any), overlay the process environment and
    /// fill the remaining project/zone gaps from gcloud.
    ///
    /// This is the only place ambient settings are read; the result is
    /// complete and [`provider_config`](Self::provider_config) is pure.
    pub fn load() -> Result<Self> {
        let base = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        Ok(base
            .with_env(|name| std::env::var(name).ok())?
            .with_gcloud_defaults())
    }

    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))
    }

    /// Overlay values from an environment lookup
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(mode) = get("VCR_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(path) = get("VCR_PATH") {
            self.cassette_dir = Some(PathBuf::from(path));
        }
        if let Some(project) = get("GOOGLE_PROJECT") {
            self.project = Some(project);
        }
        if let Some(region) = get("GOOGLE_REGION") {
            self.region = Some(region);
        }
        if let Some(zone) = get("GOOGLE_ZONE") {
            self.zone = Some(zone);
        }
        // gcloud's own variables only fill what nothing else named
        if self.project.is_none() {
            self.project = GCLOUD_PROJECT_VARS.iter().copied().find_map(|var| {
                let project = get(var)?;
                if validate_project_id(&project) {
                    Some(project)
                } else {
                    tracing::warn!("Invalid project ID format in {}", var);
                    None
                }
            });
        }
        if self.zone.is_none() {
            self.zone = get("CLOUDSDK_COMPUTE_ZONE");
        }
        if let Some(billing) = get("GOOGLE_BILLING_PROJECT") {
            self.billing_project = Some(billing);
        }
        if let Some(suffix) = get("GOOGLE_USER_AGENT_SUFFIX") {
            self.user_agent_suffix = Some(suffix);
        }
        if let Some(secs) = get("GCPVCR_HTTP_TIMEOUT_SECS") {
            let secs = secs
                .parse()
                .map_err(|_| Error::Config(format!("GCPVCR_HTTP_TIMEOUT_SECS must be an integer, got {secs:?}")))?;
            self.http_timeout_secs = Some(secs);
        }
        for (key, _, env) in BASE_PATHS {
            if let Some(endpoint) = get(env) {
                self.base_paths.insert(key.to_string(), endpoint);
            }
        }

        Ok(self)
    }

    /// Fill an unset project or zone from the active gcloud configuration
    pub fn with_gcloud_defaults(mut self) -> Self {
        if self.project.is_none() {
            self.project = gcloud_default_project();
        }
        if self.zone.is_none() {
            self.zone = gcloud_default_zone();
        }
        self
    }

    /// Check that the mode has what it needs
    pub fn validate(&self) -> Result<()> {
        if self.mode.uses_cassette() && self.cassette_dir.is_none() {
            return Err(Error::Config(format!(
                "VCR_PATH must be set when VCR_MODE is {}",
                self.mode
            )));
        }
        if let Some(0) = self.http_timeout_secs {
            return Err(Error::Config("http timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn effective_project(&self) -> String {
        self.project.clone().unwrap_or_default()
    }

    pub fn effective_zone(&self) -> String {
        self.zone
            .clone()
            .unwrap_or_else(|| DEFAULT_ZONE.to_string())
    }

    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT)
    }

    /// Cassette file for a test, if the mode uses one
    pub fn cassette_path(&self, test_name: &str) -> Option<PathBuf> {
        if !self.mode.uses_cassette() {
            return None;
        }
        self.cassette_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.yaml", test_name)))
    }

    /// Build the provider-facing configuration
    pub fn provider_config(&self) -> ProviderConfig {
        let mut base_paths: BTreeMap<String, String> = BASE_PATHS
            .iter()
            .map(|(key, url, _)| (key.to_string(), url.to_string()))
            .collect();
        for (key, url) in &self.base_paths {
            let url = if url.ends_with('/') {
                url.clone()
            } else {
                format!("{}/", url)
            };
            base_paths.insert(key.clone(), url);
        }

        let mut user_agent = format!("gcpvcr/{}", env!("CARGO_PKG_VERSION"));
        if let Some(suffix) = &self.user_agent_suffix {
            user_agent.push(' ');
            user_agent.push_str(suffix);
        }

        ProviderConfig {
            project: self.effective_project(),
            region: self.effective_region(),
            zone: self.effective_zone(),
            billing_project: self.billing_project.clone().unwrap_or_default(),
            user_agent,
            base_paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overlay() {
        let config = HarnessConfig::default()
            .with_env(env(&[
                ("VCR_MODE", "REPLAYING"),
                ("VCR_PATH", "/tmp/cassettes"),
                ("GOOGLE_PROJECT", "my-project-1"),
                ("GOOGLE_COMPUTE_CUSTOM_ENDPOINT", "http://localhost:9000/compute/v1"),
            ]))
            .unwrap();
        assert_eq!(config.mode, RunMode::Replay);
        assert_eq!(config.cassette_dir, Some(PathBuf::from("/tmp/cassettes")));
        assert!(config.validate().is_ok());

        let provider = config.provider_config();
        assert_eq!(provider.project, "my-project-1");
        assert_eq!(
            provider.base_path("ComputeBasePath"),
            Some("http://localhost:9000/compute/v1/")
        );
        assert_eq!(
            provider.base_path("TPUBasePath"),
            Some("https://tpu.googleapis.com/v1/")
        );
    }

    #[test]
    fn test_invalid_mode_is_error() {
        let err = HarnessConfig::default()
            .with_env(env(&[("VCR_MODE", "sometimes")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_record_requires_cassette_dir() {
        let config = HarnessConfig {
            mode: RunMode::Record,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cassette_path_only_in_vcr_modes() {
        let mut config = HarnessConfig {
            cassette_dir: Some(PathBuf::from("/c")),
            ..Default::default()
        };
        assert_eq!(config.cassette_path("TestAccX"), None);
        config.mode = RunMode::Replay;
        assert_eq!(
            config.cassette_path("TestAccX"),
            Some(PathBuf::from("/c/TestAccX.yaml"))
        );
    }

    #[test]
    fn test_provider_field_lookup() {
        let config = HarnessConfig {
            project: Some("my-project-1".to_string()),
            region: Some("europe-west1".to_string()),
            ..Default::default()
        };
        let provider = config.provider_config();
        assert_eq!(provider.field("project"), Some("my-project-1"));
        assert_eq!(provider.field("Region"), Some("europe-west1"));
        assert_eq!(provider.field("billing_project"), None);
        assert!(provider.field("ComputeBasePath").is_some());
        assert_eq!(provider.field("NoSuchBasePath"), None);
    }

    #[test]
    fn test_gcloud_variables_only_fill_gaps() {
        let config = HarnessConfig::default()
            .with_env(env(&[
                ("CLOUDSDK_CORE_PROJECT", "gcloud-project-1"),
                ("CLOUDSDK_COMPUTE_ZONE", "europe-west4-a"),
            ]))
            .unwrap();
        assert_eq!(config.project.as_deref(), Some("gcloud-project-1"));
        assert_eq!(config.zone.as_deref(), Some("europe-west4-a"));

        let config = HarnessConfig::default()
            .with_env(env(&[
                ("GOOGLE_PROJECT", "my-project-1"),
                ("GOOGLE_ZONE", "us-central1-f"),
                ("CLOUDSDK_CORE_PROJECT", "gcloud-project-1"),
                ("CLOUDSDK_COMPUTE_ZONE", "europe-west4-a"),
            ]))
            .unwrap();
        assert_eq!(config.project.as_deref(), Some("my-project-1"));
        assert_eq!(config.zone.as_deref(), Some("us-central1-f"));
    }

    #[test]
    fn test_invalid_gcloud_project_is_skipped() {
        let config = HarnessConfig::default()
            .with_env(env(&[
                ("CLOUDSDK_CORE_PROJECT", "Bad_Project"),
                ("GOOGLE_CLOUD_PROJECT", "my-project-2"),
            ]))
            .unwrap();
        assert_eq!(config.project.as_deref(), Some("my-project-2"));
    }

    #[test]
    fn test_provider_config_ignores_process_environment() {
        let config = HarnessConfig {
            mode: RunMode::Replay,
            cassette_dir: Some(PathBuf::from("/c")),
            project: Some("my-project-1".to_string()),
            ..Default::default()
        };

        std::env::set_var("CLOUDSDK_COMPUTE_ZONE", "europe-west4-a");
        let first = config.provider_config();
        std::env::set_var("CLOUDSDK_COMPUTE_ZONE", "us-central1-f");
        let second = config.provider_config();
        std::env::remove_var("CLOUDSDK_COMPUTE_ZONE");

        assert_eq!(first, second);
        assert_eq!(first.zone, DEFAULT_ZONE);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"mode":"record","cassette_dir":"/c","project":"my-project-1","http_timeout_secs":5}"#,
        )
        .unwrap();
        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.mode, RunMode::Record);
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
    }
}
