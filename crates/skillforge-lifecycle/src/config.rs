//! Lifecycle configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! (or JSON) file, and `SKILLFORGE_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::Priority;
use crate::error::{LifecycleError, Result};

/// Environment variable overriding the discovery endpoint.
pub const ENV_DISCOVERY_ENDPOINT: &str = "SKILLFORGE_DISCOVERY_ENDPOINT";
/// Environment variable overriding the router endpoint.
pub const ENV_ROUTER_ENDPOINT: &str = "SKILLFORGE_ROUTER_ENDPOINT";
/// Environment variable overriding the agent id.
pub const ENV_AGENT_ID: &str = "SKILLFORGE_AGENT_ID";
/// Environment variable overriding the base model id.
pub const ENV_BASE_MODEL: &str = "SKILLFORGE_BASE_MODEL";

const DEFAULT_DISCOVERY_ENDPOINT: &str = "http://localhost:8081";
const DEFAULT_ROUTER_ENDPOINT: &str = "http://localhost:8082";

/// Settings for the discovery → invocation lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Base URL of the error-cluster discovery service.
    pub discovery_endpoint: String,
    /// Base URL of the skill router.
    pub router_endpoint: String,
    /// Identity reported in every error context and invocation.
    pub agent_id: String,
    pub agent_version: String,
    /// Base model the host runs; skills are matched against it.
    pub base_model_id: String,
    /// Maximum clusters returned per discovery query.
    pub max_results: u32,
    /// Minimum similarity for a discovery match, in `[0, 1]`.
    pub similarity_threshold: f32,
    /// Bounty attached to newly submitted error nodes.
    pub bounty_amount: f64,
    pub submission_priority: Priority,
    pub invocation_priority: Priority,
    /// Per-request timeout applied by the HTTP transport.
    pub request_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            discovery_endpoint: DEFAULT_DISCOVERY_ENDPOINT.to_owned(),
            router_endpoint: DEFAULT_ROUTER_ENDPOINT.to_owned(),
            agent_id: "skillforge-agent".to_owned(),
            agent_version: env!("CARGO_PKG_VERSION").to_owned(),
            base_model_id: "hrm-base".to_owned(),
            max_results: 5,
            similarity_threshold: 0.7,
            bounty_amount: 1.0,
            submission_priority: Priority::Medium,
            invocation_priority: Priority::Medium,
            request_timeout_secs: 30,
        }
    }
}

impl LifecycleConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LifecycleError::Config(format!("failed to parse TOML config: {e}")))
    }

    /// Load from a `.toml` or `.json` file.
    ///
    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LifecycleError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)
                .map_err(|e| LifecycleError::Config(format!("failed to parse JSON config: {e}")))?
        } else {
            Self::from_toml_str(&content)?
        };

        info!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// Apply `SKILLFORGE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(ENV_DISCOVERY_ENDPOINT) {
            self.discovery_endpoint = v;
        }
        if let Some(v) = lookup(ENV_ROUTER_ENDPOINT) {
            self.router_endpoint = v;
        }
        if let Some(v) = lookup(ENV_AGENT_ID) {
            self.agent_id = v;
        }
        if let Some(v) = lookup(ENV_BASE_MODEL) {
            self.base_model_id = v;
        }
        self
    }

    /// Check endpoints and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        for (name, endpoint) in [
            ("discovery_endpoint", &self.discovery_endpoint),
            ("router_endpoint", &self.router_endpoint),
        ] {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| LifecycleError::Config(format!("{name} `{endpoint}`: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LifecycleError::Config(format!(
                    "{name} `{endpoint}` must be http or https"
                )));
            }
        }
        if self.max_results == 0 {
            return Err(LifecycleError::Config("max_results must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(LifecycleError::Config(format!(
                "similarity_threshold {} is outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.agent_id.is_empty() {
            return Err(LifecycleError::Config("agent_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Join a base URL and an absolute path without doubling the slash.
pub(crate) fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
