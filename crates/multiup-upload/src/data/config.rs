use std::collections::BTreeMap;
use std::time::Duration;

use multiup_hosts::AuthKind;
use serde::{Deserialize, Serialize};

use crate::data::credential::{Credential, Secret};

/// Engine-wide settings, supplied once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool size per gallery.
    pub parallelism: usize,
    pub max_global_connections: usize,
    /// Extra passes over still-failing files after the first pass.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub token_safety_margin_secs: u64,
    pub progress_interval_ms: u64,
    pub hosts: BTreeMap<String, HostSettings>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_global_connections: 3,
            max_retries: 2,
            retry_backoff_ms: 500,
            token_safety_margin_secs: 60,
            progress_interval_ms: 100,
            hosts: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    #[must_use]
    pub fn max_global_connections(mut self, n: usize) -> Self {
        self.max_global_connections = n;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, base: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn token_safety_margin(mut self, secs: u64) -> Self {
        self.token_safety_margin_secs = secs;
        self
    }

    #[must_use]
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn host(mut self, host_id: impl Into<String>, settings: HostSettings) -> Self {
        self.hosts.insert(host_id.into(), settings);
        self
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn progress_interval_duration(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn host_settings(&self, host_id: &str) -> Option<&HostSettings> {
        self.hosts.get(host_id)
    }
}

/// Per-host switches and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub enabled: bool,
    pub api_key: Option<Secret>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    /// Overrides the descriptor's per-host connection limit.
    pub max_connections: Option<u32>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            username: None,
            password: None,
            max_connections: None,
        }
    }
}

impl HostSettings {
    pub fn with_api_key(key: impl Into<Secret>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_login(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = Some(n);
        self
    }

    /// The credential shape `auth_kind` needs, if the settings carry one.
    pub fn credential(&self, auth_kind: AuthKind) -> Option<Credential> {
        match auth_kind {
            AuthKind::ApiKey => self.api_key.clone().map(Credential::ApiKey),
            AuthKind::TokenLogin | AuthKind::SessionLogin => {
                match (&self.username, &self.password) {
                    (Some(user), Some(pass)) => Some(Credential::login(user.clone(), pass.clone())),
                    _ => None,
                }
            }
        }
    }
}
