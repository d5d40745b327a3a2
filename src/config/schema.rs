//! Key Configuration
//!
//! Defines the configuration schema for credentials and balancer settings.

use crate::router::Complexity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Credential entries
    #[serde(default)]
    pub keys: Vec<KeyEntry>,

    /// Daily request limit per model identifier
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub global_limits: HashMap<String, u32>,

    /// Requests-per-minute cap per model identifier
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub rpm_limits: HashMap<String, u32>,

    /// Balancer tuning
    #[serde(default)]
    pub settings: BalancerSettings,
}

/// Configuration for a single credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Raw secret value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Environment variable holding the secret (used when `key` is absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,

    /// Model identifier, e.g. "gemini-3-flash-preview"
    pub model: String,

    /// Owning project
    pub project: String,

    /// Lower is preferred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Overrides the model's entry in `global_limits`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u32>,
}

impl KeyEntry {
    /// Entry with an inline secret
    pub fn new(key: impl Into<String>, model: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            key_env: None,
            model: model.into(),
            project: project.into(),
            priority: None,
            daily_limit: None,
        }
    }

    /// Set the priority
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set a per-key daily limit
    pub fn daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = Some(limit);
        self
    }

    /// Resolve the secret: inline value first, then the environment variable
    pub fn resolve_secret(&self) -> Option<String> {
        if let Some(key) = self.key.as_deref().map(str::trim) {
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }

        let env_var = self.key_env.as_deref()?;
        std::env::var(env_var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Balancer tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerSettings {
    /// Location of the usage ledger document
    pub usage_log_path: PathBuf,

    /// Cooldown applied on a rate-limit report
    #[serde(with = "crate::config::duration")]
    pub cooldown: Duration,

    /// Consecutive hard failures before the long cooldown kicks in
    pub max_errors: u32,

    /// Cooldown applied once `max_errors` is reached
    #[serde(with = "crate::config::duration")]
    pub long_cooldown: Duration,

    /// Substrings marking a model as the economy tier
    pub economy_markers: Vec<String>,

    /// Priority for entries without one
    pub default_priority: i32,

    /// Daily limit for models missing from `global_limits`
    pub default_daily_limit: u32,

    /// Seed for the tie-break RNG; entropy when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Task kind -> complexity for the dispatch queue
    pub task_complexity: HashMap<String, Complexity>,
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            usage_log_path: PathBuf::from("logs/api_usage_stats.json"),
            cooldown: Duration::from_secs(2 * 60),
            max_errors: 3,
            long_cooldown: Duration::from_secs(4 * 3600),
            economy_markers: vec!["flash".to_string()],
            default_priority: 10,
            default_daily_limit: 500,
            seed: None,
            task_complexity: [
                ("code_generation".to_string(), Complexity::High),
                ("code_review".to_string(), Complexity::High),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl KeysConfig {
    /// Daily limit for an entry
    pub fn daily_limit_for(&self, entry: &KeyEntry) -> u32 {
        entry
            .daily_limit
            .or_else(|| self.global_limits.get(&entry.model).copied())
            .unwrap_or(self.settings.default_daily_limit)
    }

    /// Priority for an entry
    pub fn priority_for(&self, entry: &KeyEntry) -> i32 {
        entry.priority.unwrap_or(self.settings.default_priority)
    }

    /// Requests-per-minute cap for an entry, if any
    pub fn rpm_limit_for(&self, entry: &KeyEntry) -> Option<u32> {
        self.rpm_limits.get(&entry.model).copied()
    }
}
