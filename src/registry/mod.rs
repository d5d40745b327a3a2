//! Key Registry
//!
//! Loads the configured credentials. A missing or broken configuration never
//! fails the process: the registry is simply empty and remembers why.

pub mod credential;

pub use credential::{key_id_of, Credential};

use crate::clock::Clock;
use crate::config::{ConfigLoader, ConfigSource, KeysConfig};
use crate::router::TierPolicy;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Where the registry's credentials came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RegistrySource {
    /// Loaded from a config file
    File(PathBuf),
    /// Built from an in-memory config
    Inline,
    /// No config file was found
    Missing,
    /// A config file exists but could not be used
    Invalid(String),
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::File(path) => write!(f, "loaded from {}", path.display()),
            RegistrySource::Inline => write!(f, "inline configuration"),
            RegistrySource::Missing => write!(f, "no configuration file found"),
            RegistrySource::Invalid(reason) => write!(f, "configuration rejected: {}", reason),
        }
    }
}

/// The set of known credentials
#[derive(Debug)]
pub struct KeyRegistry {
    credentials: Vec<Arc<Credential>>,
    source: RegistrySource,
}

impl KeyRegistry {
    /// Load from `path`, or from the default search locations when `None`.
    pub fn load(path: Option<&Path>, clock: &dyn Clock) -> Self {
        let (config, source) = Self::read_config(path);
        Self::from_config(&config, source, clock.today())
    }

    /// Read the configuration document, degrading to an empty one on failure
    pub(crate) fn read_config(path: Option<&Path>) -> (KeysConfig, RegistrySource) {
        let loaded = match path {
            Some(path) if !path.exists() => {
                warn!(path = %path.display(), "key configuration not found, running without credentials");
                return (KeysConfig::default(), RegistrySource::Missing);
            }
            Some(path) => ConfigLoader::from_path(path),
            None => ConfigLoader::new(),
        };

        match loaded {
            Ok(loader) => match loader.into_parts() {
                (config, ConfigSource::File(path)) => (config, RegistrySource::File(path)),
                (config, ConfigSource::NotFound) => {
                    warn!("no key configuration found, running without credentials");
                    (config, RegistrySource::Missing)
                }
            },
            Err(e) => {
                warn!(error = %e, "key configuration unusable, running without credentials");
                (KeysConfig::default(), RegistrySource::Invalid(e.to_string()))
            }
        }
    }

    /// Build credentials from a parsed configuration
    pub fn from_config(config: &KeysConfig, source: RegistrySource, today: NaiveDate) -> Self {
        let tiers = TierPolicy::new(&config.settings.economy_markers);
        let mut credentials = Vec::with_capacity(config.keys.len());

        for (index, entry) in config.keys.iter().enumerate() {
            let Some(secret) = entry.resolve_secret() else {
                warn!(
                    index,
                    project = %entry.project,
                    model = %entry.model,
                    key_env = entry.key_env.as_deref().unwrap_or("-"),
                    "skipping key entry without a usable secret"
                );
                continue;
            };

            let credential = Credential::new(
                secret,
                entry.model.clone(),
                entry.project.clone(),
                tiers.classify(&entry.model),
                today,
            )
            .with_daily_limit(config.daily_limit_for(entry))
            .with_priority(config.priority_for(entry))
            .with_rpm_limit(config.rpm_limit_for(entry));

            credentials.push(Arc::new(credential));
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for c in &credentials {
            *seen.entry(c.key_id()).or_default() += 1;
        }
        for (key_id, count) in seen.into_iter().filter(|(_, n)| *n > 1) {
            warn!(
                key = %format!("...{}", key_id),
                count,
                "several keys share the same suffix and will share usage ledger entries"
            );
        }

        info!(keys = credentials.len(), source = %source, "key registry loaded");

        Self {
            credentials,
            source,
        }
    }

    /// All credentials in configuration order
    pub fn credentials(&self) -> &[Arc<Credential>] {
        &self.credentials
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Credential>> {
        self.credentials.iter()
    }

    /// Credentials owned by `project`
    pub fn for_project<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a Arc<Credential>> {
        self.credentials.iter().filter(move |c| c.project() == project)
    }

    /// Look a credential up by its secret value
    pub fn find_by_secret(&self, secret: &str) -> Option<&Arc<Credential>> {
        self.credentials.iter().find(|c| c.secret() == secret)
    }

    pub fn source(&self) -> &RegistrySource {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
