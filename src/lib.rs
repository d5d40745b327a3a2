//! Keyward - client-side API key load balancer
//!
//! Decides which credential an application should use for each outgoing LLM
//! call, enforcing per-key daily quotas, rate-limit cooldowns and
//! priority/cost-aware routing. Keyward never performs the provider call
//! itself: callers ask for a key, make the call, and report failures back.
//!
//! ```no_run
//! # async fn run() {
//! use keyward::{Complexity, ResourceManager};
//!
//! let manager = ResourceManager::new().await;
//! if let Some(key) = manager.acquire_key("alpha", Complexity::Normal).await {
//!     // ... call the provider with `key` ...
//!     manager.report_error(&key, "rate_limit_reached");
//! }
//! println!("{}", manager.status_report());
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod ledger;
pub mod registry;
pub mod report;
pub mod router;

#[cfg(feature = "python")]
mod python;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BalancerSettings, ConfigLoader, KeyEntry, KeysConfig};
pub use dispatch::{Dispatch, QueueStatus, Task, TaskQueue};
pub use error::{KeywardError, Result};
pub use health::{CooldownPolicy, ErrorKind, HealthMonitor};
pub use ledger::{UsageDocument, UsageLedger};
pub use registry::{Credential, KeyRegistry, RegistrySource};
pub use report::{CredentialStatus, KeyState, ProjectAvailability, StatusReport};
pub use router::{Complexity, ModelTier, Router, Selection};

/// The entry point collaborators use
#[derive(Debug)]
pub struct ResourceManager {
    registry: Arc<KeyRegistry>,
    health: Arc<HealthMonitor>,
    ledger: Arc<UsageLedger>,
    router: Router,
    clock: Arc<dyn Clock>,
    settings: BalancerSettings,
}

impl ResourceManager {
    /// Create a manager from the default config locations
    pub async fn new() -> Self {
        Self::load(None, Arc::new(SystemClock)).await
    }

    /// Create a manager from a specific config file
    pub async fn with_config_path(path: impl AsRef<Path>) -> Self {
        Self::load(Some(path.as_ref()), Arc::new(SystemClock)).await
    }

    /// Create a manager from a config file (or the default locations) with a
    /// custom clock
    pub async fn load(path: Option<&Path>, clock: Arc<dyn Clock>) -> Self {
        let (config, source) = KeyRegistry::read_config(path);
        Self::build(config, source, clock).await
    }

    /// Create a manager from an in-memory configuration
    pub async fn from_config(config: KeysConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, RegistrySource::Inline, clock).await
    }

    async fn build(config: KeysConfig, source: RegistrySource, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(KeyRegistry::from_config(&config, source, clock.today()));
        let settings = config.settings;

        let ledger = Arc::new(UsageLedger::new(settings.usage_log_path.clone()));
        ledger.sync_today(registry.credentials(), clock.today()).await;

        let health = Arc::new(HealthMonitor::new(
            CooldownPolicy::from(&settings),
            clock.clone(),
        ));
        let router = Router::new(
            registry.clone(),
            health.clone(),
            ledger.clone(),
            clock.clone(),
            settings.seed,
        );

        Self {
            registry,
            health,
            ledger,
            router,
            clock,
            settings,
        }
    }

    /// Get a key for `project`, or `None` when none is usable right now
    pub async fn acquire_key(&self, project: &str, complexity: impl Into<Complexity>) -> Option<String> {
        self.acquire(project, complexity)
            .await
            .map(|selection| selection.credential.secret().to_string())
    }

    /// Like [`acquire_key`](Self::acquire_key) but returns the full selection,
    /// including any ledger warning
    pub async fn acquire(&self, project: &str, complexity: impl Into<Complexity>) -> Option<Selection> {
        self.router.select(project, complexity.into()).await
    }

    /// Report that a call made with `key` failed
    pub fn report_error(&self, key: &str, error_kind: impl Into<ErrorKind>) {
        let kind = error_kind.into();
        match self.registry.find_by_secret(key) {
            Some(credential) => {
                self.health.handle_error(credential, &kind);
            }
            None => warn!(kind = %kind, "error reported for an unknown key, ignoring"),
        }
    }

    /// Report that a call made with `key` succeeded
    pub fn report_success(&self, key: &str) {
        match self.registry.find_by_secret(key) {
            Some(credential) => self.health.record_success(credential),
            None => debug!("success reported for an unknown key, ignoring"),
        }
    }

    /// Usage and health of every credential
    pub fn status_report(&self) -> StatusReport {
        StatusReport::collect(
            &self.registry,
            &self.health,
            self.clock.as_ref(),
            self.ledger.write_failures(),
        )
    }

    /// Whether `project` can be served right now, and if not, why
    pub fn availability(&self, project: &str) -> ProjectAvailability {
        self.router.availability(project)
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Time source shared by every component
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn settings(&self) -> &BalancerSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap(),
        ))
    }

    fn alpha_config(dir: &TempDir) -> KeysConfig {
        let mut config = KeysConfig {
            keys: vec![
                KeyEntry::new("alpha-flash-key-aaaa", "gemini-3-flash-preview", "alpha")
                    .priority(1)
                    .daily_limit(2),
                KeyEntry::new("alpha-flash-key-bbbb", "gemini-3-flash-preview", "alpha")
                    .priority(1)
                    .daily_limit(2),
                KeyEntry::new("alpha-sonnet-key-cccc", "claude-3-sonnet", "alpha")
                    .priority(5)
                    .daily_limit(10),
            ],
            ..KeysConfig::default()
        };
        config.settings.usage_log_path = dir.path().join("logs").join("api_usage_stats.json");
        config.settings.seed = Some(17);
        config
    }

    #[tokio::test]
    async fn test_acquire_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let manager = ResourceManager::from_config(alpha_config(&dir), clock.clone()).await;

        let key = manager.acquire_key("alpha", "normal").await.unwrap();
        assert!(key.starts_with("alpha-flash-key-"));

        manager.report_error(&key, "rate_limit_reached");
        let other = manager.acquire_key("alpha", "normal").await.unwrap();
        assert_ne!(other, key);

        // unknown keys are ignored
        manager.report_error("not-a-configured-key", ErrorKind::AuthenticationError);
        manager.report_success("not-a-configured-key");
    }

    #[tokio::test]
    async fn test_restart_reproduces_usage() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();

        let before: Vec<u32> = {
            let manager = ResourceManager::from_config(alpha_config(&dir), clock.clone()).await;
            for _ in 0..3 {
                manager.acquire_key("alpha", Complexity::Normal).await.unwrap();
            }
            manager.acquire_key("alpha", Complexity::High).await.unwrap();
            manager
                .registry()
                .iter()
                .map(|c| c.consumed_today(clock.today()))
                .collect()
        };
        assert_eq!(before.iter().sum::<u32>(), 4);

        let restarted = ResourceManager::from_config(alpha_config(&dir), clock.clone()).await;
        let after: Vec<u32> = restarted
            .registry()
            .iter()
            .map(|c| c.consumed_today(clock.today()))
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_restart_on_a_new_day_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let mut config = alpha_config(&dir);
        config.keys.truncate(2);
        {
            let manager = ResourceManager::from_config(config.clone(), clock.clone()).await;
            for _ in 0..4 {
                manager.acquire_key("alpha", Complexity::Normal).await.unwrap();
            }
            assert!(manager.acquire_key("alpha", Complexity::Normal).await.is_none());
        }

        // a restart the same day keeps the keys exhausted
        let manager = ResourceManager::from_config(config.clone(), clock.clone()).await;
        assert!(manager.acquire_key("alpha", Complexity::Normal).await.is_none());

        clock.advance(Duration::from_secs(24 * 3600));
        let manager = ResourceManager::from_config(config, clock.clone()).await;
        assert!(manager.acquire_key("alpha", Complexity::Normal).await.is_some());
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ResourceManager::from_config(alpha_config(&dir), clock()).await;

        for _ in 0..4 {
            let key = manager.acquire_key("alpha", Complexity::Normal).await.unwrap();
            assert!(key.starts_with("alpha-flash-key-"));
        }
        assert_eq!(manager.availability("alpha"), ProjectAvailability::Available(1));

        // cheap tier gone, normal work falls through to the premium key
        assert_eq!(
            manager.acquire_key("alpha", Complexity::Normal).await.as_deref(),
            Some("alpha-sonnet-key-cccc")
        );
        assert_eq!(manager.availability("zeta"), ProjectAvailability::Unconfigured);

        let report = manager.status_report();
        let exhausted = report
            .for_project("alpha")
            .filter(|c| c.state == KeyState::Exhausted)
            .count();
        assert_eq!(exhausted, 2);
    }

    #[tokio::test]
    async fn test_auth_escalation_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let manager = ResourceManager::from_config(alpha_config(&dir), clock.clone()).await;

        for _ in 0..3 {
            manager.report_error("alpha-sonnet-key-cccc", "authentication_error");
        }
        manager.report_error("alpha-flash-key-aaaa", "rate_limit_reached");

        let report = manager.status_report();
        let sonnet = report.credentials.iter().find(|c| c.key_hint == "...cccc").unwrap();
        assert_eq!(sonnet.state, KeyState::CoolingDown);
        assert_eq!(
            sonnet.cooldown_until,
            Some(clock.now() + chrono::Duration::hours(4))
        );

        clock.advance(Duration::from_secs(5 * 60));
        let report = manager.status_report();
        let states: Vec<_> = report.credentials.iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            vec![KeyState::Available, KeyState::Available, KeyState::CoolingDown]
        );
    }

    #[tokio::test]
    async fn test_missing_config_yields_no_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys_config.json");
        let manager = ResourceManager::load(Some(&path), clock()).await;

        assert!(manager.acquire_key("alpha", Complexity::High).await.is_none());
        let report = manager.status_report();
        assert!(!report.is_configured());
        assert_eq!(report.source, RegistrySource::Missing);
    }

    #[tokio::test]
    async fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let usage = dir.path().join("usage.json");
        let path = dir.path().join("api_keys_config.json");
        let document = serde_json::json!({
            "keys": [
                {"key": "procore-key-0001", "model": "gemini-3-flash-preview", "project": "procore", "priority": 1}
            ],
            "global_limits": {"gemini-3-flash-preview": 1},
            "settings": {"usage_log_path": usage, "cooldown": "5m"}
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&document).unwrap()).unwrap();

        let manager = ResourceManager::load(Some(&path), clock()).await;
        assert_eq!(manager.registry().source(), &RegistrySource::File(path.clone()));
        assert_eq!(manager.health().policy().cooldown, Duration::from_secs(300));

        assert_eq!(
            manager.acquire_key("procore", Complexity::Normal).await.as_deref(),
            Some("procore-key-0001")
        );
        assert!(manager.acquire_key("procore", Complexity::Normal).await.is_none());
        assert_eq!(manager.availability("procore"), ProjectAvailability::Exhausted);
    }
}
