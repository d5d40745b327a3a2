//! Status Reports
//!
//! Operator-facing view of every credential. Secrets only ever appear as
//! their masked suffix.

use crate::clock::Clock;
use crate::health::HealthMonitor;
use crate::registry::{KeyRegistry, RegistrySource};
use crate::router::ModelTier;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Current usability of one credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Available,
    /// Today's quota is used up
    Exhausted,
    /// Excluded until its cooldown ends
    CoolingDown,
    /// Per-minute cap reached
    Throttled,
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Available => write!(f, "available"),
            KeyState::Exhausted => write!(f, "exhausted"),
            KeyState::CoolingDown => write!(f, "cooling down"),
            KeyState::Throttled => write!(f, "throttled"),
        }
    }
}

/// Whether a project can currently be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "keys", rename_all = "snake_case")]
pub enum ProjectAvailability {
    /// The project has no configured credentials
    Unconfigured,
    /// This many credentials can serve a request now
    Available(usize),
    /// Every credential has used up today's quota
    Exhausted,
    /// Credentials have quota left but are cooling down or throttled
    CoolingDown,
}

impl fmt::Display for ProjectAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectAvailability::Unconfigured => write!(f, "no credentials configured"),
            ProjectAvailability::Available(n) => write!(f, "{} key(s) available", n),
            ProjectAvailability::Exhausted => write!(f, "daily quota exhausted"),
            ProjectAvailability::CoolingDown => write!(f, "all keys cooling down"),
        }
    }
}

/// One line of the report
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub project: String,
    pub model: String,
    pub tier: ModelTier,
    /// Masked key, e.g. `...9f2c`
    pub key_hint: String,
    pub consumed: u32,
    pub daily_limit: u32,
    pub priority: i32,
    pub state: KeyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Snapshot of every credential's usage and health
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub day: NaiveDate,
    pub source: RegistrySource,
    pub credentials: Vec<CredentialStatus>,
    pub ledger_write_failures: u64,
}

impl StatusReport {
    /// Build a report from the live registry
    pub fn collect(
        registry: &KeyRegistry,
        health: &HealthMonitor,
        clock: &dyn Clock,
        ledger_write_failures: u64,
    ) -> Self {
        let day = clock.today();
        let credentials = registry
            .iter()
            .map(|c| {
                let consumed = c.consumed_today(day);
                let cooling = health.is_in_cooldown(c);
                let state = if consumed >= c.daily_limit() {
                    KeyState::Exhausted
                } else if cooling {
                    KeyState::CoolingDown
                } else if health.is_throttled(c) {
                    KeyState::Throttled
                } else {
                    KeyState::Available
                };

                CredentialStatus {
                    project: c.project().to_string(),
                    model: c.model().to_string(),
                    tier: c.tier(),
                    key_hint: c.key_hint(),
                    consumed,
                    daily_limit: c.daily_limit(),
                    priority: c.priority(),
                    state,
                    cooldown_until: if cooling { c.cooldown_until() } else { None },
                }
            })
            .collect();

        Self {
            generated_at: clock.now(),
            day,
            source: registry.source().clone(),
            credentials,
            ledger_write_failures,
        }
    }

    /// Whether any credential is configured
    pub fn is_configured(&self) -> bool {
        !self.credentials.is_empty()
    }

    /// Lines for one project
    pub fn for_project<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a CredentialStatus> {
        self.credentials.iter().filter(move |c| c.project == project)
    }

    /// Availability of a project as seen by this snapshot
    pub fn project_availability(&self, project: &str) -> ProjectAvailability {
        let lines: Vec<_> = self.for_project(project).collect();
        if lines.is_empty() {
            return ProjectAvailability::Unconfigured;
        }

        let available = lines.iter().filter(|c| c.state == KeyState::Available).count();
        if available > 0 {
            ProjectAvailability::Available(available)
        } else if lines.iter().all(|c| c.state == KeyState::Exhausted) {
            ProjectAvailability::Exhausted
        } else {
            ProjectAvailability::CoolingDown
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "API usage report for {}", self.day)?;

        if !self.is_configured() {
            write!(f, "no credentials configured ({})", self.source)?;
            return Ok(());
        }

        for c in &self.credentials {
            write!(
                f,
                "\n[{}] {}({}): {}/{} {}",
                c.project, c.model, c.key_hint, c.consumed, c.daily_limit, c.state
            )?;
            if let Some(until) = c.cooldown_until {
                write!(f, " until {}", until.format("%H:%M:%S UTC"))?;
            }
        }

        if self.ledger_write_failures > 0 {
            write!(
                f,
                "\nwarning: {} usage ledger write(s) failed",
                self.ledger_write_failures
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{KeyEntry, KeysConfig};
    use crate::health::{CooldownPolicy, ErrorKind};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn setup(entries: Vec<KeyEntry>) -> (Arc<ManualClock>, KeyRegistry, HealthMonitor) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap(),
        ));
        let config = KeysConfig {
            keys: entries,
            ..KeysConfig::default()
        };
        let registry = KeyRegistry::from_config(&config, RegistrySource::Inline, clock.today());
        let health = HealthMonitor::new(CooldownPolicy::default(), clock.clone());
        (clock, registry, health)
    }

    #[test]
    fn test_report_states_and_masking() {
        let (clock, registry, health) = setup(vec![
            KeyEntry::new("sk-secret-value-aaaa", "gemini-3-flash-preview", "alpha").daily_limit(2),
            KeyEntry::new("sk-secret-value-bbbb", "claude-3-sonnet", "alpha"),
            KeyEntry::new("sk-secret-value-cccc", "gemini-3-flash-preview", "hibou"),
        ]);
        registry.credentials()[0].restore_usage(clock.today(), 2);
        health.handle_error(&registry.credentials()[1], &ErrorKind::RateLimitReached);

        let report = StatusReport::collect(&registry, &health, clock.as_ref(), 0);
        let states: Vec<_> = report.credentials.iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            vec![KeyState::Exhausted, KeyState::CoolingDown, KeyState::Available]
        );
        assert!(report.credentials[1].cooldown_until.is_some());

        let text = report.to_string();
        assert!(text.contains("[alpha] gemini-3-flash-preview(...aaaa): 2/2 exhausted"));
        assert!(text.contains("cooling down until 10:02:00 UTC"));
        assert!(!text.contains("sk-secret"));

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("\"key_hint\":\"...cccc\""));
    }

    #[test]
    fn test_project_availability() {
        let (clock, registry, health) = setup(vec![
            KeyEntry::new("key-one-0001", "gemini-3-flash-preview", "alpha").daily_limit(1),
            KeyEntry::new("key-two-0002", "gemini-3-flash-preview", "alpha").daily_limit(1),
        ]);
        let report = StatusReport::collect(&registry, &health, clock.as_ref(), 0);
        assert_eq!(report.project_availability("alpha"), ProjectAvailability::Available(2));
        assert_eq!(report.project_availability("beta"), ProjectAvailability::Unconfigured);

        registry.credentials()[0].restore_usage(clock.today(), 1);
        health.handle_error(&registry.credentials()[1], &ErrorKind::RateLimitReached);
        let report = StatusReport::collect(&registry, &health, clock.as_ref(), 0);
        assert_eq!(report.project_availability("alpha"), ProjectAvailability::CoolingDown);

        registry.credentials()[1].restore_usage(clock.today(), 1);
        let report = StatusReport::collect(&registry, &health, clock.as_ref(), 0);
        assert_eq!(report.project_availability("alpha"), ProjectAvailability::Exhausted);
    }

    #[test]
    fn test_empty_registry_renders_distinctly() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap());
        let registry = KeyRegistry::from_config(
            &KeysConfig::default(),
            RegistrySource::Invalid("Failed to parse keys.json".to_string()),
            clock.today(),
        );
        let health = HealthMonitor::new(
            CooldownPolicy::default(),
            Arc::new(ManualClock::new(clock.now())),
        );
        let report = StatusReport::collect(&registry, &health, &clock, 3);

        assert!(!report.is_configured());
        let text = report.to_string();
        assert!(text.contains(
            "no credentials configured (configuration rejected: Failed to parse keys.json)"
        ));
    }
}
