//! Key Health Tracking
//!
//! Cooldown windows and failure escalation per credential. Expiry is checked
//! lazily on read; there is no background timer.

use crate::clock::{add_duration, Clock};
use crate::config::BalancerSettings;
use crate::registry::Credential;
use chrono::{DateTime, Utc};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Width of the dispatch window used for per-minute caps
const DISPATCH_WINDOW: Duration = Duration::from_secs(60);

/// Failure reported by a caller after using a key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Provider answered with a rate-limit signal
    RateLimitReached,

    /// Key rejected (invalid, revoked, no permission)
    AuthenticationError,

    /// Anything else, kept verbatim
    Other(String),
}

impl ErrorKind {
    /// Parse a reported error kind
    pub fn parse(kind: &str) -> Self {
        let normalized = kind.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "rate_limit_reached" | "rate_limit" | "rate_limited" | "too_many_requests" => {
                ErrorKind::RateLimitReached
            }
            "authentication_error" | "auth_error" | "auth" | "unauthorized" | "forbidden" => {
                ErrorKind::AuthenticationError
            }
            _ => ErrorKind::Other(kind.trim().to_string()),
        }
    }

    /// Classify an HTTP failure
    pub fn classify(status: u16, body: &str) -> Self {
        if status == 429 {
            return ErrorKind::RateLimitReached;
        }

        // Some providers return 400 or 403 with rate limit messages
        let lower_body = body.to_lowercase();
        if lower_body.contains("rate limit")
            || lower_body.contains("rate_limit")
            || lower_body.contains("too many requests")
            || lower_body.contains("quota exceeded")
            || lower_body.contains("resource_exhausted")
        {
            return ErrorKind::RateLimitReached;
        }

        match status {
            401 | 403 => ErrorKind::AuthenticationError,
            _ => ErrorKind::Other(format!("http_{}", status)),
        }
    }
}

impl FromStr for ErrorKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for ErrorKind {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimitReached => write!(f, "rate_limit_reached"),
            ErrorKind::AuthenticationError => write!(f, "authentication_error"),
            ErrorKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Cooldown lengths and escalation threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownPolicy {
    /// Applied on a rate-limit report
    pub cooldown: Duration,

    /// Consecutive hard failures that trigger `long_cooldown`
    pub max_errors: u32,

    /// Applied once `max_errors` is reached
    pub long_cooldown: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2 * 60),
            max_errors: 3,
            long_cooldown: Duration::from_secs(4 * 3600),
        }
    }
}

impl From<&BalancerSettings> for CooldownPolicy {
    fn from(settings: &BalancerSettings) -> Self {
        Self {
            cooldown: settings.cooldown,
            max_errors: settings.max_errors.max(1),
            long_cooldown: settings.long_cooldown,
        }
    }
}

/// Tracks and expires transient unavailability
#[derive(Debug)]
pub struct HealthMonitor {
    policy: CooldownPolicy,
    clock: Arc<dyn Clock>,
}

impl HealthMonitor {
    pub fn new(policy: CooldownPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Whether the credential is cooling down. Clears an expired cooldown.
    pub fn is_in_cooldown(&self, credential: &Credential) -> bool {
        let mut state = credential.state();
        match state.cooldown_until {
            Some(until) if self.clock.now() < until => true,
            Some(_) => {
                state.cooldown_until = None;
                debug!(key = %credential.key_hint(), "cooldown expired");
                false
            }
            None => false,
        }
    }

    /// Time left in the current cooldown
    pub fn cooldown_remaining(&self, credential: &Credential) -> Option<Duration> {
        let until = credential.cooldown_until()?;
        (until - self.clock.now()).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Apply a reported failure. Returns the cooldown end now in force when the
    /// report set or kept one; a longer running cooldown is never shortened.
    pub fn handle_error(&self, credential: &Credential, kind: &ErrorKind) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let mut state = credential.state();

        match kind {
            ErrorKind::RateLimitReached => {
                let until = later(
                    state.cooldown_until,
                    add_duration(now, self.policy.cooldown),
                );
                state.cooldown_until = Some(until);
                info!(
                    key = %credential.key_hint(),
                    project = %credential.project(),
                    until = %until,
                    "rate limit reported, key cooling down"
                );
                Some(until)
            }
            other => {
                state.consecutive_errors += 1;
                if state.consecutive_errors < self.policy.max_errors {
                    debug!(
                        key = %credential.key_hint(),
                        kind = %other,
                        errors = state.consecutive_errors,
                        "key failure recorded"
                    );
                    return None;
                }

                state.consecutive_errors = 0;
                let until = later(
                    state.cooldown_until,
                    add_duration(now, self.policy.long_cooldown),
                );
                state.cooldown_until = Some(until);
                warn!(
                    key = %credential.key_hint(),
                    project = %credential.project(),
                    kind = %other,
                    until = %until,
                    "repeated key failures, long cooldown applied"
                );
                Some(until)
            }
        }
    }

    /// Reset the failure streak after a successful call
    pub fn record_success(&self, credential: &Credential) {
        credential.state().consecutive_errors = 0;
    }

    /// Consecutive hard failures since the last success or escalation
    pub fn error_count(&self, credential: &Credential) -> u32 {
        credential.state().consecutive_errors
    }

    /// Whether the credential's per-minute cap is reached
    pub fn is_throttled(&self, credential: &Credential) -> bool {
        let Some(limit) = credential.rpm_limit() else {
            return false;
        };
        let now = self.clock.now();
        let mut state = credential.state();
        prune_window(&mut state.recent_dispatches, now);
        state.recent_dispatches.len() >= limit as usize
    }

    /// Record a dispatch for the per-minute window
    pub fn note_dispatch(&self, credential: &Credential) {
        if credential.rpm_limit().is_none() {
            return;
        }
        let now = self.clock.now();
        let mut state = credential.state();
        prune_window(&mut state.recent_dispatches, now);
        state.recent_dispatches.push_back(now);
    }
}

fn later(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    match current {
        Some(existing) if existing > candidate => existing,
        _ => candidate,
    }
}

fn prune_window(window: &mut std::collections::VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::seconds(DISPATCH_WINDOW.as_secs() as i64);
    while window.front().is_some_and(|t| *t <= cutoff) {
        window.pop_front();
    }
}
