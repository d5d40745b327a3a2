//! Credentials
//!
//! A single API key: static attributes plus the runtime cell the router and
//! health monitor mutate.

use crate::router::ModelTier;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;

/// Number of trailing secret characters used as the ledger id
const KEY_ID_LEN: usize = 4;

/// Mutable per-key state
#[derive(Debug)]
pub(crate) struct CredentialState {
    /// End of the current cooldown, if any
    pub(crate) cooldown_until: Option<DateTime<Utc>>,

    /// Hard failures since the last success or escalation
    pub(crate) consecutive_errors: u32,

    /// Day `consumed_today` belongs to
    pub(crate) usage_day: NaiveDate,

    pub(crate) consumed_today: u32,

    /// Dispatch instants inside the trailing minute
    pub(crate) recent_dispatches: VecDeque<DateTime<Utc>>,
}

impl CredentialState {
    /// Usage for `today`, treating a stale day as zero
    fn consumed_on(&self, today: NaiveDate) -> u32 {
        if self.usage_day == today {
            self.consumed_today
        } else {
            0
        }
    }

    fn roll_to(&mut self, today: NaiveDate) {
        if self.usage_day != today {
            self.usage_day = today;
            self.consumed_today = 0;
        }
    }
}

/// A single API key with quota, priority and health tracking
pub struct Credential {
    /// The actual API key value
    secret: String,

    /// Non-sensitive correlation handle (trailing characters)
    key_id: String,

    model: String,
    project: String,
    tier: ModelTier,
    daily_limit: u32,
    priority: i32,
    rpm_limit: Option<u32>,

    state: Mutex<CredentialState>,
}

impl Credential {
    /// Create a credential with no usage recorded for `today`
    pub fn new(
        secret: impl Into<String>,
        model: impl Into<String>,
        project: impl Into<String>,
        tier: ModelTier,
        today: NaiveDate,
    ) -> Self {
        let secret = secret.into();
        let key_id = key_id_of(&secret);
        Self {
            secret,
            key_id,
            model: model.into(),
            project: project.into(),
            tier,
            daily_limit: 500,
            priority: 10,
            rpm_limit: None,
            state: Mutex::new(CredentialState {
                cooldown_until: None,
                consecutive_errors: 0,
                usage_day: today,
                consumed_today: 0,
                recent_dispatches: VecDeque::new(),
            }),
        }
    }

    /// Set the daily limit
    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    /// Set the priority (lower is preferred)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Cap dispatches per trailing minute
    pub fn with_rpm_limit(mut self, rpm: Option<u32>) -> Self {
        self.rpm_limit = rpm;
        self
    }

    /// Get the key value
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Short id used in the usage ledger
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Masked form for display, e.g. `...9f2c`
    pub fn key_hint(&self) -> String {
        format!("...{}", self.key_id)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn rpm_limit(&self) -> Option<u32> {
        self.rpm_limit
    }

    /// Units consumed on `today`
    pub fn consumed_today(&self, today: NaiveDate) -> u32 {
        self.state.lock().consumed_on(today)
    }

    /// Whether another unit fits in today's quota
    pub fn has_quota(&self, today: NaiveDate) -> bool {
        self.consumed_today(today) < self.daily_limit
    }

    /// Stored cooldown end; may already be in the past
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.state.lock().cooldown_until
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, CredentialState> {
        self.state.lock()
    }

    /// Charge one unit against `today`'s quota.
    ///
    /// Returns the new count, or `None` when the quota is already used up.
    pub(crate) fn try_consume(&self, today: NaiveDate) -> Option<u32> {
        let mut state = self.state.lock();
        state.roll_to(today);
        if state.consumed_today >= self.daily_limit {
            return None;
        }
        state.consumed_today += 1;
        Some(state.consumed_today)
    }

    /// Seed usage from the ledger
    pub(crate) fn restore_usage(&self, day: NaiveDate, count: u32) {
        let mut state = self.state.lock();
        state.usage_day = day;
        state.consumed_today = count;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &self.key_hint())
            .field("model", &self.model)
            .field("project", &self.project)
            .field("tier", &self.tier)
            .field("daily_limit", &self.daily_limit)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Trailing characters of a secret (the whole secret when shorter)
pub fn key_id_of(secret: &str) -> String {
    let len = secret.chars().count();
    secret.chars().skip(len.saturating_sub(KEY_ID_LEN)).collect()
}
