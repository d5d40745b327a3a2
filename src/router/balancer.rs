//! Key Selection
//!
//! Picks one credential per request:
//!
//! 1. keep the project's keys that are out of cooldown, not throttled and
//!    under today's quota;
//! 2. unless the request is high complexity, keep only economy-tier keys
//!    when there are any;
//! 3. keep the keys sharing the lowest priority value;
//! 4. choose one of them at random;
//! 5. charge it one unit and persist the new count before returning.
//!
//! Steps 1-5 up to the ledger write run under one lock, so two callers can
//! never both take the last unit of a key.

use crate::clock::Clock;
use crate::error::KeywardError;
use crate::health::HealthMonitor;
use crate::ledger::UsageLedger;
use crate::registry::{Credential, KeyRegistry};
use crate::report::ProjectAvailability;
use crate::router::tier::{Complexity, ModelTier};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, warn};

/// A credential handed out by the router
#[derive(Debug)]
pub struct Selection {
    /// The chosen key
    pub credential: Arc<Credential>,

    /// Units consumed today including this one
    pub consumed: u32,

    /// Set when the usage increment could not be persisted
    pub ledger_warning: Option<KeywardError>,
}

/// Quota, health and cost aware key router
#[derive(Debug)]
pub struct Router {
    registry: Arc<KeyRegistry>,
    health: Arc<HealthMonitor>,
    ledger: Arc<UsageLedger>,
    clock: Arc<dyn Clock>,

    /// Tie-break RNG; its lock is also the selection critical section
    rng: Mutex<StdRng>,
}

impl Router {
    /// Create a router. `seed` makes the tie-break reproducible.
    pub fn new(
        registry: Arc<KeyRegistry>,
        health: Arc<HealthMonitor>,
        ledger: Arc<UsageLedger>,
        clock: Arc<dyn Clock>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            registry,
            health,
            ledger,
            clock,
            rng: Mutex::new(rng),
        }
    }

    /// Select a key for `project` and charge it one unit.
    ///
    /// `None` means every key of the project is exhausted, cooling down or
    /// throttled (or the project has none); see [`Router::availability`].
    pub async fn select(&self, project: &str, complexity: Complexity) -> Option<Selection> {
        let (credential, day, consumed) = self.pick(project, complexity)?;

        debug!(
            project,
            complexity = %complexity,
            key = %credential.key_hint(),
            model = %credential.model(),
            consumed,
            limit = credential.daily_limit(),
            "key selected"
        );

        let ledger_warning = match self.ledger.record(credential.key_id(), day, consumed).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    key = %credential.key_hint(),
                    error = %e,
                    "usage increment not persisted, quota may be under-counted after restart"
                );
                Some(e)
            }
        };

        Some(Selection {
            credential,
            consumed,
            ledger_warning,
        })
    }

    /// In-memory part of the selection, under the selection lock
    fn pick(&self, project: &str, complexity: Complexity) -> Option<(Arc<Credential>, NaiveDate, u32)> {
        let mut rng = self.rng.lock();
        let today = self.clock.today();

        let mut candidates: Vec<&Arc<Credential>> = self
            .registry
            .for_project(project)
            .filter(|c| !self.health.is_in_cooldown(c))
            .filter(|c| c.has_quota(today))
            .filter(|c| !self.health.is_throttled(c))
            .collect();

        if candidates.is_empty() {
            warn!(
                project,
                complexity = %complexity,
                "no usable key: every key of the project is exhausted, cooling down or throttled"
            );
            return None;
        }

        // Premium keys are reserved for high-complexity requests
        if complexity != Complexity::High {
            let economy: Vec<&Arc<Credential>> = candidates
                .iter()
                .copied()
                .filter(|c| c.tier() == ModelTier::Economy)
                .collect();
            if !economy.is_empty() {
                candidates = economy;
            }
        }

        let best = candidates.iter().map(|c| c.priority()).min()?;
        candidates.retain(|c| c.priority() == best);

        let chosen = Arc::clone(candidates.choose(&mut *rng)?);
        let consumed = chosen.try_consume(today)?;
        self.health.note_dispatch(&chosen);

        Some((chosen, today, consumed))
    }

    /// Why `select` would (or would not) return a key for `project` right now
    pub fn availability(&self, project: &str) -> ProjectAvailability {
        let today = self.clock.today();
        let mut total = 0usize;
        let mut exhausted = 0usize;
        let mut usable = 0usize;

        for credential in self.registry.for_project(project) {
            total += 1;
            if !credential.has_quota(today) {
                exhausted += 1;
            } else if !self.health.is_in_cooldown(credential)
                && !self.health.is_throttled(credential)
            {
                usable += 1;
            }
        }

        match (total, usable) {
            (0, _) => ProjectAvailability::Unconfigured,
            (_, n) if n > 0 => ProjectAvailability::Available(n),
            _ if exhausted == total => ProjectAvailability::Exhausted,
            _ => ProjectAvailability::CoolingDown,
        }
    }
}
