//! Admission control: cooldown, daily quota and the per-user in-flight gate.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::Environment;
use crate::i18n::{Language, Text, render, text};
use crate::ledger::Ledger;
use crate::model::User;
use crate::store::RequestStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Minimum gap between two requests from the same user.
    pub cooldown: Duration,
    /// Successful requests per UTC day for non-premium users.
    pub daily_limit: u32,
}

impl AdmissionPolicy {
    pub const fn development() -> Self {
        Self { cooldown: Duration::from_secs(10), daily_limit: 100 }
    }

    pub const fn production() -> Self {
        Self { cooldown: Duration::from_secs(60), daily_limit: 3 }
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::development(),
            Environment::Production => Self::production(),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Cooldown { remaining_secs: u64 },
    DailyLimit { count: u32, limit: u32 },
    /// Another request from the same user is still running.
    InFlight,
}

impl Denial {
    /// Localized text for the requester.
    pub fn message(&self, language: Option<Language>) -> String {
        match *self {
            Denial::Cooldown { remaining_secs } => {
                render(language, Text::Cooldown, &[("seconds", &remaining_secs)])
            }
            Denial::DailyLimit { count, limit } => {
                render(language, Text::DailyLimit, &[("count", &count), ("limit", &limit)])
            }
            Denial::InFlight => text(language, Text::InFlight).to_owned(),
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::Cooldown { remaining_secs } => write!(f, "cooldown, {remaining_secs}s remaining"),
            Denial::DailyLimit { count, limit } => write!(f, "daily limit reached ({count}/{limit})"),
            Denial::InFlight => f.write_str("request already in flight"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(Denial),
}

pub struct RateLimiter<S> {
    policy: AdmissionPolicy,
    ledger: Ledger<S>,
}

impl<S: RequestStore> RateLimiter<S> {
    pub fn new(policy: AdmissionPolicy, ledger: Ledger<S>) -> Self {
        Self { policy, ledger }
    }

    /// Decide whether `user` may start a request at `now`.
    ///
    /// A ledger failure is returned as an error, never as a denial.
    pub async fn check(&self, user: &User, now: DateTime<Utc>) -> Result<Admission, sqlx::Error> {
        if let Some(last) = user.last_active_at {
            if let Some(remaining_secs) = cooldown_remaining(self.policy.cooldown, now, last) {
                return Ok(Admission::Denied(Denial::Cooldown { remaining_secs }));
            }
        }

        if user.is_premium(now) {
            return Ok(Admission::Allowed);
        }

        let count = self.ledger.count_today(user.id, now).await?;
        if count >= self.policy.daily_limit {
            return Ok(Admission::Denied(Denial::DailyLimit {
                count,
                limit: self.policy.daily_limit,
            }));
        }
        Ok(Admission::Allowed)
    }
}

/// Whole seconds left in the cooldown, rounded up, or `None` once it is over.
fn cooldown_remaining(cooldown: Duration, now: DateTime<Utc>, last: DateTime<Utc>) -> Option<u64> {
    // A last-activity in the future (clock skew) counts as "just now".
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    let remaining = cooldown.checked_sub(elapsed)?;
    if remaining.is_zero() {
        return None;
    }
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    Some(secs.max(1))
}

/// At most one request per user at a time.
#[derive(Debug, Clone, Default)]
pub struct InFlightGate {
    active: Arc<Mutex<HashSet<i64>>>,
}

impl InFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `user_id`, or `None` if it is already taken.
    pub fn try_acquire(&self, user_id: i64) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(user_id) {
            return None;
        }
        Some(InFlightGuard { gate: self.clone(), user_id })
    }
}

/// Releases the user's slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    gate: InFlightGate,
    user_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self.gate.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.user_id);
    }
}
