//! Daily quota ledger for upstream API cost units.
//!
//! The upstream platform bills each API operation a fixed number of abstract
//! units against a per-day budget. [`QuotaLedger`] is the single authoritative
//! counter: reservations are atomic check-then-increment under one lock, and
//! units are consumed on attempt, never released on failure; the upstream
//! call itself spends the quota whether or not it succeeds.

use chrono::{NaiveDate, Utc};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error(
        "daily quota exceeded: {requested} units requested, {remaining} of {limit} remaining"
    )]
    Exceeded {
        requested: u64,
        remaining: u64,
        limit: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct DayWindow {
    date: NaiveDate,
    used: u64,
}

/// Tracks a consumable daily budget of cost units.
///
/// Safe under concurrent callers; the lock is never held across an await.
#[derive(Debug)]
pub struct QuotaLedger {
    daily_limit: u64,
    window: Mutex<DayWindow>,
}

impl QuotaLedger {
    #[must_use]
    pub fn new(daily_limit: u64) -> Self {
        Self {
            daily_limit,
            window: Mutex::new(DayWindow {
                date: Utc::now().date_naive(),
                used: 0,
            }),
        }
    }

    #[must_use]
    pub fn daily_limit(&self) -> u64 {
        self.daily_limit
    }

    /// Atomically reserve `units` against today's budget.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Exceeded`] when the reservation would push usage
    /// past the daily limit; usage is left unchanged in that case.
    pub fn reserve(&self, units: u64) -> Result<(), QuotaError> {
        self.reserve_at(units, Utc::now().date_naive())
    }

    /// Units still available today.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining_at(Utc::now().date_naive())
    }

    /// Units consumed today.
    #[must_use]
    pub fn used_today(&self) -> u64 {
        let mut window = self.window.lock().expect("quota lock poisoned");
        Self::roll_over(&mut window, Utc::now().date_naive());
        window.used
    }

    fn reserve_at(&self, units: u64, today: NaiveDate) -> Result<(), QuotaError> {
        let mut window = self.window.lock().expect("quota lock poisoned");
        Self::roll_over(&mut window, today);
        let would_use = window.used.saturating_add(units);
        if would_use > self.daily_limit {
            return Err(QuotaError::Exceeded {
                requested: units,
                remaining: self.daily_limit - window.used,
                limit: self.daily_limit,
            });
        }
        window.used = would_use;
        Ok(())
    }

    fn remaining_at(&self, today: NaiveDate) -> u64 {
        let mut window = self.window.lock().expect("quota lock poisoned");
        Self::roll_over(&mut window, today);
        self.daily_limit - window.used
    }

    // Day boundary resets the counter on first touch of the new date.
    fn roll_over(window: &mut DayWindow, today: NaiveDate) {
        if window.date != today {
            tracing::info!(
                previous_date = %window.date,
                used = window.used,
                "quota window rolled over to new day"
            );
            window.date = today;
            window.used = 0;
        }
    }
}
