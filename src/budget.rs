// Axel '0vercl0k' Souchet - October 4 2026
//! Wall clock budget of the large scans. The caller's budget is split
//! between them; a scan running out of time only truncates itself.
use std::cell::Cell;
use std::time::{Duration, Instant};

use tracing::debug;

/// How often (in iterations) a scan checks the clock.
pub const CHECK_INTERVAL_MASK: usize = 0x0fff;

/// A deadline; `None` means no budget. Once expired, it stays expired so a
/// scan that stopped early doesn't get restarted by the next one.
#[derive(Debug, Clone)]
pub struct Deadline {
    end: Option<Instant>,
    expired: Cell<bool>,
}

impl Deadline {
    #[must_use]
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            end: budget.map(|d| Instant::now() + d),
            expired: Cell::new(false),
        }
    }

    #[must_use]
    pub fn from_millis(budget_ms: Option<u64>) -> Self {
        Self::new(budget_ms.map(Duration::from_millis))
    }

    /// One of `parts` equal shares of `budget_ms`. Each large scan gets its
    /// own share, created right before it runs, so a scan that burns through
    /// its share doesn't starve the ones after it and the shares still add
    /// up to the whole budget.
    #[must_use]
    pub fn share(budget_ms: Option<u64>, parts: u32) -> Self {
        Self::new(budget_ms.map(|ms| Duration::from_millis(ms) / parts.max(1)))
    }

    /// No budget at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Has the budget been exhausted?
    #[must_use]
    pub fn expired(&self) -> bool {
        if self.expired.get() {
            return true;
        }

        let expired = self.end.is_some_and(|end| Instant::now() >= end);
        if expired {
            debug!("time budget exhausted");
            self.expired.set(true);
        }

        expired
    }

    /// Cheap version of [`Deadline::expired`] for hot loops: only looks at
    /// the clock every [`CHECK_INTERVAL_MASK`] + 1 iterations.
    #[must_use]
    pub fn expired_at(&self, iteration: usize) -> bool {
        if self.expired.get() {
            return true;
        }

        (iteration & CHECK_INTERVAL_MASK) == 0 && self.expired()
    }

    /// Did any scan run out of time?
    #[must_use]
    pub fn was_exhausted(&self) -> bool {
        self.expired.get()
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_expires() {
        let deadline = Deadline::unlimited();
        assert!(!deadline.expired());
        assert!(!deadline.expired_at(0));
        assert!(!deadline.was_exhausted());
    }

    #[test]
    fn shares_are_independent() {
        let first = Deadline::share(Some(0), 4);
        assert!(first.expired());
        assert!(first.was_exhausted());

        let second = Deadline::share(Some(60_000), 4);
        assert!(!second.expired());
        assert!(!second.was_exhausted());
        assert!(!Deadline::share(None, 0).expired());
    }

    #[test]
    fn zero_budget_expires_and_sticks() {
        let deadline = Deadline::from_millis(Some(0));
        // Only checked on the interval.
        assert!(!deadline.expired_at(1));
        assert!(deadline.expired_at(0));
        assert!(deadline.expired_at(1));
        assert!(deadline.was_exhausted());
    }
}
