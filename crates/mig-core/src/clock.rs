// crates/mig-core/src/clock.rs
// ============================================================================
// Module: Clock
// Description: Injectable wall-clock source.
// Purpose: Let lifecycle checks and follow loops run against a controlled time.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Components that compare against "now" take a [`Clock`] rather than calling
//! the system clock directly. [`SystemClock`] is the production source;
//! [`ManualClock`] is a settable source for tests and replay tooling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use time::Duration;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> OffsetDateTime;
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    /// Current instant.
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: OffsetDateTime) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = instant;
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
