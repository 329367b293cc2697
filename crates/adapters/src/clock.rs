//! Clock adapters

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use txanda_ports::Clock;

/// Wall-clock time source
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven time source for tests and simulations
///
/// Holds the current instant as epoch milliseconds; `advance` and `set`
/// move it without any real waiting, which is how expired slots and
/// crashed holders are simulated.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Start at the unix epoch.
    pub fn at_epoch() -> Self {
        Self {
            now_ms: AtomicI64::new(0),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.now_ms.store(instant.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.now_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch();
        assert_eq!(clock.now().timestamp_millis(), 0);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now().timestamp_millis(), 1500);

        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now().timestamp_millis(), 31_500);
    }

    #[test]
    fn test_manual_clock_set_overrides() {
        let clock = ManualClock::at_epoch();
        let target = Utc.timestamp_millis_opt(987_654).unwrap();

        clock.set(target);
        assert_eq!(clock.now(), target);
    }
}
