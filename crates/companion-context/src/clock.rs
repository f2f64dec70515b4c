use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Time source shared by the presence watcher, idle scheduler and silence detection.
///
/// `now` is monotonic and only meaningful relative to other readings of the
/// same clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    /// Local wall-clock hour in `0..24`, used for time-of-day greetings.
    fn local_hour(&self) -> u8;
}

/// Real clock backed by `Instant` and the local UTC offset.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn local_hour(&self) -> u8 {
        // now_local fails when the offset cannot be determined soundly (multi-threaded unix)
        OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .hour()
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    hour: u8,
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_hour(hour: u8) -> Self {
        let clock = Self::new();
        clock.set_hour(hour);
        clock
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.now += by;
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    pub fn set_hour(&self, hour: u8) {
        if let Ok(mut state) = self.state.lock() {
            state.hour = hour % 24;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().map(|s| s.now).unwrap_or_default()
    }

    fn local_hour(&self) -> u8 {
        self.state.lock().map(|s| s.hour).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance_secs(3);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(3250));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::at_hour(7);
        let other = clock.clone();
        other.advance_secs(10);
        assert_eq!(clock.now(), Duration::from_secs(10));
        assert_eq!(clock.local_hour(), 7);
        other.set_hour(25);
        assert_eq!(clock.local_hour(), 1);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(clock.local_hour() < 24);
    }
}
