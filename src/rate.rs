use std::time::{Duration, Instant};

/// Paces a polling loop at a fixed frequency.
///
/// Only the caller is throttled; producer threads are unaffected.
#[derive(Debug)]
pub struct Rate {
    period: Duration,
    next: Instant,
}

impl Rate {
    /// A rate of `hz` calls per second. `hz` of 0 is treated as 1.
    pub fn new(hz: u32) -> Self {
        let period = Duration::from_secs(1) / hz.max(1);
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    /// Sleep until the next period boundary.
    ///
    /// A caller that overran the period does not sleep and the schedule
    /// restarts from now, so late calls never burst to catch up.
    pub fn sleep(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            log::trace!("Rate overrun by {:?}", now - self.next);
            self.next = now + self.period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period() {
        assert_eq!(Rate::new(10).period, Duration::from_millis(100));
        assert_eq!(Rate::new(0).period, Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_paces_loop() {
        let mut rate = Rate::new(50);
        let start = Instant::now();
        for _ in 0..5 {
            rate.sleep();
        }
        // Five 20ms periods.
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[test]
    fn test_overrun_does_not_burst() {
        let mut rate = Rate::new(100);
        std::thread::sleep(Duration::from_millis(60));
        rate.sleep();
        let start = Instant::now();
        rate.sleep();
        // The second call waits a full period instead of returning at once.
        assert!(start.elapsed() >= Duration::from_millis(8));
    }
}
