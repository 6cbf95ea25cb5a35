//! Wall-clock timing for the duration counters.
//!
//! Durations are recorded in seconds, matching the
//! [`StatCollector`](crate::StatCollector) duration histograms.

use std::time::{Duration, Instant};

/// Started stopwatch.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    #[inline]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Return the elapsed seconds and start over.
    pub fn restart(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.start).as_secs_f64();
        self.start = now;
        elapsed
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Time a block and record its duration in seconds.
///
/// Usage:
/// ```ignore
/// let matches = time_stat!(inspector, stat_convergence_duration, {
///     align(&reference, &reading)
/// });
/// ```
#[macro_export]
macro_rules! time_stat {
    ($collector:expr, $record:ident, $block:expr) => {{
        let _timer = $crate::timing::Timer::start();

        let result = $block;

        $collector.$record(_timer.elapsed_secs());

        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerformanceConfig;
    use crate::StatCollector;

    #[test]
    fn test_timer_is_monotonic() {
        let mut timer = Timer::start();
        let first = timer.elapsed_secs();
        let second = timer.elapsed_secs();
        assert!(first >= 0.0);
        assert!(second >= first);

        let lap = timer.restart();
        assert!(lap >= second);
        assert!(timer.elapsed() <= Duration::from_secs(60));
    }

    #[test]
    fn test_time_stat_records_duration() {
        let mut stats = StatCollector::new(&PerformanceConfig::default()).unwrap();
        let value = time_stat!(stats, stat_convergence_duration, { 21 * 2 });
        assert_eq!(value, 42);

        let samples = stats.convergence_duration().samples();
        assert_eq!(samples.len(), 1);
        assert!(samples[0] >= 0.0);
    }
}
