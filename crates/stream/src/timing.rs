use std::collections::VecDeque;
use std::time::Duration;

/// Rolling window of recent pass durations, with an optional time budget.
///
/// Passes longer than the budget are counted as overruns. The overrun and
/// pass totals cover every recorded pass, not just the window.
#[derive(Debug, Clone)]
pub struct PassTimer {
    window: VecDeque<Duration>,
    capacity: usize,
    budget: Option<Duration>,
    passes: u64,
    overruns: u64,
}

impl Default for PassTimer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl PassTimer {
    /// A zero capacity is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            budget: None,
            passes: 0,
            overruns: 0,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn set_budget(&mut self, budget: Option<Duration>) {
        self.budget = budget;
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Record one pass. Returns true if it ran over the budget.
    pub fn record(&mut self, elapsed: Duration) -> bool {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(elapsed);
        self.passes += 1;

        let over = self.budget.is_some_and(|budget| elapsed > budget);
        if over {
            self.overruns += 1;
        }
        over
    }

    pub fn average(&self) -> Duration {
        match self.window.len() {
            0 => Duration::ZERO,
            n => self.window.iter().sum::<Duration>() / n as u32,
        }
    }

    pub fn max(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.window.iter().copied().min().unwrap_or_default()
    }

    pub fn last(&self) -> Option<Duration> {
        self.window.back().copied()
    }

    /// Samples currently in the window.
    pub fn count(&self) -> usize {
        self.window.len()
    }

    /// Passes recorded since creation or the last [`clear`](Self::clear).
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Share of recorded passes that overran, in `0.0..=1.0`.
    pub fn overrun_rate(&self) -> f64 {
        if self.passes == 0 {
            0.0
        } else {
            self.overruns as f64 / self.passes as f64
        }
    }

    /// Forget every sample and total. The budget is kept.
    pub fn clear(&mut self) {
        self.window.clear();
        self.passes = 0;
        self.overruns = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn window_stats() {
        let mut timer = PassTimer::new(3);
        for v in [10, 20, 30] {
            timer.record(ms(v));
        }
        assert_eq!(timer.count(), 3);
        assert_eq!(timer.average(), ms(20));
        assert_eq!(timer.max(), ms(30));
        assert_eq!(timer.min(), ms(10));
        assert_eq!(timer.last(), Some(ms(30)));
    }

    #[test]
    fn oldest_sample_drops_out() {
        let mut timer = PassTimer::new(2);
        for v in [10, 20, 30] {
            timer.record(ms(v));
        }
        assert_eq!(timer.count(), 2);
        assert_eq!(timer.passes(), 3);
        assert_eq!(timer.average(), ms(25));
        assert_eq!(timer.min(), ms(20));
    }

    #[test]
    fn counts_budget_overruns() {
        let mut timer = PassTimer::new(2).with_budget(ms(15));
        assert!(!timer.record(ms(10)));
        assert!(!timer.record(ms(15)));
        assert!(timer.record(ms(40)));
        assert!(timer.record(ms(16)));

        // totals outlive the window
        assert_eq!(timer.count(), 2);
        assert_eq!(timer.overruns(), 2);
        assert_eq!(timer.overrun_rate(), 0.5);
    }

    #[test]
    fn no_budget_never_overruns() {
        let mut timer = PassTimer::default();
        assert!(!timer.record(Duration::from_secs(60)));
        assert_eq!(timer.overruns(), 0);
        assert_eq!(timer.budget(), None);
    }

    #[test]
    fn empty_and_cleared() {
        let mut timer = PassTimer::new(0).with_budget(ms(1));
        assert_eq!(timer.average(), Duration::ZERO);
        assert_eq!(timer.max(), Duration::ZERO);
        assert_eq!(timer.overrun_rate(), 0.0);
        timer.record(ms(5));
        assert_eq!(timer.count(), 1);
        timer.clear();
        assert_eq!(timer.count(), 0);
        assert_eq!(timer.passes(), 0);
        assert_eq!(timer.last(), None);
        assert_eq!(timer.budget(), Some(ms(1)));
    }
}
