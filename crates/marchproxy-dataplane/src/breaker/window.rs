//! Fixed-capacity ring buffer of recent response-time samples, backing each
//! breaker's moving-average response time. Bounded capacity rather than an
//! unbounded swept time-keyed map -- old samples are overwritten, not
//! individually expired.

use std::time::Duration;

pub struct RingWindow {
    samples: Vec<Duration>,
    next: usize,
    len: usize,
}

impl RingWindow {
    pub fn new(capacity: usize) -> Self {
        Self { samples: vec![Duration::ZERO; capacity.max(1)], next: 0, len: 0 }
    }

    pub fn record(&mut self, sample: Duration) {
        let capacity = self.samples.len();
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
    }

    pub fn average(&self) -> Duration {
        if self.len == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().take(self.len).sum();
        total / self.len as u32
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_the_recorded_samples() {
        let mut window = RingWindow::new(3);
        window.record(Duration::from_millis(10));
        window.record(Duration::from_millis(20));
        window.record(Duration::from_millis(30));
        assert_eq!(window.average(), Duration::from_millis(20));
    }

    #[test]
    fn overwrites_the_oldest_sample_once_full() {
        let mut window = RingWindow::new(2);
        window.record(Duration::from_millis(10));
        window.record(Duration::from_millis(20));
        window.record(Duration::from_millis(30));
        assert_eq!(window.len(), 2);
        assert_eq!(window.average(), Duration::from_millis(25));
    }

    #[test]
    fn averages_to_zero_when_empty() {
        let window = RingWindow::new(5);
        assert_eq!(window.average(), Duration::ZERO);
    }
}
