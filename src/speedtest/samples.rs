use std::time::{Duration, Instant};

pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub time_offset_seconds: f64,
    pub value_mbps: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleView {
    pub samples: Vec<SpeedSample>,
    pub peak: f64,
    pub version: u64,
}

#[derive(Debug)]
pub struct SampleAccumulator {
    samples: Vec<SpeedSample>,
    peak: f64,
    version: u64,
    window: Duration,
    last_signal: Option<Instant>,
}

impl Default for SampleAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

impl SampleAccumulator {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: Vec::new(),
            peak: 0.0,
            version: 0,
            window,
            last_signal: None,
        }
    }

    pub fn push(&mut self, value_mbps: f64, elapsed_seconds: f64) {
        self.push_at(value_mbps, elapsed_seconds, Instant::now());
    }

    /// Records every sample, but moves `version` at most once per window.
    pub fn push_at(&mut self, value_mbps: f64, elapsed_seconds: f64, now: Instant) {
        self.samples.push(SpeedSample {
            time_offset_seconds: elapsed_seconds,
            value_mbps,
        });
        self.peak = self.peak.max(value_mbps);

        let due = match self.last_signal {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        };
        if due {
            self.signal(now);
        }
    }

    pub fn flush(&mut self) {
        self.signal(Instant::now());
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.peak = 0.0;
        self.last_signal = None;
        // Bumped so a renderer holding the old version notices the clear.
        self.version += 1;
    }

    pub fn samples(&self) -> &[SpeedSample] {
        &self.samples
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn view(&self) -> SampleView {
        SampleView {
            samples: self.samples.clone(),
            peak: self.peak,
            version: self.version,
        }
    }

    fn signal(&mut self, now: Instant) {
        self.version += 1;
        self.last_signal = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(250);

    #[test]
    fn pushes_within_window_bump_version_once() {
        let mut acc = SampleAccumulator::new(WINDOW);
        let start = Instant::now();

        for i in 0..50 {
            acc.push_at(i as f64, i as f64 * 0.001, start + Duration::from_millis(i * 4));
        }

        assert_eq!(acc.samples().len(), 50);
        assert_eq!(acc.version(), 1);
        assert_eq!(acc.peak(), 49.0);
    }

    #[test]
    fn next_window_bumps_again() {
        let mut acc = SampleAccumulator::new(WINDOW);
        let start = Instant::now();

        acc.push_at(10.0, 0.0, start);
        acc.push_at(20.0, 0.1, start + Duration::from_millis(249));
        assert_eq!(acc.version(), 1);

        acc.push_at(5.0, 0.3, start + Duration::from_millis(250));
        assert_eq!(acc.version(), 2);
        acc.push_at(6.0, 0.4, start + Duration::from_millis(400));
        assert_eq!(acc.version(), 2);

        assert_eq!(acc.peak(), 20.0);
        assert_eq!(acc.samples().last().map(|s| s.value_mbps), Some(6.0));
    }

    #[test]
    fn flush_always_bumps_exactly_once() {
        let mut acc = SampleAccumulator::new(WINDOW);
        acc.push(12.0, 0.5);
        let before = acc.version();

        acc.flush();
        assert_eq!(acc.version(), before + 1);
        acc.flush();
        assert_eq!(acc.version(), before + 2);
    }

    #[test]
    fn flush_restarts_the_window() {
        let mut acc = SampleAccumulator::new(WINDOW);
        let start = Instant::now();
        acc.flush();
        let after_flush = acc.version();

        acc.push_at(1.0, 0.0, start);
        assert_eq!(acc.version(), after_flush);
    }

    #[test]
    fn reset_clears_samples_peak_and_clock() {
        let mut acc = SampleAccumulator::new(WINDOW);
        let start = Instant::now();
        acc.push_at(80.0, 1.0, start);
        acc.push_at(90.0, 2.0, start + Duration::from_millis(10));

        acc.reset();
        assert!(acc.samples().is_empty());
        assert_eq!(acc.peak(), 0.0);

        let version = acc.version();
        acc.push_at(3.0, 0.0, start + Duration::from_millis(20));
        assert_eq!(acc.version(), version + 1, "throttle clock was not cleared");

        let view = acc.view();
        assert_eq!(view.samples, [SpeedSample { time_offset_seconds: 0.0, value_mbps: 3.0 }]);
        assert_eq!(view.peak, 3.0);
    }
}
