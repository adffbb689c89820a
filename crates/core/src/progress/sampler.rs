use std::collections::VecDeque;

use crate::agent::DownloadStatus;

/// One aggregated progress observation over a job's downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub bytes_total: u64,
    pub bytes_done: u64,
    /// Smoothed transfer speed in bytes/second.
    pub speed_bps: u64,
    /// None while the speed is zero or the total is unknown.
    pub eta_secs: Option<u64>,
    pub items_total: usize,
    pub items_finished: usize,
    /// Name of the item currently transferring, if any.
    pub active_name: Option<String>,
}

impl ProgressSample {
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_done as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
    }

    pub fn all_finished(&self) -> bool {
        self.items_total > 0 && self.items_finished == self.items_total
    }
}

/// Rolling-window average over raw speed readings.
///
/// Instantaneous agent readings jitter heavily; averaging the last few
/// keeps the dashboard and the ETA stable.
#[derive(Debug)]
pub struct SpeedSmoother {
    window: VecDeque<u64>,
    capacity: usize,
}

impl SpeedSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Record a raw reading and return the current smoothed speed.
    pub fn push(&mut self, raw_bps: u64) -> u64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw_bps);
        let sum: u64 = self.window.iter().sum();
        sum / self.window.len() as u64
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Turns raw agent status rows into dashboard-ready samples.
pub struct ProgressSampler {
    smoother: SpeedSmoother,
}

impl Default for ProgressSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSampler {
    const SPEED_WINDOW: usize = 5;

    pub fn new() -> Self {
        Self {
            smoother: SpeedSmoother::new(Self::SPEED_WINDOW),
        }
    }

    pub fn sample(&mut self, statuses: &[DownloadStatus]) -> ProgressSample {
        let bytes_total: u64 = statuses.iter().map(|s| s.bytes_total).sum();
        let bytes_done: u64 = statuses.iter().map(|s| s.bytes_loaded).sum();
        let raw_speed: u64 = statuses.iter().map(|s| s.speed_bps).sum();
        let speed_bps = self.smoother.push(raw_speed);

        let items_finished = statuses.iter().filter(|s| s.finished).count();
        let active_name = statuses
            .iter()
            .find(|s| s.running && !s.finished)
            .map(|s| s.name.clone());

        let remaining = bytes_total.saturating_sub(bytes_done);
        let eta_secs = if speed_bps > 0 && bytes_total > 0 {
            Some(remaining / speed_bps)
        } else {
            None
        };

        ProgressSample {
            bytes_total,
            bytes_done,
            speed_bps,
            eta_secs,
            items_total: statuses.len(),
            items_finished,
            active_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::download_status;

    #[test]
    fn smoother_averages_over_window() {
        let mut s = SpeedSmoother::new(3);
        assert_eq!(s.push(100), 100);
        assert_eq!(s.push(200), 150);
        assert_eq!(s.push(300), 200);
        // 100 falls out of the window
        assert_eq!(s.push(400), 300);
    }

    #[test]
    fn sample_aggregates_across_items() {
        let mut sampler = ProgressSampler::new();
        let sample = sampler.sample(&[
            download_status(1, "a.mkv", 1000, 1000),
            download_status(2, "b.mkv", 1000, 500),
        ]);
        assert_eq!(sample.bytes_total, 2000);
        assert_eq!(sample.bytes_done, 1500);
        assert_eq!(sample.items_total, 2);
        assert!((sample.fraction() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_is_none_when_stalled() {
        let mut sampler = ProgressSampler::new();
        let sample = sampler.sample(&[download_status(1, "a.mkv", 1000, 100)]);
        assert_eq!(sample.speed_bps, 0);
        assert_eq!(sample.eta_secs, None);
    }

    #[test]
    fn eta_tracks_smoothed_speed() {
        let mut sampler = ProgressSampler::new();
        let mut status = download_status(1, "a.mkv", 10_000, 0);
        status.speed_bps = 1_000;
        status.running = true;
        let sample = sampler.sample(&[status]);
        assert_eq!(sample.eta_secs, Some(10));
        assert_eq!(sample.active_name.as_deref(), Some("a.mkv"));
    }

    #[test]
    fn finished_counts() {
        let mut sampler = ProgressSampler::new();
        let mut done = download_status(1, "a.mkv", 100, 100);
        done.finished = true;
        let sample = sampler.sample(&[done, download_status(2, "b.mkv", 100, 10)]);
        assert_eq!(sample.items_finished, 1);
        assert!(!sample.all_finished());
    }
}
