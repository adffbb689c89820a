//! Composes the per-job dashboard message.

use crate::delivery::DeliveryProgress;
use crate::progress::{render_dashboard, ProgressSample};

/// Latest observation from each phase feeding the shared dashboard.
///
/// Compose order resolves races between late download polls and delivery
/// updates in one place: once delivery has reported, its view wins.
#[derive(Debug, Default)]
pub struct DashboardView {
    download: Option<ProgressSample>,
    processing: bool,
    delivery: Option<DeliveryProgress>,
}

impl DashboardView {
    pub fn set_download(&mut self, sample: ProgressSample) {
        self.download = Some(sample);
    }

    pub fn set_processing(&mut self) {
        self.processing = true;
    }

    pub fn set_delivery(&mut self, progress: DeliveryProgress) {
        self.delivery = Some(progress);
    }

    pub fn compose(&self) -> String {
        if let Some(delivery) = &self.delivery {
            return format!(
                "\u{1F4E4} Delivering\n{}/{} files sent",
                delivery.sent, delivery.total
            );
        }
        if self.processing {
            return "\u{2699} Processing files\u{2026}".to_string();
        }
        if let Some(sample) = &self.download {
            return render_dashboard("\u{2B07} Downloading", sample);
        }
        "Starting\u{2026}".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProgressSample {
        ProgressSample {
            bytes_total: 1000,
            bytes_done: 500,
            speed_bps: 100,
            eta_secs: Some(5),
            items_total: 2,
            items_finished: 1,
            active_name: None,
        }
    }

    #[test]
    fn empty_view_shows_starting() {
        assert_eq!(DashboardView::default().compose(), "Starting\u{2026}");
    }

    #[test]
    fn download_sample_renders_progress() {
        let mut view = DashboardView::default();
        view.set_download(sample());
        assert!(view.compose().contains("Downloading"));
        assert!(view.compose().contains("50.0%"));
    }

    #[test]
    fn processing_supersedes_download() {
        let mut view = DashboardView::default();
        view.set_download(sample());
        view.set_processing();
        assert!(view.compose().contains("Processing"));
    }

    #[test]
    fn delivery_wins_over_everything() {
        let mut view = DashboardView::default();
        view.set_download(sample());
        view.set_processing();
        view.set_delivery(DeliveryProgress { sent: 1, total: 3 });
        let text = view.compose();
        assert!(text.contains("Delivering"));
        assert!(text.contains("1/3"));
    }

    #[test]
    fn late_download_sample_does_not_demote_delivery() {
        let mut view = DashboardView::default();
        view.set_delivery(DeliveryProgress { sent: 2, total: 3 });
        view.set_download(sample());
        assert!(view.compose().contains("Delivering"));
    }
}
