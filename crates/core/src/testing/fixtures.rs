//! Small builders for commonly needed test values.

use crate::agent::{DiscoveredItem, DownloadStatus, ItemId};

pub fn discovered_item(id: ItemId, name: &str, size_bytes: u64) -> DiscoveredItem {
    DiscoveredItem {
        id,
        name: name.to_string(),
        size_bytes,
        availability: "ONLINE".to_string(),
    }
}

pub fn download_status(id: ItemId, name: &str, total: u64, loaded: u64) -> DownloadStatus {
    DownloadStatus {
        id,
        name: name.to_string(),
        bytes_total: total,
        bytes_loaded: loaded,
        speed_bps: 0,
        eta_secs: None,
        finished: false,
        running: false,
        local_path: None,
    }
}
