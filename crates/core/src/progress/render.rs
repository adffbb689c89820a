//! Pure dashboard text rendering.
//!
//! Rendering never touches the messaging channel; callers diff the output
//! against the previously sent text and only edit on change.

use super::ProgressSample;

const BAR_CELLS: u64 = 10;

/// Moon phases from empty to full; intermediate phases render the
/// partially filled cell.
const PHASES: [&str; 5] = ["\u{1F311}", "\u{1F312}", "\u{1F313}", "\u{1F314}", "\u{1F315}"];

/// Ten-cell moon-phase progress bar. The filled cell count rounds down so
/// the bar never overstates progress.
pub fn progress_bar(fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let scaled = fraction * BAR_CELLS as f64;
    let full = scaled.floor() as u64;
    let remainder = scaled - full as f64;

    let mut bar = String::new();
    for _ in 0..full {
        bar.push_str(PHASES[4]);
    }
    if full < BAR_CELLS {
        let phase = (remainder * 4.0).floor() as usize;
        bar.push_str(PHASES[phase]);
        for _ in full + 1..BAR_CELLS {
            bar.push_str(PHASES[0]);
        }
    }
    bar
}

/// Human-readable size, 1024-based.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_duration(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn truncate_name(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    let kept: String = name.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}

/// Render the dashboard body for one job phase.
///
/// `label` is the phase heading ("Downloading", "Delivering", ...).
pub fn render_dashboard(label: &str, sample: &ProgressSample) -> String {
    let mut lines = Vec::with_capacity(6);
    lines.push(label.to_string());
    lines.push(format!(
        "{} {:.1}%",
        progress_bar(sample.fraction()),
        sample.fraction() * 100.0
    ));
    lines.push(format!(
        "{} / {}",
        format_size(sample.bytes_done),
        format_size(sample.bytes_total)
    ));
    lines.push(format!("{}/s", format_size(sample.speed_bps)));
    match sample.eta_secs {
        Some(eta) => lines.push(format!("ETA {}", format_duration(eta))),
        None => lines.push("ETA \u{2014}".to_string()),
    }
    if let Some(name) = &sample.active_name {
        lines.push(truncate_name(name, 40));
    }
    lines.push(format!(
        "{}/{} files",
        sample.items_finished, sample.items_total
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(done: u64, total: u64) -> ProgressSample {
        ProgressSample {
            bytes_total: total,
            bytes_done: done,
            speed_bps: 0,
            eta_secs: None,
            items_total: 1,
            items_finished: 0,
            active_name: None,
        }
    }

    #[test]
    fn bar_is_always_ten_cells() {
        for fraction in [0.0, 0.05, 0.33, 0.5, 0.949, 1.0] {
            assert_eq!(progress_bar(fraction).chars().count(), 10, "{fraction}");
        }
    }

    #[test]
    fn empty_and_full_bars() {
        assert_eq!(progress_bar(0.0), PHASES[0].repeat(10));
        assert_eq!(progress_bar(1.0), PHASES[4].repeat(10));
    }

    #[test]
    fn filled_cells_round_down() {
        // 94.9% fills nine cells, never ten.
        let bar = progress_bar(0.949);
        let full_moons = bar.chars().filter(|c| *c == '\u{1F315}').count();
        assert_eq!(full_moons, 9);
    }

    #[test]
    fn partial_cell_uses_intermediate_phase() {
        // 0.575 -> 5 full cells + 0.75 of a cell -> waxing gibbous.
        let bar = progress_bar(0.575);
        let chars: Vec<char> = bar.chars().collect();
        assert_eq!(chars[5], '\u{1F314}');
    }

    #[test]
    fn sizes_are_1024_based() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3720), "1h 2m");
    }

    #[test]
    fn dashboard_shows_dash_when_stalled() {
        let text = render_dashboard("Downloading", &sample(100, 1000));
        assert!(text.contains("ETA \u{2014}"));
        assert!(text.contains("10.0%"));
    }

    #[test]
    fn dashboard_truncates_long_names() {
        let mut s = sample(0, 1000);
        s.active_name = Some("a".repeat(120));
        let text = render_dashboard("Downloading", &s);
        let name_line = text.lines().nth(5).unwrap();
        assert!(name_line.chars().count() <= 40);
        assert!(name_line.ends_with('\u{2026}'));
    }
}
