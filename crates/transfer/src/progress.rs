use std::time::Duration;

/// Display-ready progress for one side of a transfer.
///
/// Recomputed from session state after every chunk; has no side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// 0.0–100.0. An empty file is 100% from the start.
    pub percent: f64,
    /// Average bytes/second since the transfer started, or `None` when no
    /// time has elapsed yet.
    pub speed: Option<f64>,
    /// `"<transferred> / <total>"`, e.g. `"1.5 MB / 3.0 MB"`.
    pub label: String,
}

impl TransferProgress {
    /// Computes progress from cumulative bytes, total size and time elapsed
    /// since the transfer started.
    pub fn compute(bytes_transferred: u64, total_bytes: u64, elapsed: Duration) -> Self {
        let percent = if total_bytes == 0 {
            100.0
        } else {
            100.0 * bytes_transferred as f64 / total_bytes as f64
        };

        let secs = elapsed.as_secs_f64();
        let speed = (secs > 0.0).then(|| bytes_transferred as f64 / secs);

        Self {
            bytes_transferred,
            total_bytes,
            percent,
            speed,
            label: format!(
                "{} / {}",
                format_size(bytes_transferred),
                format_size(total_bytes)
            ),
        }
    }

    /// Speed formatted as `"<size>/s"`, if known.
    pub fn speed_label(&self) -> Option<String> {
        self.speed.map(|s| format!("{}/s", format_size(s as u64)))
    }
}

/// Formats a byte count with 1024-based units.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}
