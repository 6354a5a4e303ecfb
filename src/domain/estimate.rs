//! Processing-time estimation from input size.

use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// Assumed encoder throughput, in MB of input per minute.
pub const PROCESSING_RATE_MB_PER_MINUTE: f64 = 50.0;
pub const MIN_ESTIMATE_SECS: f64 = 10.0;
pub const MAX_ESTIMATE_SECS: f64 = 300.0;
/// Returned when the file cannot be inspected.
pub const FALLBACK_ESTIMATE_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingEstimate {
    pub file_size_mb: f64,
    pub estimated_seconds: u64,
    pub estimated_human_readable: String,
}

impl ProcessingEstimate {
    pub fn from_size(bytes: u64) -> Self {
        let file_size_mb = bytes as f64 / (1024.0 * 1024.0);
        let raw = file_size_mb / PROCESSING_RATE_MB_PER_MINUTE * 60.0;
        let estimated_seconds = raw.clamp(MIN_ESTIMATE_SECS, MAX_ESTIMATE_SECS).round() as u64;

        Self {
            file_size_mb: (file_size_mb * 100.0).round() / 100.0,
            estimated_seconds,
            estimated_human_readable: format_time(estimated_seconds),
        }
    }

    pub fn fallback() -> Self {
        Self {
            file_size_mb: 0.0,
            estimated_seconds: FALLBACK_ESTIMATE_SECS,
            estimated_human_readable: format_time(FALLBACK_ESTIMATE_SECS),
        }
    }
}

/// Estimate how long processing `path` will take. Never fails: an unreadable
/// file yields [`ProcessingEstimate::fallback`].
pub async fn estimate_processing_time(path: &Path) -> ProcessingEstimate {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => ProcessingEstimate::from_size(meta.len()),
        Ok(_) => {
            warn!(path = %path.display(), "Estimate requested for a non-file path");
            ProcessingEstimate::fallback()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error estimating processing time");
            ProcessingEstimate::fallback()
        }
    }
}

pub fn format_time(seconds: u64) -> String {
    if seconds < 60 {
        format!("{} secondes", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        format!("{} minute{}", minutes, if minutes > 1 { "s" } else { "" })
    } else {
        let hours = seconds / 3600;
        format!("{} heure{}", hours, if hours > 1 { "s" } else { "" })
    }
}
