//! Size / percentage / duration formatting for progress output and reports.

use std::time::Duration;

/// Up to two decimals with trailing zeros removed (`1.50` → `1.5`, `2.00` → `2`).
pub fn format_decimal(value: f64) -> String {
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 1024-based size: `512 B`, `1.5 KB`, `2.25 MB`, `1.1 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{} GB", format_decimal(bytes as f64 / GB as f64))
    } else if bytes >= MB {
        format!("{} MB", format_decimal(bytes as f64 / MB as f64))
    } else if bytes >= KB {
        format!("{} KB", format_decimal(bytes as f64 / KB as f64))
    } else {
        format!("{} B", bytes)
    }
}

/// Like [`format_bytes`] but renders a missing size as `N/A`.
pub fn format_optional_bytes(bytes: Option<u64>) -> String {
    bytes.map(format_bytes).unwrap_or_else(|| "N/A".to_string())
}

/// `60%`, `12.35%`, or `N/A` when unknown.
pub fn format_percentage(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{}%", format_decimal(v)),
        None => "N/A".to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
