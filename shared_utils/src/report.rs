//! Report Module
//!
//! Boxed summary printed at the end of a batch.

use crate::batch::BatchCounts;
use crate::progress::{format_bytes, format_duration};
use std::time::Duration;

/// Size reduction in percent; 0 when there was no input.
pub fn size_reduction_percent(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    }
}

pub fn render_summary_report(
    counts: &BatchCounts,
    total: usize,
    duration: Duration,
    input_bytes: u64,
    output_bytes: u64,
    operation_name: &str,
) -> String {
    let rule = "═".repeat(60);
    let mut lines = Vec::new();

    lines.push(format!("╔{}╗", rule));
    lines.push(format!("  📊 {} Summary Report", operation_name));
    lines.push(format!("╠{}╣", rule));
    lines.push(format!(
        "  📁 Files Processed:  {:>10} of {}",
        counts.processed(),
        total
    ));
    lines.push(format!("  ✅ Succeeded:        {:>10}", counts.succeeded));
    lines.push(format!("  ❌ Failed:           {:>10}", counts.failed));
    lines.push(format!("  ⏭️  Skipped:          {:>10}", counts.skipped));
    lines.push(format!(
        "  📈 Success Rate:     {:>9.1}%",
        counts.success_rate()
    ));
    lines.push(format!("╠{}╣", rule));
    lines.push(format!("  💾 Input Size:       {:>10}", format_bytes(input_bytes)));
    lines.push(format!("  💾 Output Size:      {:>10}", format_bytes(output_bytes)));
    lines.push(format!(
        "  📉 Size Reduction:   {:>9.1}%",
        size_reduction_percent(input_bytes, output_bytes)
    ));
    lines.push(format!("╠{}╣", rule));
    lines.push(format!("  ⏱️  Total Time:       {:>10}", format_duration(duration)));
    lines.push(format!("╚{}╝", rule));

    lines.join("\n")
}

pub fn print_summary_report(
    counts: &BatchCounts,
    total: usize,
    duration: Duration,
    input_bytes: u64,
    output_bytes: u64,
    operation_name: &str,
) {
    println!();
    println!(
        "{}",
        render_summary_report(counts, total, duration, input_bytes, output_bytes, operation_name)
    );
}
