//! # Utility Functions and Helper Module
//!
//! Formatting helpers shared by the command-line front end and the output
//! writers.
//!
//! ## Usage Examples
//!
//! ```rust
//! use latency_postprocessor::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_packet_rate(19000.0), "19.0K pkt/s");
//! assert_eq!(table_separator(&[3, 1]), "+-----+---+\n");
//! ```

use std::time::Duration;

/// Format a duration in a human-readable way
///
/// Converts a Duration to a human-readable string, automatically selecting
/// the most appropriate unit based on the magnitude.
///
/// ## Unit Selection Logic
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "10m 2s", "2h 15m 30s")
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a duration given in (possibly fractional) seconds
///
/// Negative and non-finite values are shown as zero.
pub fn format_seconds(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return format_duration(Duration::ZERO);
    }
    format_duration(Duration::from_secs_f64(seconds))
}

/// Format a packet rate
///
/// ## Examples
///
/// - `950.0` -> "950 pkt/s"
/// - `19000.0` -> "19.0K pkt/s"
/// - `1_500_000.0` -> "1.5M pkt/s"
pub fn format_packet_rate(packets_per_second: f64) -> String {
    if packets_per_second < 1000.0 {
        format!("{:.0} pkt/s", packets_per_second)
    } else if packets_per_second < 1_000_000.0 {
        format!("{:.1}K pkt/s", packets_per_second / 1000.0)
    } else {
        format!("{:.1}M pkt/s", packets_per_second / 1_000_000.0)
    }
}

/// Render one table row
///
/// Each cell is left aligned and padded to its column width. Missing widths
/// default to 10.
pub fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        row.push_str(&format!(" {:width$} |", column, width = width));
    }
    row.push('\n');
    row
}

/// Render a table separator matching [`table_row`]
pub fn table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
        assert_eq!(format_duration(Duration::from_secs(602)), "10m 2s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.25), "250.00ms");
        assert_eq!(format_seconds(-1.0), "0ns");
        assert_eq!(format_seconds(f64::NAN), "0ns");
    }

    #[test]
    fn test_format_packet_rate() {
        assert_eq!(format_packet_rate(950.0), "950 pkt/s");
        assert_eq!(format_packet_rate(1900.0), "1.9K pkt/s");
        assert_eq!(format_packet_rate(1_500_000.0), "1.5M pkt/s");
    }

    #[test]
    fn test_table_rendering() {
        assert_eq!(table_row(&["a", "bc"], &[3, 2]), "| a   | bc |\n");
        assert_eq!(table_separator(&[3, 2]), "+-----+----+\n");
    }
}
