//! Elapsed-time formatting for transport controls and result cards
//!
//! All formatters are total: non-finite or negative input never panics and
//! renders as a zero clock.

/// Placeholder rendered before metadata provides a usable value
pub const ZERO_CLOCK: &str = "00:00";

/// Format a position in seconds as `MM:SS`.
///
/// Minutes are not wrapped into hours, so a 75 minute episode reads `75:00`.
/// Fractional seconds are truncated.
///
/// # Examples
///
/// ```
/// use earshot_common::human_time::format_elapsed;
///
/// assert_eq!(format_elapsed(65.0), "01:05");
/// assert_eq!(format_elapsed(f64::NAN), "00:00");
/// assert_eq!(format_elapsed(4500.9), "75:00");
/// ```
pub fn format_elapsed(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return ZERO_CLOCK.to_string();
    }

    let total = seconds.floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Format a millisecond offset (e.g. a search hit's start position) as `MM:SS`.
pub fn format_offset_ms(offset_ms: f64) -> String {
    format_elapsed(offset_ms / 1000.0)
}

/// Render a duration as a rounded minute label, e.g. `"42 min"`.
pub fn format_minutes_label(duration_seconds: f64) -> String {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return "0 min".to_string();
    }
    format!("{} min", (duration_seconds / 60.0).round() as u64)
}
