//! Presentation unit conversion
//!
//! Numeric field values are rendered in the units a navigator expects:
//! speeds in knots, angles in degrees, temperatures in Celsius, durations as
//! `H:MM:SS` and day counts as calendar dates.

use chrono::{Days, NaiveDate};

/// Metres per second to knots
const MS_TO_KNOTS: f64 = 1.94384;

/// Kelvin offset of 0 °C
const KELVIN_OFFSET: f64 = 273.15;

/// Render `value`, expressed in `unit`, as display text
pub fn convert_unit(value: f64, unit: &str) -> String {
    match unit {
        "m/s" => format!("{:.2} kts", value * MS_TO_KNOTS),
        "rad" => format!("{:.1} deg", value.to_degrees()),
        "rad/s" => format!("{:.1} deg/s", value.to_degrees()),
        "K" => format!("{:.1} deg C", value - KELVIN_OFFSET),
        "s" => format_duration(value),
        "d" => format_date(value),
        "deg" => format_degrees_minutes(value),
        other => format!("{:.2} {}", value, other),
    }
}

/// Seconds as `H:MM:SS`; hours are not wrapped at 24
pub fn format_duration(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let total = seconds.abs().trunc() as u64;
    format!("{}{}:{:02}:{:02}", sign, total / 3600, (total / 60) % 60, total % 60)
}

/// Days since 1970-01-01 as `YYYY-MM-DD`
pub fn format_date(days: f64) -> String {
    let whole_days = days.floor();
    let date = NaiveDate::from_ymd_opt(1970, 1, 1).and_then(|epoch| {
        if whole_days >= 0.0 {
            epoch.checked_add_days(Days::new(whole_days as u64))
        } else {
            epoch.checked_sub_days(Days::new(whole_days.abs() as u64))
        }
    });

    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("{:.2} d", days),
    }
}

/// Decimal degrees as whole degrees plus decimal minutes
pub fn format_degrees_minutes(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    format!("{}{} deg {:.4} min", sign, degrees as u64, minutes)
}
