//! Human duration-string parsing (spec §6).
//!
//! Accepts `"5 minutes and 39 seconds"`, `"1 hour and 2 minutes"`,
//! `"45 seconds"`, bare numerics (`"5.5"`, treated as minutes), and
//! `"HH:MM"` forms (minutes since start). Unparseable input yields `0.0`,
//! which downstream treats as an invalid measurement.

use regex::Regex;
use std::sync::OnceLock;

fn unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(hour|minute|second)").expect("valid regex")
    })
}

fn hhmm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+):(\d{2})$").expect("valid regex"))
}

fn bare_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid regex"))
}

/// Parses a human duration string into minutes. Returns `0.0` on any
/// parse failure rather than an error, matching the external-interface
/// contract that a failed parse is simply "no measurement".
pub fn parse_duration_minutes(input: &str) -> f64 {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    if bare_number_regex().is_match(trimmed) {
        return trimmed.parse::<f64>().unwrap_or(0.0);
    }

    if let Some(caps) = hhmm_regex().captures(trimmed) {
        let hh: f64 = caps[1].parse().unwrap_or(0.0);
        let mm: f64 = caps[2].parse().unwrap_or(0.0);
        return hh * 60.0 + mm;
    }

    let mut total_minutes = 0.0;
    let mut matched_any = false;
    for caps in unit_regex().captures_iter(trimmed) {
        let value: f64 = match caps[1].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        matched_any = true;
        match caps[2].to_lowercase().as_str() {
            "hour" => total_minutes += value * 60.0,
            "minute" => total_minutes += value,
            "second" => total_minutes += value / 60.0,
            _ => {}
        }
    }

    if matched_any {
        total_minutes
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes_and_seconds() {
        assert!((parse_duration_minutes("5 minutes and 39 seconds") - (5.0 + 39.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn parses_hour_and_minutes() {
        assert!((parse_duration_minutes("1 hour and 2 minutes") - 62.0).abs() < 1e-9);
    }

    #[test]
    fn parses_seconds_only() {
        assert!((parse_duration_minutes("45 seconds") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn parses_bare_number_as_minutes() {
        assert_eq!(parse_duration_minutes("5.5"), 5.5);
    }

    #[test]
    fn parses_hh_mm() {
        assert_eq!(parse_duration_minutes("1:23"), 83.0);
    }

    #[test]
    fn unparseable_yields_zero() {
        assert_eq!(parse_duration_minutes("garbage"), 0.0);
        assert_eq!(parse_duration_minutes(""), 0.0);
    }

    #[test]
    fn round_trip_minutes_and_seconds_exact() {
        for m in 0..5u32 {
            for s in 0..60u32 {
                let input = format!("{m} minutes and {s} seconds");
                let expected = m as f64 + s as f64 / 60.0;
                assert!((parse_duration_minutes(&input) - expected).abs() < 1e-9);
            }
        }
    }
}
