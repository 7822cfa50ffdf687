//! Turns the marketplace's relative "posted" phrases into instants.
//!
//! Only "N minutes ago" and "N hours ago" are understood. Anything else
//! ("yesterday", "2 days ago", "just now") resolves to the capture instant.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

/// Display format used in notifications, e.g. `2024-01-01 04:15 PM`.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %I:%M %p";

static MINUTES_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+minutes?\s+ago").expect("minutes pattern is valid"));
static HOURS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+hours?\s+ago").expect("hours pattern is valid"));

/// Resolve `phrase` against a fixed `now`.
pub fn resolve_posted_at(phrase: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = capture_amount(&MINUTES_AGO, phrase)
        .and_then(Duration::try_minutes)
        .or_else(|| capture_amount(&HOURS_AGO, phrase).and_then(Duration::try_hours));

    offset
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(now)
}

/// Resolve `phrase` against the current instant, captured once.
pub fn posted_at_from_now(phrase: &str) -> DateTime<Utc> {
    resolve_posted_at(phrase, Utc::now())
}

pub fn to_display_zone(instant: DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
    instant.with_timezone(&zone)
}

pub fn format_for_display(instant: DateTime<Utc>, zone: Tz) -> String {
    to_display_zone(instant, zone).format(DISPLAY_FORMAT).to_string()
}

/// Zone abbreviation in effect at `instant`, e.g. `EST` in January and
/// `EDT` in July for `America/New_York`.
pub fn zone_abbreviation(instant: DateTime<Utc>, zone: Tz) -> String {
    to_display_zone(instant, zone).format("%Z").to_string()
}

fn capture_amount(pattern: &Regex, phrase: &str) -> Option<i64> {
    pattern
        .captures(phrase)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_minutes_ago() {
        let resolved = resolve_posted_at("45 minutes ago", fixed_now());
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 1, 1, 11, 15, 0).unwrap());
    }

    #[test]
    fn test_hours_ago_inside_longer_phrase() {
        let resolved = resolve_posted_at("Posted 3 hours ago", fixed_now());
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_singular_units() {
        assert_eq!(
            resolve_posted_at("1 minute ago", fixed_now()),
            Utc.with_ymd_and_hms(2024, 1, 1, 11, 59, 0).unwrap()
        );
        assert_eq!(
            resolve_posted_at("1 hour ago", fixed_now()),
            Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unrecognized_phrases_fall_back_to_now() {
        for phrase in ["yesterday", "2 days ago", "just now", ""] {
            assert_eq!(resolve_posted_at(phrase, fixed_now()), fixed_now(), "{phrase}");
        }
    }

    #[test]
    fn test_absurd_amount_falls_back_to_now() {
        let resolved = resolve_posted_at("99999999999999999999 minutes ago", fixed_now());
        assert_eq!(resolved, fixed_now());
    }

    #[test]
    fn test_display_conversion() {
        let zone: Tz = "Asia/Karachi".parse().unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 11, 15, 0).unwrap();
        assert_eq!(format_for_display(instant, zone), "2024-01-01 04:15 PM");
    }

    #[test]
    fn test_abbreviation_follows_daylight_saving() {
        let zone: Tz = "America/New_York".parse().unwrap();
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 16, 0, 0).unwrap();

        assert_eq!(zone_abbreviation(winter, zone), "EST");
        assert_eq!(zone_abbreviation(summer, zone), "EDT");
        assert_eq!(format_for_display(winter, zone), "2024-01-15 12:00 PM");
        assert_eq!(format_for_display(summer, zone), "2024-07-15 12:00 PM");
    }
}
