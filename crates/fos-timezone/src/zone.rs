//! Zone Calendar Math
//!
//! Everything the spoofer knows about a zone comes from here: calendar
//! fields of an instant in that zone, the offset reconstructed from
//! those fields, and display names. Offset and canonical rendering are
//! both derived from the same [`ZonedFields`], which keeps their digits
//! in agreement.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

/// Zone math failures. Never shown to pages; callers fall back to the
/// unspoofed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("Unknown zone identifier: {0}")]
    UnknownZone(String),

    #[error("Calendar fields out of range: {0}")]
    OutOfRange(String),
}

/// Parse an IANA zone identifier.
pub fn resolve(zone_id: &str) -> Result<Tz, ZoneError> {
    zone_id
        .trim()
        .parse::<Tz>()
        .map_err(|_| ZoneError::UnknownZone(zone_id.to_string()))
}

/// Check that a provider answer names a zone the formatter accepts.
pub fn is_valid_zone(zone_id: &str) -> bool {
    !zone_id.trim().is_empty() && resolve(zone_id).is_ok()
}

/// Calendar view of one instant in one zone (second precision).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZonedFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: Weekday,
    /// Zone abbreviation in effect ("EST", "CEST", or numeric like "+03")
    pub abbreviation: String,
    /// The instant these fields describe, in UTC milliseconds
    pub instant_millis: i64,
}

impl ZonedFields {
    /// Compute the fields of `at` as seen in `zone`.
    pub fn at(zone: Tz, at: DateTime<Utc>) -> Self {
        let local = at.with_timezone(&zone);
        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
            weekday: local.weekday(),
            abbreviation: local.format("%Z").to_string(),
            instant_millis: at.timestamp_millis(),
        }
    }

    /// Offset in minutes west of UTC, from the wall-clock fields.
    pub fn minutes_west(&self) -> Result<i32, ZoneError> {
        let wall = self.as_utc_millis()?;
        let diff = (self.instant_millis - wall) as f64 / 60_000.0;
        Ok(diff.round() as i32)
    }

    /// Reinterpret the wall-clock fields as if they were UTC.
    pub fn as_utc_millis(&self) -> Result<i64, ZoneError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, self.minute, self.second))
            .map(|naive| naive.and_utc().timestamp_millis())
            .ok_or_else(|| {
                ZoneError::OutOfRange(format!(
                    "{}-{}-{} {}:{}:{}",
                    self.year, self.month, self.day, self.hour, self.minute, self.second
                ))
            })
    }
}

/// Offset of `zone` at `at`, in minutes west of UTC (platform convention:
/// New York in winter is `300`).
///
/// Built from calendar fields rather than the zone's offset table so that
/// it agrees with anything else rendered from the same fields.
pub fn offset_minutes_west(zone: Tz, at: DateTime<Utc>) -> Result<i32, ZoneError> {
    ZonedFields::at(zone, at).minutes_west()
}

/// `GMT-0500` style offset (sign east-positive).
pub fn gmt_offset(minutes_west: i32) -> String {
    let east = -minutes_west;
    let sign = if east >= 0 { '+' } else { '-' };
    let abs = east.unsigned_abs();
    format!("GMT{}{:02}{:02}", sign, abs / 60, abs % 60)
}

/// Short display name: the abbreviation, or `GMT+3` style for zones
/// whose abbreviation is numeric.
pub fn short_name(fields: &ZonedFields) -> String {
    match numeric_abbreviation(&fields.abbreviation) {
        Some((sign, hours, minutes)) if minutes == 0 => format!("GMT{}{}", sign, hours),
        Some((sign, hours, minutes)) => format!("GMT{}{}:{:02}", sign, hours, minutes),
        None => fields.abbreviation.clone(),
    }
}

/// Long display name ("Eastern Standard Time").
///
/// Abbreviations are ambiguous across regions ("CST" is both Chicago and
/// Shanghai), so names are keyed by abbreviation and zone id together.
/// Anything without a known name renders as `GMT+03:00`, built from the
/// same fields as the offset.
pub fn long_name(zone_id: &str, fields: &ZonedFields) -> String {
    let abbr = fields.abbreviation.as_str();
    if numeric_abbreviation(abbr).is_none() {
        let known = LONG_NAMES
            .iter()
            .find(|(a, scope, _)| *a == abbr && in_scope(zone_id, scope));
        if let Some((_, _, name)) = known {
            return name.to_string();
        }
    }

    match fields.minutes_west() {
        Ok(minutes_west) => gmt_long_offset(minutes_west),
        Err(_) => zone_id.to_string(),
    }
}

/// `GMT-05:00` style offset; plain `GMT` at zero.
fn gmt_long_offset(minutes_west: i32) -> String {
    if minutes_west == 0 {
        return "GMT".to_string();
    }
    let east = -minutes_west;
    let sign = if east > 0 { '+' } else { '-' };
    let abs = east.unsigned_abs();
    format!("GMT{}{:02}:{:02}", sign, abs / 60, abs % 60)
}

/// Empty scope matches any zone; entries ending in `/` match by prefix,
/// the rest exactly.
fn in_scope(zone_id: &str, scope: &[&str]) -> bool {
    scope.is_empty()
        || scope.iter().any(|entry| {
            zone_id == *entry || (entry.ends_with('/') && zone_id.starts_with(entry))
        })
}

/// Split "+03" / "-0330" into sign, hours, minutes.
fn numeric_abbreviation(abbr: &str) -> Option<(char, u32, u32)> {
    let mut chars = abbr.chars();
    let sign = chars.next().filter(|c| *c == '+' || *c == '-')?;
    let digits: &str = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (h, m) = match digits.len() {
        1 | 2 => (digits, "0"),
        4 => digits.split_at(2),
        _ => return None,
    };
    Some((sign, h.parse().ok()?, m.parse().ok()?))
}

/// Three-letter English weekday
pub fn weekday_short(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Full English weekday
pub fn weekday_long(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Full English month name (1-based)
pub fn month_long(month: u32) -> &'static str {
    MONTHS[(month.clamp(1, 12) - 1) as usize]
}

/// Three-letter English month name (1-based)
pub fn month_short(month: u32) -> &'static str {
    &month_long(month)[..3]
}

const ANY: &[&str] = &[];
const NORTH_AMERICA: &[&str] = &[
    "America/", "US/", "Canada/", "Mexico/", "EST5EDT", "CST6CDT", "MST7MDT", "PST8PDT", "EST", "MST",
];
const CHINA: &[&str] = &["Asia/Shanghai", "Asia/Chongqing", "Asia/Chungking", "Asia/Harbin", "Asia/Macau", "Asia/Macao", "PRC"];
const TAIPEI: &[&str] = &["Asia/Taipei", "ROC"];
const CUBA: &[&str] = &["America/Havana", "Cuba"];
const INDIA: &[&str] = &["Asia/Kolkata", "Asia/Calcutta"];
const ISRAEL: &[&str] = &["Asia/Jerusalem", "Asia/Tel_Aviv", "Israel"];
const IRELAND: &[&str] = &["Europe/Dublin", "Eire"];
const PHILIPPINES: &[&str] = &["Asia/Manila"];

/// (abbreviation, zones it names, long name), as browsers render
/// `timeZoneName: "long"`. Narrow scopes come before wide ones.
static LONG_NAMES: &[(&str, &[&str], &str)] = &[
    ("CST", CHINA, "China Standard Time"),
    ("CST", TAIPEI, "Taipei Standard Time"),
    ("CDT", TAIPEI, "Taipei Daylight Time"),
    ("CST", CUBA, "Cuba Standard Time"),
    ("CDT", CUBA, "Cuba Daylight Time"),
    ("PST", PHILIPPINES, "Philippine Standard Time"),
    ("PHT", PHILIPPINES, "Philippine Standard Time"),
    ("IST", INDIA, "India Standard Time"),
    ("IST", ISRAEL, "Israel Standard Time"),
    ("IDT", ISRAEL, "Israel Daylight Time"),
    ("IST", IRELAND, "Irish Standard Time"),
    ("PST", NORTH_AMERICA, "Pacific Standard Time"),
    ("PDT", NORTH_AMERICA, "Pacific Daylight Time"),
    ("MST", NORTH_AMERICA, "Mountain Standard Time"),
    ("MDT", NORTH_AMERICA, "Mountain Daylight Time"),
    ("CST", NORTH_AMERICA, "Central Standard Time"),
    ("CDT", NORTH_AMERICA, "Central Daylight Time"),
    ("EST", NORTH_AMERICA, "Eastern Standard Time"),
    ("EDT", NORTH_AMERICA, "Eastern Daylight Time"),
    ("AST", NORTH_AMERICA, "Atlantic Standard Time"),
    ("ADT", NORTH_AMERICA, "Atlantic Daylight Time"),
    ("NST", NORTH_AMERICA, "Newfoundland Standard Time"),
    ("NDT", NORTH_AMERICA, "Newfoundland Daylight Time"),
    ("AKST", NORTH_AMERICA, "Alaska Standard Time"),
    ("AKDT", NORTH_AMERICA, "Alaska Daylight Time"),
    ("HST", ANY, "Hawaii-Aleutian Standard Time"),
    ("HDT", ANY, "Hawaii-Aleutian Daylight Time"),
    ("UTC", ANY, "Coordinated Universal Time"),
    ("GMT", ANY, "Greenwich Mean Time"),
    ("BST", &["Europe/London", "Europe/Belfast", "Europe/Jersey", "Europe/Guernsey", "Europe/Isle_of_Man", "GB"], "British Summer Time"),
    ("WET", ANY, "Western European Standard Time"),
    ("WEST", ANY, "Western European Summer Time"),
    ("CET", ANY, "Central European Standard Time"),
    ("CEST", ANY, "Central European Summer Time"),
    ("EET", ANY, "Eastern European Standard Time"),
    ("EEST", ANY, "Eastern European Summer Time"),
    ("MSK", ANY, "Moscow Standard Time"),
    ("WAT", ANY, "West Africa Standard Time"),
    ("CAT", ANY, "Central Africa Time"),
    ("EAT", ANY, "East Africa Time"),
    ("SAST", ANY, "South Africa Standard Time"),
    ("PKT", ANY, "Pakistan Standard Time"),
    ("WIB", ANY, "Western Indonesia Time"),
    ("HKT", ANY, "Hong Kong Standard Time"),
    ("JST", ANY, "Japan Standard Time"),
    ("KST", ANY, "Korean Standard Time"),
    ("AEST", ANY, "Australian Eastern Standard Time"),
    ("AEDT", ANY, "Australian Eastern Daylight Time"),
    ("ACST", ANY, "Australian Central Standard Time"),
    ("ACDT", ANY, "Australian Central Daylight Time"),
    ("AWST", ANY, "Australian Western Standard Time"),
    ("NZST", ANY, "New Zealand Standard Time"),
    ("NZDT", ANY, "New Zealand Daylight Time"),
];
