//! Locale-Aware Date/Time Formatter
//!
//! A compact `Intl.DateTimeFormat`-style formatter producing en-US
//! patterns. Plain formatting is always the concatenation of the
//! structured parts, so both output paths agree by construction.

use crate::zone::{self, ZoneError, ZonedFields};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Text width for weekday names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextStyle {
    Long,
    Short,
    Narrow,
}

/// Numeric width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumericStyle {
    Numeric,
    #[serde(rename = "2-digit")]
    TwoDigit,
}

/// Month presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MonthStyle {
    Numeric,
    #[serde(rename = "2-digit")]
    TwoDigit,
    Long,
    Short,
    Narrow,
}

impl MonthStyle {
    fn is_textual(self) -> bool {
        matches!(self, Self::Long | Self::Short | Self::Narrow)
    }
}

/// Zone name presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZoneNameStyle {
    Short,
    Long,
}

/// Caller-supplied formatting options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatOptions {
    pub time_zone: Option<String>,
    pub weekday: Option<TextStyle>,
    pub year: Option<NumericStyle>,
    pub month: Option<MonthStyle>,
    pub day: Option<NumericStyle>,
    pub hour: Option<NumericStyle>,
    pub minute: Option<NumericStyle>,
    pub second: Option<NumericStyle>,
    pub hour12: Option<bool>,
    pub time_zone_name: Option<ZoneNameStyle>,
}

impl FormatOptions {
    /// Options naming only a zone
    pub fn in_zone(zone_id: &str) -> Self {
        Self {
            time_zone: Some(zone_id.to_string()),
            ..Self::default()
        }
    }

    fn has_date(&self) -> bool {
        self.weekday.is_some() || self.year.is_some() || self.month.is_some() || self.day.is_some()
    }

    fn has_time(&self) -> bool {
        self.hour.is_some() || self.minute.is_some() || self.second.is_some()
    }

    fn with_default_date(mut self) -> Self {
        self.year = Some(NumericStyle::Numeric);
        self.month = Some(MonthStyle::Numeric);
        self.day = Some(NumericStyle::Numeric);
        self
    }

    fn with_default_time(mut self) -> Self {
        self.hour = Some(NumericStyle::Numeric);
        self.minute = Some(NumericStyle::TwoDigit);
        self.second = Some(NumericStyle::TwoDigit);
        self
    }

    /// Fill in the fields a formatter shows when none were requested.
    pub fn with_defaults(self, defaults: Defaults) -> Self {
        if self.has_date() || self.has_time() {
            return self;
        }
        match defaults {
            Defaults::Date => self.with_default_date(),
            Defaults::Time => self.with_default_time(),
            Defaults::All => self.with_default_date().with_default_time(),
        }
    }
}

/// Which fields a formatter falls back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defaults {
    Date,
    Time,
    All,
}

/// Kind of a structured output part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartKind {
    Weekday,
    Month,
    Day,
    Year,
    Hour,
    Minute,
    Second,
    DayPeriod,
    TimeZoneName,
    Literal,
}

/// One piece of structured output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPart {
    #[serde(rename = "type")]
    pub kind: PartKind,
    pub value: String,
}

impl FormatPart {
    fn new(kind: PartKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    fn literal(value: &str) -> Self {
        Self::new(PartKind::Literal, value)
    }
}

/// Options as the formatter actually resolved them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOptions {
    pub locale: String,
    pub time_zone: String,
    pub hour12: bool,
}

/// A constructed formatter bound to one zone
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeFormat {
    locale: String,
    options: FormatOptions,
    zone: Tz,
    zone_id: String,
    explicit_zone: bool,
}

impl DateTimeFormat {
    /// Build a formatter. `fallback_zone` is used when the options do
    /// not name one.
    pub fn new(
        locale: Option<&str>,
        options: FormatOptions,
        defaults: Defaults,
        fallback_zone: Tz,
    ) -> Result<Self, ZoneError> {
        let explicit_zone = options.time_zone.is_some();
        let (zone, zone_id) = match options.time_zone.as_deref() {
            Some(id) => (zone::resolve(id)?, id.trim().to_string()),
            None => (fallback_zone, fallback_zone.name().to_string()),
        };

        Ok(Self {
            locale: locale.unwrap_or("en-US").to_string(),
            options: options.with_defaults(defaults),
            zone,
            zone_id,
            explicit_zone,
        })
    }

    /// Whether the caller named the zone at construction
    pub fn has_explicit_zone(&self) -> bool {
        self.explicit_zone
    }

    /// Zone the formatter renders in
    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    /// Resolved locale / zone / clock
    pub fn resolved_options(&self) -> ResolvedOptions {
        ResolvedOptions {
            locale: self.locale.clone(),
            time_zone: self.zone_id.clone(),
            hour12: self.options.hour12.unwrap_or(true),
        }
    }

    /// Plain formatting
    pub fn format(&self, at: DateTime<Utc>) -> String {
        self.format_to_parts(at)
            .into_iter()
            .map(|p| p.value)
            .collect()
    }

    /// Structured formatting
    pub fn format_to_parts(&self, at: DateTime<Utc>) -> Vec<FormatPart> {
        let fields = ZonedFields::at(self.zone, at);
        let opts = &self.options;
        let mut parts = Vec::new();

        self.push_date(&fields, &mut parts);

        if opts.has_time() {
            if !parts.is_empty() {
                parts.push(FormatPart::literal(", "));
            }
            self.push_time(&fields, &mut parts);
        }

        if let Some(style) = opts.time_zone_name {
            let name = match style {
                ZoneNameStyle::Short => zone::short_name(&fields),
                ZoneNameStyle::Long => zone::long_name(&self.zone_id, &fields),
            };
            if !parts.is_empty() {
                parts.push(FormatPart::literal(" "));
            }
            parts.push(FormatPart::new(PartKind::TimeZoneName, name));
        }

        parts
    }

    fn push_date(&self, f: &ZonedFields, parts: &mut Vec<FormatPart>) {
        let opts = &self.options;

        if let Some(style) = opts.weekday {
            let name = match style {
                TextStyle::Long => zone::weekday_long(f.weekday).to_string(),
                TextStyle::Short => zone::weekday_short(f.weekday).to_string(),
                TextStyle::Narrow => zone::weekday_short(f.weekday)[..1].to_string(),
            };
            parts.push(FormatPart::new(PartKind::Weekday, name));
            if opts.month.is_some() || opts.day.is_some() || opts.year.is_some() {
                parts.push(FormatPart::literal(", "));
            }
        }

        match opts.month {
            Some(style) if style.is_textual() => {
                // "Jan 15, 2025"
                let name = match style {
                    MonthStyle::Long => zone::month_long(f.month).to_string(),
                    MonthStyle::Narrow => zone::month_short(f.month)[..1].to_string(),
                    _ => zone::month_short(f.month).to_string(),
                };
                parts.push(FormatPart::new(PartKind::Month, name));
                if let Some(day) = opts.day {
                    parts.push(FormatPart::literal(" "));
                    parts.push(FormatPart::new(PartKind::Day, numeric(f.day, day)));
                }
                if let Some(year) = opts.year {
                    parts.push(FormatPart::literal(if opts.day.is_some() { ", " } else { " " }));
                    parts.push(FormatPart::new(PartKind::Year, year_text(f.year, year)));
                }
            }
            _ => {
                // "1/15/2025"
                let mut first = true;
                let mut sep = |parts: &mut Vec<FormatPart>| {
                    if !first {
                        parts.push(FormatPart::literal("/"));
                    }
                    first = false;
                };
                if let Some(month) = opts.month {
                    sep(parts);
                    let style = if month == MonthStyle::TwoDigit {
                        NumericStyle::TwoDigit
                    } else {
                        NumericStyle::Numeric
                    };
                    parts.push(FormatPart::new(PartKind::Month, numeric(f.month, style)));
                }
                if let Some(day) = opts.day {
                    sep(parts);
                    parts.push(FormatPart::new(PartKind::Day, numeric(f.day, day)));
                }
                if let Some(year) = opts.year {
                    sep(parts);
                    parts.push(FormatPart::new(PartKind::Year, year_text(f.year, year)));
                }
            }
        }
    }

    fn push_time(&self, f: &ZonedFields, parts: &mut Vec<FormatPart>) {
        let opts = &self.options;
        let hour12 = opts.hour12.unwrap_or(true);

        if let Some(style) = opts.hour {
            let hour = if hour12 {
                match f.hour % 12 {
                    0 => 12,
                    h => h,
                }
            } else {
                f.hour
            };
            // 24-hour clocks always pad, as en-US does
            let style = if hour12 { style } else { NumericStyle::TwoDigit };
            parts.push(FormatPart::new(PartKind::Hour, numeric(hour, style)));
        }
        if opts.minute.is_some() {
            if opts.hour.is_some() {
                parts.push(FormatPart::literal(":"));
            }
            parts.push(FormatPart::new(PartKind::Minute, format!("{:02}", f.minute)));
        }
        if opts.second.is_some() {
            if opts.hour.is_some() || opts.minute.is_some() {
                parts.push(FormatPart::literal(":"));
            }
            parts.push(FormatPart::new(PartKind::Second, format!("{:02}", f.second)));
        }
        if hour12 && opts.hour.is_some() {
            parts.push(FormatPart::literal(" "));
            let period = if f.hour < 12 { "AM" } else { "PM" };
            parts.push(FormatPart::new(PartKind::DayPeriod, period));
        }
    }
}

fn numeric(value: u32, style: NumericStyle) -> String {
    match style {
        NumericStyle::Numeric => value.to_string(),
        NumericStyle::TwoDigit => format!("{:02}", value % 100),
    }
}

fn year_text(year: i32, style: NumericStyle) -> String {
    match style {
        NumericStyle::Numeric => year.to_string(),
        NumericStyle::TwoDigit => format!("{:02}", year.rem_euclid(100)),
    }
}
