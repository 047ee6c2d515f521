//! Time API Spoofer
//!
//! Decorates a page's time primitives so every read reflects the
//! spoofed zone coherently:
//!
//! ```text
//!   page code ──▶ TimeSurface ──▶ SpoofedTime ──▶ NativeTime
//!                                   │
//!                                   └── SpoofState (zone or none)
//! ```
//!
//! With no zone set every method is a pass-through to the native
//! surface. With a zone set:
//!
//! - formatters default to the spoofed zone (explicit caller zones win)
//! - every spoofed read path applies the same [`TIME_SKEW`]
//! - the offset and the canonical string are rebuilt from calendar
//!   fields of the spoofed zone
//! - any internal failure silently yields the native value
//!
//! The installation mechanism for a real script host lives in
//! [`crate::script`]; this module holds only the math.

use crate::format::{DateTimeFormat, Defaults, FormatOptions, FormatPart, ResolvedOptions};
use crate::zone::{self, ZoneError, ZonedFields};
use chrono::{DateTime, Offset, TimeDelta, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Constant skew applied before any spoofed read, in milliseconds.
pub const TIME_SKEW_MS: i64 = 1000;

/// [`TIME_SKEW_MS`] as a duration
pub const TIME_SKEW: TimeDelta = TimeDelta::milliseconds(TIME_SKEW_MS);

/// Page-local spoofed zone.
///
/// One per page script context, never persisted. Cloning yields another
/// handle to the same state so the bridge can update it.
#[derive(Debug, Clone, Default)]
pub struct SpoofState {
    zone: Arc<RwLock<Option<String>>>,
}

impl SpoofState {
    /// Create an empty (inactive) state
    pub fn new() -> Self {
        Self::default()
    }

    /// Single update entry point. `None` (or an unknown zone) turns
    /// spoofing off.
    pub fn update(&self, zone_id: Option<&str>) {
        let next = zone_id
            .map(str::trim)
            .filter(|z| zone::is_valid_zone(z))
            .map(str::to_string);

        if zone_id.is_some() && next.is_none() {
            debug!("Ignoring unusable zone update: {:?}", zone_id);
        }

        let mut guard = self.zone.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    /// Currently spoofed zone id
    pub fn zone(&self) -> Option<String> {
        self.zone.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether a zone is active
    pub fn is_active(&self) -> bool {
        self.zone.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn active_tz(&self) -> Option<(String, Tz)> {
        let id = self.zone()?;
        let tz = zone::resolve(&id).ok()?;
        Some((id, tz))
    }
}

/// Which `Date.prototype.toLocale*String` variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleMethod {
    /// Date and time
    DateTime,
    /// Date only
    Date,
    /// Time only
    Time,
}

impl LocaleMethod {
    fn defaults(self) -> Defaults {
        match self {
            Self::DateTime => Defaults::All,
            Self::Date => Defaults::Date,
            Self::Time => Defaults::Time,
        }
    }

    /// Script-visible method name
    pub fn name(self) -> &'static str {
        match self {
            Self::DateTime => "toLocaleString",
            Self::Date => "toLocaleDateString",
            Self::Time => "toLocaleTimeString",
        }
    }
}

/// Replaced built-ins, as they must appear under introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    DateTimeFormat,
    Format,
    FormatToParts,
    ResolvedOptions,
    GetTimezoneOffset,
    ToString,
    ToLocaleString,
    ToLocaleDateString,
    ToLocaleTimeString,
    /// The stringifier installed on each of the above
    FunctionToString,
}

impl Builtin {
    /// Every replaced function
    pub const ALL: [Builtin; 10] = [
        Builtin::DateTimeFormat,
        Builtin::Format,
        Builtin::FormatToParts,
        Builtin::ResolvedOptions,
        Builtin::GetTimezoneOffset,
        Builtin::ToString,
        Builtin::ToLocaleString,
        Builtin::ToLocaleDateString,
        Builtin::ToLocaleTimeString,
        Builtin::FunctionToString,
    ];

    /// Function name as reported by the platform
    pub fn name(self) -> &'static str {
        match self {
            Self::DateTimeFormat => "DateTimeFormat",
            Self::Format => "format",
            Self::FormatToParts => "formatToParts",
            Self::ResolvedOptions => "resolvedOptions",
            Self::GetTimezoneOffset => "getTimezoneOffset",
            Self::ToString | Self::FunctionToString => "toString",
            Self::ToLocaleString => "toLocaleString",
            Self::ToLocaleDateString => "toLocaleDateString",
            Self::ToLocaleTimeString => "toLocaleTimeString",
        }
    }

    /// Opaque built-in source text
    pub fn native_source(self) -> String {
        format!("function {}() {{ [native code] }}", self.name())
    }
}

/// The platform's time primitives.
///
/// Page code talks to a `TimeSurface` without knowing whether it is the
/// native one or the spoofing decorator.
pub trait TimeSurface {
    /// `new Intl.DateTimeFormat(locale, options)`
    fn date_time_format(
        &self,
        locale: Option<&str>,
        options: FormatOptions,
    ) -> Result<DateTimeFormat, ZoneError>;

    /// `formatter.format(instant)`
    fn format(&self, formatter: &DateTimeFormat, at: DateTime<Utc>) -> String;

    /// `formatter.formatToParts(instant)`
    fn format_to_parts(&self, formatter: &DateTimeFormat, at: DateTime<Utc>) -> Vec<FormatPart>;

    /// `formatter.resolvedOptions()`
    fn resolved_options(&self, formatter: &DateTimeFormat) -> ResolvedOptions;

    /// `date.getTimezoneOffset()`, minutes west of UTC
    fn timezone_offset(&self, at: DateTime<Utc>) -> i32;

    /// `date.toString()`
    fn to_string(&self, at: DateTime<Utc>) -> String;

    /// `date.toLocaleString()` and friends
    fn to_locale_string(
        &self,
        method: LocaleMethod,
        at: DateTime<Utc>,
        locale: Option<&str>,
        options: FormatOptions,
    ) -> String;

    /// `fn.toString()` of a time built-in
    fn source_text(&self, builtin: Builtin) -> String;
}

/// Unmodified host behavior in a fixed host zone.
#[derive(Debug, Clone, Copy)]
pub struct NativeTime {
    host_zone: Tz,
}

impl NativeTime {
    /// Native surface for the given host zone
    pub fn new(host_zone: Tz) -> Self {
        Self { host_zone }
    }

    /// Host zone from the `TZ` environment variable, else UTC
    pub fn from_env() -> Self {
        let host_zone = std::env::var("TZ")
            .ok()
            .and_then(|tz| zone::resolve(tz.trim_start_matches(':')).ok())
            .unwrap_or(chrono_tz::UTC);
        Self::new(host_zone)
    }

    /// Host zone
    pub fn host_zone(&self) -> Tz {
        self.host_zone
    }
}

impl TimeSurface for NativeTime {
    fn date_time_format(
        &self,
        locale: Option<&str>,
        options: FormatOptions,
    ) -> Result<DateTimeFormat, ZoneError> {
        DateTimeFormat::new(locale, options, Defaults::Date, self.host_zone)
    }

    fn format(&self, formatter: &DateTimeFormat, at: DateTime<Utc>) -> String {
        formatter.format(at)
    }

    fn format_to_parts(&self, formatter: &DateTimeFormat, at: DateTime<Utc>) -> Vec<FormatPart> {
        formatter.format_to_parts(at)
    }

    fn resolved_options(&self, formatter: &DateTimeFormat) -> ResolvedOptions {
        formatter.resolved_options()
    }

    fn timezone_offset(&self, at: DateTime<Utc>) -> i32 {
        let offset = at.with_timezone(&self.host_zone).offset().fix();
        -offset.local_minus_utc() / 60
    }

    fn to_string(&self, at: DateTime<Utc>) -> String {
        canonical_string(self.host_zone.name(), self.host_zone, at)
            .unwrap_or_else(|_| at.to_rfc2822())
    }

    fn to_locale_string(
        &self,
        method: LocaleMethod,
        at: DateTime<Utc>,
        locale: Option<&str>,
        options: FormatOptions,
    ) -> String {
        match DateTimeFormat::new(locale, options, method.defaults(), self.host_zone) {
            Ok(formatter) => formatter.format(at),
            // Unknown explicit zone: the platform would throw; render in host zone
            Err(_) => DateTimeFormat::new(locale, FormatOptions::default(), method.defaults(), self.host_zone)
                .map(|f| f.format(at))
                .unwrap_or_default(),
        }
    }

    fn source_text(&self, builtin: Builtin) -> String {
        builtin.native_source()
    }
}

/// Spoofing decorator over any native surface.
#[derive(Debug, Clone)]
pub struct SpoofedTime<N> {
    native: N,
    state: SpoofState,
}

impl<N: TimeSurface> SpoofedTime<N> {
    /// Wrap `native`, reading the zone from `state`
    pub fn new(native: N, state: SpoofState) -> Self {
        Self { native, state }
    }

    /// Shared state handle
    pub fn state(&self) -> &SpoofState {
        &self.state
    }

    /// The undecorated surface
    pub fn native(&self) -> &N {
        &self.native
    }

    fn inject_zone(options: FormatOptions, zone_id: &str) -> FormatOptions {
        if options.time_zone.is_some() {
            return options;
        }
        FormatOptions {
            time_zone: Some(zone_id.to_string()),
            ..options
        }
    }
}

impl<N: TimeSurface> TimeSurface for SpoofedTime<N> {
    fn date_time_format(
        &self,
        locale: Option<&str>,
        options: FormatOptions,
    ) -> Result<DateTimeFormat, ZoneError> {
        let options = match self.state.zone() {
            Some(zone_id) => Self::inject_zone(options, &zone_id),
            None => options,
        };
        self.native.date_time_format(locale, options)
    }

    fn format(&self, formatter: &DateTimeFormat, at: DateTime<Utc>) -> String {
        if self.state.is_active() {
            return self.native.format(formatter, at + TIME_SKEW);
        }
        self.native.format(formatter, at)
    }

    fn format_to_parts(&self, formatter: &DateTimeFormat, at: DateTime<Utc>) -> Vec<FormatPart> {
        if self.state.is_active() {
            return self.native.format_to_parts(formatter, at + TIME_SKEW);
        }
        self.native.format_to_parts(formatter, at)
    }

    fn resolved_options(&self, formatter: &DateTimeFormat) -> ResolvedOptions {
        let mut resolved = self.native.resolved_options(formatter);
        if let Some(zone_id) = self.state.zone() {
            if !formatter.has_explicit_zone() {
                resolved.time_zone = zone_id;
            }
        }
        resolved
    }

    fn timezone_offset(&self, at: DateTime<Utc>) -> i32 {
        let Some((_, tz)) = self.state.active_tz() else {
            return self.native.timezone_offset(at);
        };

        match zone::offset_minutes_west(tz, at + TIME_SKEW) {
            Ok(minutes) => minutes,
            Err(e) => {
                trace!("Offset override failed, using native: {}", e);
                self.native.timezone_offset(at)
            }
        }
    }

    fn to_string(&self, at: DateTime<Utc>) -> String {
        let Some((zone_id, tz)) = self.state.active_tz() else {
            return self.native.to_string(at);
        };

        canonical_string(&zone_id, tz, at + TIME_SKEW).unwrap_or_else(|e| {
            trace!("toString override failed, using native: {}", e);
            self.native.to_string(at)
        })
    }

    fn to_locale_string(
        &self,
        method: LocaleMethod,
        at: DateTime<Utc>,
        locale: Option<&str>,
        options: FormatOptions,
    ) -> String {
        match self.state.zone() {
            Some(zone_id) => self.native.to_locale_string(
                method,
                at + TIME_SKEW,
                locale,
                Self::inject_zone(options, &zone_id),
            ),
            None => self.native.to_locale_string(method, at, locale, options),
        }
    }

    fn source_text(&self, builtin: Builtin) -> String {
        builtin.native_source()
    }
}

/// `Wed Jan 15 2025 10:00:00 GMT-0500 (Eastern Standard Time)`, built
/// entirely from the zone's calendar fields.
pub fn canonical_string(zone_id: &str, tz: Tz, at: DateTime<Utc>) -> Result<String, ZoneError> {
    let fields = ZonedFields::at(tz, at);
    let minutes_west = fields.minutes_west()?;

    Ok(format!(
        "{} {} {:02} {:04} {:02}:{:02}:{:02} {} ({})",
        zone::weekday_short(fields.weekday),
        zone::month_short(fields.month),
        fields.day,
        fields.year,
        fields.hour,
        fields.minute,
        fields.second,
        zone::gmt_offset(minutes_west),
        zone::long_name(zone_id, &fields),
    ))
}
