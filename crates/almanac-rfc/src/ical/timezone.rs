//! Timezone resolution and UTC conversion for iCalendar date-times.
//!
//! Uses ICU4X for Windows timezone ID to IANA mapping and timezone canonicalization.

use chrono::{LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icu::time::zone::WindowsParser;
use icu::time::zone::iana::IanaParserExtended;
use std::collections::HashMap;
use std::str::FromStr;

use super::core::{DateTime, DateTimeForm};

/// Error during timezone conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Unknown or invalid timezone identifier.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Non-existent time during DST gap.
    #[error("Non-existent time (DST gap): {0}")]
    NonExistentTime(String),

    /// Fields that do not name a calendar time (e.g. February 30th).
    #[error("Invalid datetime: {0}")]
    InvalidDateTime(String),
}

/// Read-only lookup table from TZID to IANA zone.
///
/// Built once with any site-specific aliases and then shared by reference;
/// resolution never mutates the registry, so one instance can serve
/// concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct TimezoneRegistry {
    aliases: HashMap<String, Tz>,
}

impl TimezoneRegistry {
    /// Creates a registry with no extra aliases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ## Summary
    /// Registers a site-specific TZID alias during construction.
    ///
    /// Aliases win over ICU and IANA resolution.
    #[must_use]
    pub fn with_alias(mut self, tzid: impl Into<String>, tz: Tz) -> Self {
        self.aliases.insert(tzid.into(), tz);
        self
    }

    /// ## Summary
    /// Resolves a timezone identifier to a `chrono_tz::Tz`.
    ///
    /// Accepts IANA names, IANA aliases, Windows zone names and
    /// `/mozilla.org/`-prefixed identifiers.
    ///
    /// ## Errors
    /// Returns `ConversionError::UnknownTimezone` if the TZID cannot be resolved.
    pub fn resolve(&self, tzid: &str) -> Result<Tz, ConversionError> {
        if let Some(tz) = self.aliases.get(tzid) {
            return Ok(*tz);
        }

        let normalized = normalize_tzid(tzid);
        let tz = Tz::from_str(&normalized)
            .map_err(|_e| ConversionError::UnknownTimezone(tzid.to_string()))?;

        tracing::trace!(tzid, resolved = %tz.name(), "Resolved timezone");
        Ok(tz)
    }

    /// ## Summary
    /// Converts a wall-clock time in the named zone to UTC.
    ///
    /// ## Errors
    /// Returns an error if the zone is unknown or the time falls in a DST gap.
    pub fn to_utc(
        &self,
        local: NaiveDateTime,
        tzid: &str,
    ) -> Result<chrono::DateTime<Utc>, ConversionError> {
        let tz = self.resolve(tzid)?;
        local_to_utc(local, tz)
    }

    /// ## Summary
    /// Resolves an iCalendar DATE-TIME to a UTC instant.
    ///
    /// Zoned values use their own TZID. Floating values use the property's
    /// TZID parameter when one is present, then `reference`, and fall back to
    /// treating the wall-clock fields as UTC.
    ///
    /// ## Errors
    /// Returns an error if the fields are invalid, the zone is unknown or
    /// the time falls in a DST gap.
    pub fn resolve_datetime(
        &self,
        dt: &DateTime,
        tzid_param: Option<&str>,
        reference: Option<Tz>,
    ) -> Result<chrono::DateTime<Utc>, ConversionError> {
        let local = dt
            .naive()
            .ok_or_else(|| ConversionError::InvalidDateTime(dt.to_string()))?;

        match &dt.form {
            DateTimeForm::Utc => Ok(local.and_utc()),
            DateTimeForm::Zoned { tzid } => self.to_utc(local, tzid),
            DateTimeForm::Floating => match tzid_param {
                Some(tzid) => self.to_utc(local, tzid),
                None => floating_to_utc(local, reference),
            },
        }
    }
}

/// ## Summary
/// Interprets floating wall-clock fields in `reference`, or as UTC when no
/// reference timezone is supplied.
///
/// ## Errors
/// Returns `ConversionError::NonExistentTime` for a wall-clock time inside a DST gap.
pub fn floating_to_utc(
    local: NaiveDateTime,
    reference: Option<Tz>,
) -> Result<chrono::DateTime<Utc>, ConversionError> {
    match reference {
        Some(tz) => local_to_utc(local, tz),
        None => Ok(local.and_utc()),
    }
}

/// ## Summary
/// Converts a local datetime to UTC in the given zone.
///
/// A time inside a DST fold resolves to the earlier instant.
///
/// ## Errors
/// Returns `ConversionError::NonExistentTime` for a time inside a DST gap.
pub fn local_to_utc(
    local: NaiveDateTime,
    tz: Tz,
) -> Result<chrono::DateTime<Utc>, ConversionError> {
    match tz.from_local_datetime(&local) {
        LocalResult::None => Err(ConversionError::NonExistentTime(format!(
            "{local} in timezone {}",
            tz.name()
        ))),
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _later) => Ok(earlier.with_timezone(&Utc)),
    }
}

/// Normalizes common CalDAV/iCalendar timezone identifiers to IANA names.
fn normalize_tzid(tzid: &str) -> String {
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid);

    let windows_parser = WindowsParser::new();
    if let Some(tz) = windows_parser.parse(stripped, None) {
        let iana_parser = IanaParserExtended::new();
        if let Some(entry) = iana_parser.iter().find(|entry| entry.time_zone == tz) {
            return entry.canonical.to_string();
        }
    }

    // Canonicalizes aliases such as Europe/Kiev -> Europe/Kyiv
    let iana_parser = IanaParserExtended::new();
    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}
