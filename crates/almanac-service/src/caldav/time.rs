//! Resolution of iCalendar date and date-time properties to UTC instants.

use almanac_rfc::ical::core::{Component, Date, Property, Value, names};
use almanac_rfc::ical::timezone::{TimezoneRegistry, floating_to_utc};
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;

use super::period::Period;
use crate::error::{ServiceError, ServiceResult};

/// Registry plus the reference timezone used for floating values.
#[derive(Debug, Clone, Copy)]
pub struct TimeContext<'a> {
    pub registry: &'a TimezoneRegistry,
    /// Zone for floating date-times and DATE values; UTC when `None`.
    pub reference: Option<Tz>,
}

impl<'a> TimeContext<'a> {
    #[must_use]
    pub fn new(registry: &'a TimezoneRegistry, reference: Option<Tz>) -> Self {
        Self {
            registry,
            reference,
        }
    }

    /// Returns a copy using `reference` when it is set.
    #[must_use]
    pub fn with_reference(self, reference: Option<Tz>) -> Self {
        Self {
            reference: reference.or(self.reference),
            ..self
        }
    }

    /// ## Summary
    /// Resolves local midnight of a DATE in the reference zone.
    ///
    /// ## Errors
    /// Returns an error if the date is invalid or midnight falls in a DST gap.
    pub fn date_to_utc(&self, date: &Date) -> ServiceResult<DateTime<Utc>> {
        let naive = date
            .naive()
            .ok_or_else(|| ServiceError::InvalidComponent {
                component: "DATE".to_string(),
                reason: format!("{date} is not a calendar date"),
            })?
            .and_time(NaiveTime::MIN);
        Ok(floating_to_utc(naive, self.reference)?)
    }

    /// ## Summary
    /// Resolves a single-valued DATE or DATE-TIME property.
    ///
    /// Returns `Ok(None)` when the property carries another value type.
    ///
    /// ## Errors
    /// Returns an error if the value cannot be converted to UTC.
    pub fn property_to_utc(&self, prop: &Property) -> ServiceResult<Option<DateTime<Utc>>> {
        match &prop.value {
            Value::DateTime(dt) => Ok(Some(self.registry.resolve_datetime(
                dt,
                prop.get_param_value("TZID"),
                self.reference,
            )?)),
            Value::Date(date) => self.date_to_utc(date).map(Some),
            _ => Ok(None),
        }
    }

    /// ## Summary
    /// Resolves every instant of a DATE/DATE-TIME/PERIOD property into periods.
    ///
    /// Single instants become zero-length periods unless `instant_length`
    /// is given; DATE values always span one day.
    ///
    /// ## Errors
    /// Returns an error if any value cannot be converted to UTC.
    pub fn property_periods(
        &self,
        prop: &Property,
        instant_length: Option<TimeDelta>,
    ) -> ServiceResult<Vec<Period>> {
        let tzid = prop.get_param_value("TZID");
        let length = instant_length.unwrap_or_else(TimeDelta::zero);
        let resolve = |dt| self.registry.resolve_datetime(dt, tzid, self.reference);

        let periods = match &prop.value {
            Value::DateTime(dt) => vec![Period::starting_at(resolve(dt)?, length)],
            Value::DateTimeList(list) => list
                .iter()
                .map(|dt| Ok(Period::starting_at(resolve(dt)?, length)))
                .collect::<ServiceResult<_>>()?,
            Value::Date(date) => vec![Period::starting_at(
                self.date_to_utc(date)?,
                TimeDelta::days(1),
            )],
            Value::DateList(list) => list
                .iter()
                .map(|d| Ok(Period::starting_at(self.date_to_utc(d)?, TimeDelta::days(1))))
                .collect::<ServiceResult<_>>()?,
            Value::Period(period) => vec![self.period_to_utc(period, tzid)?],
            Value::PeriodList(list) => list
                .iter()
                .map(|p| self.period_to_utc(p, tzid))
                .collect::<ServiceResult<_>>()?,
            _ => Vec::new(),
        };
        Ok(periods)
    }

    /// ## Summary
    /// Resolves an iCalendar PERIOD value to UTC.
    ///
    /// ## Errors
    /// Returns an error if either bound cannot be converted to UTC.
    pub fn period_to_utc(
        &self,
        period: &almanac_rfc::ical::core::Period,
        tzid: Option<&str>,
    ) -> ServiceResult<Period> {
        use almanac_rfc::ical::core::Period as IcalPeriod;

        let start = self
            .registry
            .resolve_datetime(period.start(), tzid, self.reference)?;
        let end = match period {
            IcalPeriod::Explicit { end, .. } => {
                self.registry.resolve_datetime(end, tzid, self.reference)?
            }
            IcalPeriod::Duration { duration, .. } => start
                .checked_add_signed(duration.to_time_delta())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        Ok(Period::clamped(start, end))
    }
}

/// Resolved start, end and all-day flag of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
}

impl ComponentSpan {
    /// ## Summary
    /// Resolves the span of a VEVENT/VTODO/VJOURNAL from DTSTART and
    /// DTEND, DUE or DURATION.
    ///
    /// Without an end, a DATE start lasts one day and a DATE-TIME start is
    /// zero-length. An end before the start is clamped to that default.
    /// Returns `Ok(None)` when there is no DTSTART.
    ///
    /// ## Errors
    /// Returns an error if any date-time cannot be converted to UTC.
    pub fn resolve(component: &Component, ctx: &TimeContext<'_>) -> ServiceResult<Option<Self>> {
        let Some(dtstart) = component.get_property(names::DTSTART) else {
            return Ok(None);
        };
        let Some(start) = ctx.property_to_utc(dtstart)? else {
            return Ok(None);
        };
        let all_day = matches!(dtstart.value, Value::Date(_));
        let default = if all_day {
            TimeDelta::days(1)
        } else {
            TimeDelta::zero()
        };

        let explicit_end = match component
            .get_property(names::DTEND)
            .or_else(|| component.get_property(names::DUE))
        {
            Some(prop) => ctx.property_to_utc(prop)?,
            None => component
                .get_property(names::DURATION)
                .and_then(Property::as_duration)
                .and_then(|d| start.checked_add_signed(d.to_time_delta())),
        };

        let end = match explicit_end {
            Some(end) if end >= start => end,
            Some(_) | None => start + default,
        };
        tracing::trace!(%start, %end, all_day, "Resolved component span");

        Ok(Some(Self {
            start,
            end,
            all_day,
        }))
    }

    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    #[must_use]
    pub fn period(&self) -> Period {
        Period::clamped(self.start, self.end)
    }
}
