//! Facade bundling the timezone registry and engine options.

use almanac_core::config::Settings;
use almanac_rfc::filter::CalendarFilter;
use almanac_rfc::ical::core::{Component, ICalendar};
use almanac_rfc::ical::timezone::TimezoneRegistry;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::caldav::filter;
use crate::caldav::freebusy::{self, FreeBusyResult, FreeBusySource, TimezoneProvider};
use crate::caldav::instance::{self, InstanceList, RecurrenceRange};
use crate::caldav::period::Period;
use crate::caldav::shape::{self, OutputMode};
use crate::caldav::time::TimeContext;
use crate::error::ServiceResult;
use crate::options::EngineOptions;

/// ## Summary
/// Entry point for every engine operation.
///
/// Holds only shared references and immutable options, so one engine can be
/// used from many threads at once.
#[derive(Debug, Clone)]
pub struct Engine<'a> {
    registry: &'a TimezoneRegistry,
    options: EngineOptions,
    reference: Option<Tz>,
}

impl<'a> Engine<'a> {
    /// ## Summary
    /// Creates an engine, resolving the configured default timezone.
    ///
    /// An unresolvable default timezone is logged and floating times fall
    /// back to UTC.
    #[must_use]
    pub fn new(registry: &'a TimezoneRegistry, options: EngineOptions) -> Self {
        let reference = options.default_timezone.as_deref().and_then(|tzid| {
            registry
                .resolve(tzid)
                .inspect_err(|err| {
                    tracing::warn!(tzid, error = %err, "Ignoring unknown default timezone");
                })
                .ok()
        });
        tracing::debug!(
            max_instances = options.max_instances,
            reference = reference.map(|tz| tz.name()),
            parallel = options.parallel_rollup,
            "Engine ready"
        );
        Self {
            registry,
            options,
            reference,
        }
    }

    #[must_use]
    pub fn from_settings(registry: &'a TimezoneRegistry, settings: &Settings) -> Self {
        Self::new(registry, EngineOptions::from(settings))
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn context(&self) -> TimeContext<'a> {
        TimeContext::new(self.registry, self.reference)
    }

    /// ## Summary
    /// Evaluates a calendar-query filter against one calendar object.
    ///
    /// ## Errors
    /// Returns `ServiceError::InvalidFilter` for a malformed filter, or rule
    /// and timezone errors raised while expanding recurring components.
    pub fn matches(&self, calendar: &ICalendar, filter: &CalendarFilter) -> ServiceResult<bool> {
        filter::matches(calendar, filter, &self.context(), &self.options)
    }

    /// ## Summary
    /// Expands a master and its overrides into the instances within `window`.
    ///
    /// ## Errors
    /// See [`instance::expand`].
    pub fn expand<'c>(
        &self,
        master: &'c Component,
        overrides: &[&'c Component],
        window: &Period,
    ) -> ServiceResult<InstanceList<'c>> {
        instance::expand(master, overrides, window, &self.context(), &self.options)
    }

    /// ## Summary
    /// Computes free/busy time using the registry as the collection timezone provider.
    ///
    /// ## Errors
    /// See [`freebusy::compute_free_busy`].
    pub fn compute_free_busy(
        &self,
        source: FreeBusySource<'_>,
        window: &Period,
    ) -> ServiceResult<FreeBusyResult> {
        self.compute_free_busy_with(source, window, self.registry)
    }

    /// ## Summary
    /// Computes free/busy time with a caller-supplied timezone provider.
    ///
    /// ## Errors
    /// See [`freebusy::compute_free_busy`].
    pub fn compute_free_busy_with(
        &self,
        source: FreeBusySource<'_>,
        window: &Period,
        provider: &dyn TimezoneProvider,
    ) -> ServiceResult<FreeBusyResult> {
        freebusy::compute_free_busy(source, window, &self.context(), provider, &self.options)
    }

    /// ## Summary
    /// Reshapes a calendar object for a time-range restricted response.
    ///
    /// ## Errors
    /// See [`shape::shape_output`].
    pub fn shape_output(
        &self,
        calendar: &ICalendar,
        window: &Period,
        mode: OutputMode,
    ) -> ServiceResult<ICalendar> {
        shape::shape_output(calendar, window, mode, &self.context(), &self.options)
    }

    /// ## Errors
    /// Returns rule and timezone errors raised while building the series.
    pub fn is_occurrence(&self, master: &Component, instant: DateTime<Utc>) -> ServiceResult<bool> {
        instance::is_occurrence(master, instant, &self.context(), &self.options)
    }

    /// ## Errors
    /// Returns rule and timezone errors raised while building the series.
    pub fn calculate_recurrence_range(
        &self,
        master: &Component,
        overrides: &[&Component],
    ) -> ServiceResult<Option<RecurrenceRange>> {
        instance::calculate_recurrence_range(master, overrides, &self.context(), &self.options)
    }
}
