//! ## Summary
//! Free/busy aggregation over a calendar object, a collection, or a user's
//! calendar collections.
//!
//! VEVENT instances are classified by STATUS and TRANSP; VFREEBUSY periods by
//! their FBTYPE. Every period is clipped to the query window and each of the
//! three result lists is normalized.

use almanac_rfc::filter::{CalendarFilter, TimeRange};
use almanac_rfc::ical::core::{
    Component, DateTime as IcalDateTime, ICalendar, Parameter, Period as IcalPeriod, Property,
    Value, names,
};
use almanac_rfc::ical::timezone::TimezoneRegistry;
use chrono::Utc;
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::Serialize;

use super::filter::matches;
use super::instance::{expand, group_by_uid};
use super::period::{Period, PeriodList};
use super::time::TimeContext;
use crate::error::{ServiceError, ServiceResult};
use crate::options::EngineOptions;

/// A stored collection of calendar objects, as loaded by the caller.
#[derive(Debug, Clone, Default)]
pub struct CalendarCollection {
    pub name: String,
    pub is_calendar: bool,
    pub exclude_free_busy_rollup: bool,
    /// TZID from the collection's calendar-timezone property.
    pub timezone: Option<String>,
    pub items: Vec<ICalendar>,
}

impl CalendarCollection {
    /// Creates an empty calendar collection that takes part in rollup.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_calendar: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_item(mut self, item: ICalendar) -> Self {
        self.items.push(item);
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, tzid: impl Into<String>) -> Self {
        self.timezone = Some(tzid.into());
        self
    }

    #[must_use]
    pub fn excluded_from_rollup(mut self) -> Self {
        self.exclude_free_busy_rollup = true;
        self
    }
}

/// Supplies the reference timezone for floating times in a collection.
pub trait TimezoneProvider: Sync {
    fn timezone_for(&self, collection: &CalendarCollection) -> Option<Tz>;
}

impl TimezoneProvider for TimezoneRegistry {
    fn timezone_for(&self, collection: &CalendarCollection) -> Option<Tz> {
        let tzid = collection.timezone.as_deref()?;
        match self.resolve(tzid) {
            Ok(tz) => Some(tz),
            Err(err) => {
                tracing::warn!(
                    collection = %collection.name,
                    tzid,
                    error = %err,
                    "Ignoring unresolvable collection timezone"
                );
                None
            }
        }
    }
}

/// What a free/busy query runs over.
#[derive(Debug, Clone, Copy)]
pub enum FreeBusySource<'a> {
    Calendar(&'a ICalendar),
    Collection(&'a CalendarCollection),
    /// Rollup over a user's collections; only calendar collections not
    /// excluded from rollup are visited.
    User(&'a [CalendarCollection]),
}

/// Busy classification of a period (RFC 5545 §3.2.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyKind {
    Busy,
    Tentative,
    Unavailable,
}

impl BusyKind {
    /// Maps an FBTYPE value. FREE yields `None`; unknown types count as busy.
    #[must_use]
    pub fn from_fbtype(fbtype: Option<&str>) -> Option<Self> {
        match fbtype.map(str::to_ascii_uppercase).as_deref() {
            Some("FREE") => None,
            Some("BUSY-TENTATIVE") => Some(Self::Tentative),
            Some("BUSY-UNAVAILABLE") => Some(Self::Unavailable),
            _ => Some(Self::Busy),
        }
    }

    #[must_use]
    pub const fn as_fbtype(self) -> &'static str {
        match self {
            Self::Busy => "BUSY",
            Self::Tentative => "BUSY-TENTATIVE",
            Self::Unavailable => "BUSY-UNAVAILABLE",
        }
    }
}

/// Aggregated busy time for a query window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeBusyResult {
    window: Period,
    busy: PeriodList,
    tentative: PeriodList,
    unavailable: PeriodList,
}

impl FreeBusyResult {
    #[must_use]
    pub fn window(&self) -> &Period {
        &self.window
    }

    #[must_use]
    pub fn busy(&self) -> &PeriodList {
        &self.busy
    }

    #[must_use]
    pub fn tentative(&self) -> &PeriodList {
        &self.tentative
    }

    #[must_use]
    pub fn unavailable(&self) -> &PeriodList {
        &self.unavailable
    }

    /// Returns whether no busy time of any kind was found.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.busy.is_empty() && self.tentative.is_empty() && self.unavailable.is_empty()
    }

    /// ## Summary
    /// Renders the result as a VFREEBUSY component.
    ///
    /// DTSTART/DTEND carry the window in UTC. Each period becomes one
    /// FREEBUSY property with its FBTYPE.
    #[must_use]
    pub fn to_vfreebusy(&self) -> Component {
        let mut vfreebusy = Component::freebusy()
            .with_property(Property::text(names::UID, uuid::Uuid::new_v4().to_string()))
            .with_property(Property::datetime(
                names::DTSTAMP,
                IcalDateTime::from_chrono_utc(Utc::now()),
            ))
            .with_property(Property::datetime(
                names::DTSTART,
                IcalDateTime::from_chrono_utc(self.window.start),
            ))
            .with_property(Property::datetime(
                names::DTEND,
                IcalDateTime::from_chrono_utc(self.window.end),
            ));

        let lists = [
            (BusyKind::Busy, &self.busy),
            (BusyKind::Tentative, &self.tentative),
            (BusyKind::Unavailable, &self.unavailable),
        ];
        for (kind, list) in lists {
            for period in list {
                vfreebusy.add_property(
                    Property::periods(
                        names::FREEBUSY,
                        vec![IcalPeriod::explicit(
                            IcalDateTime::from_chrono_utc(period.start),
                            IcalDateTime::from_chrono_utc(period.end),
                        )],
                    )
                    .with_param(Parameter::fbtype(kind.as_fbtype())),
                );
            }
        }
        vfreebusy
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    busy: Vec<Period>,
    tentative: Vec<Period>,
    unavailable: Vec<Period>,
}

impl Accumulator {
    fn add(&mut self, kind: BusyKind, period: Period, window: &Period) {
        let Some(clipped) = period.clip(window).filter(|p| !p.is_empty()) else {
            return;
        };
        match kind {
            BusyKind::Busy => self.busy.push(clipped),
            BusyKind::Tentative => self.tentative.push(clipped),
            BusyKind::Unavailable => self.unavailable.push(clipped),
        }
    }

    fn merge(&mut self, other: Self) {
        self.busy.extend(other.busy);
        self.tentative.extend(other.tentative);
        self.unavailable.extend(other.unavailable);
    }

    fn finish(self, window: Period) -> FreeBusyResult {
        FreeBusyResult {
            window,
            busy: PeriodList::from(self.busy).normalize(),
            tentative: PeriodList::from(self.tentative).normalize(),
            unavailable: PeriodList::from(self.unavailable).normalize(),
        }
    }
}

/// ## Summary
/// Computes free/busy time for `source` over `window`.
///
/// ## Side Effects
/// With `parallel_rollup`, user rollup fans out across collections on the
/// rayon thread pool.
///
/// ## Errors
/// Returns `ServiceError::InvalidWindow` for an inverted window. Calendar and
/// collection queries propagate rule and timezone errors; user rollup skips
/// the failing item with a warning instead.
pub fn compute_free_busy(
    source: FreeBusySource<'_>,
    window: &Period,
    ctx: &TimeContext<'_>,
    provider: &dyn TimezoneProvider,
    options: &EngineOptions,
) -> ServiceResult<FreeBusyResult> {
    window.validate()?;

    let acc = match source {
        FreeBusySource::Calendar(calendar) => calendar_busy(calendar, window, ctx, options)?,
        FreeBusySource::Collection(collection) => {
            collection_busy(collection, window, ctx, provider, options, true)?
        }
        FreeBusySource::User(collections) => {
            user_busy(collections, window, ctx, provider, options)
        }
    };

    let result = acc.finish(*window);
    tracing::debug!(
        busy = result.busy.len(),
        tentative = result.tentative.len(),
        unavailable = result.unavailable.len(),
        "Computed free/busy"
    );
    Ok(result)
}

fn user_busy(
    collections: &[CalendarCollection],
    window: &Period,
    ctx: &TimeContext<'_>,
    provider: &dyn TimezoneProvider,
    options: &EngineOptions,
) -> Accumulator {
    let visit = |collection: &CalendarCollection| {
        match collection_busy(collection, window, ctx, provider, options, false) {
            Ok(acc) => Some(acc),
            Err(err) => {
                tracing::warn!(
                    collection = %collection.name,
                    error = %err,
                    "Skipping collection in free/busy rollup"
                );
                None
            }
        }
    };
    let eligible = |c: &&CalendarCollection| c.is_calendar && !c.exclude_free_busy_rollup;

    let parts: Vec<Accumulator> = if options.parallel_rollup {
        collections
            .par_iter()
            .filter(eligible)
            .filter_map(visit)
            .collect()
    } else {
        collections.iter().filter(eligible).filter_map(visit).collect()
    };

    let mut acc = Accumulator::default();
    for part in parts {
        acc.merge(part);
    }
    acc
}

/// ## Summary
/// Aggregates one collection. Items are pre-filtered with a VEVENT and a
/// VFREEBUSY time-range query before aggregation.
///
/// ## Errors
/// With `strict`, the first failing item aborts the collection; otherwise
/// failing items are skipped with a warning.
fn collection_busy(
    collection: &CalendarCollection,
    window: &Period,
    ctx: &TimeContext<'_>,
    provider: &dyn TimezoneProvider,
    options: &EngineOptions,
    strict: bool,
) -> ServiceResult<Accumulator> {
    let ctx = ctx.with_reference(provider.timezone_for(collection));
    let range = TimeRange::new(window.start, window.end);
    let filters = [
        CalendarFilter::component_in_range("VEVENT", range.clone()),
        CalendarFilter::component_in_range("VFREEBUSY", range),
    ];

    let mut acc = Accumulator::default();
    for item in &collection.items {
        let outcome = filters
            .iter()
            .try_fold(false, |found, filter| {
                Ok::<_, ServiceError>(found || matches(item, filter, &ctx, options)?)
            })
            .and_then(|relevant| {
                if relevant {
                    calendar_busy(item, window, &ctx, options).map(Some)
                } else {
                    Ok(None)
                }
            });

        match outcome {
            Ok(Some(part)) => acc.merge(part),
            Ok(None) => {}
            Err(err) if !strict => {
                tracing::warn!(
                    collection = %collection.name,
                    error = %err,
                    "Skipping calendar object in free/busy rollup"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(acc)
}

/// Busy time of one calendar object.
fn calendar_busy(
    calendar: &ICalendar,
    window: &Period,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<Accumulator> {
    let mut acc = Accumulator::default();

    let (groups, loose) = group_by_uid(calendar.events());
    for group in &groups {
        match group.master {
            Some(master) => {
                add_instances(&mut acc, master, &group.overrides, window, ctx, options)?;
            }
            None => {
                for &lone in &group.overrides {
                    add_instances(&mut acc, lone, &[], window, ctx, options)?;
                }
            }
        }
    }
    for event in loose {
        add_instances(&mut acc, event, &[], window, ctx, options)?;
    }

    for freebusy in calendar.freebusy() {
        for prop in freebusy.get_properties(names::FREEBUSY) {
            if !matches!(prop.value, Value::Period(_) | Value::PeriodList(_)) {
                continue;
            }
            let Some(kind) = BusyKind::from_fbtype(prop.get_param_value("FBTYPE")) else {
                continue;
            };
            for period in ctx.property_periods(prop, None)? {
                acc.add(kind, period, window);
            }
        }
    }

    Ok(acc)
}

fn add_instances(
    acc: &mut Accumulator,
    master: &Component,
    overrides: &[&Component],
    window: &Period,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<()> {
    for instance in expand(master, overrides, window, ctx, options)?.iter() {
        if let Some(kind) = classify_event(instance.component) {
            acc.add(kind, instance.period(), window);
        }
    }
    Ok(())
}

/// TRANSPARENT and CANCELLED events are free; TENTATIVE is tentative.
fn classify_event(event: &Component) -> Option<BusyKind> {
    let text = |name| event.get_property(name).and_then(Property::as_text);
    if text(names::TRANSP).is_some_and(|t| t.eq_ignore_ascii_case("TRANSPARENT")) {
        return None;
    }
    match text(names::STATUS) {
        Some(status) if status.eq_ignore_ascii_case("CANCELLED") => None,
        Some(status) if status.eq_ignore_ascii_case("TENTATIVE") => Some(BusyKind::Tentative),
        _ => Some(BusyKind::Busy),
    }
}
