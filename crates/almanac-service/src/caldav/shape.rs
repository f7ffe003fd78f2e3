//! ## Summary
//! Reshapes a calendar object for a time-range restricted query response
//! (RFC 4791 §9.6.5 and §9.6.6).
//!
//! `Expand` replaces every recurring series with one component per instance
//! in the window. `Limit` keeps each master intact and drops the overrides
//! that govern no instance in the window.

use almanac_rfc::ical::core::{
    Component, ComponentKind, Date, DateTime as IcalDateTime, Duration as IcalDuration, ICalendar,
    Period as IcalPeriod, Property, Value, names,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::instance::{Instance, InstanceSource, SeriesGroup, expand, group_by_uid};
use super::period::Period;
use super::time::{ComponentSpan, TimeContext};
use crate::error::ServiceResult;
use crate::options::EngineOptions;

/// How `shape_output` treats recurring series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Expand,
    Limit,
}

/// Properties that only describe the recurrence set or the original times.
const RECURRENCE_PROPERTIES: [&str; 9] = [
    names::RRULE,
    names::RDATE,
    names::EXDATE,
    names::EXRULE,
    names::DTSTART,
    names::DTEND,
    names::DURATION,
    names::DUE,
    names::RECURRENCE_ID,
];

/// Properties whose DATE-TIME values an expanded response rewrites in UTC.
const TIME_PROPERTIES: [&str; 6] = [
    names::DTSTART,
    names::DTEND,
    names::DUE,
    names::RECURRENCE_ID,
    names::RDATE,
    names::EXDATE,
];

/// ## Summary
/// Reshapes `calendar` for `window` according to `mode`.
///
/// Objects without recurrence are returned unchanged. Components that are not
/// part of a recurring series pass through in both modes, with their date-times
/// rewritten in UTC when expanding.
///
/// ## Errors
/// Returns `ServiceError::InvalidWindow` for an inverted window and any rule
/// or timezone error raised while expanding a series.
pub fn shape_output(
    calendar: &ICalendar,
    window: &Period,
    mode: OutputMode,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<ICalendar> {
    window.validate()?;
    if !calendar.has_recurrence() {
        return Ok(calendar.clone());
    }

    let candidates = calendar
        .components()
        .iter()
        .filter(|c| c.kind.is_recurring_type());
    let (groups, _) = group_by_uid(candidates);
    let series: Vec<&SeriesGroup<'_>> = groups.iter().filter(|g| g.is_recurring()).collect();
    let in_series = |component: &Component| {
        component.kind.is_recurring_type()
            && component
                .uid()
                .is_some_and(|uid| series.iter().any(|g| g.uid == uid))
    };

    let mut root = calendar.root.clone();
    root.children.clear();

    match mode {
        OutputMode::Expand => {
            let mut emitted = Vec::new();
            for child in calendar.components() {
                if child.kind == ComponentKind::Timezone {
                    continue;
                }
                if !in_series(child) {
                    root.add_child(with_utc_times(child, ctx)?);
                    continue;
                }
                let Some(group) = child
                    .uid()
                    .and_then(|uid| series.iter().find(|g| g.uid == uid))
                else {
                    continue;
                };
                if emitted.contains(&group.uid) {
                    continue;
                }
                emitted.push(group.uid);
                root.children
                    .extend(expand_group(group, window, ctx, options)?);
            }
        }
        OutputMode::Limit => {
            let mut retained: Vec<&Component> = Vec::new();
            for group in &series {
                retained.extend(limit_group(group, window, ctx, options)?);
            }
            for child in calendar.components() {
                if !in_series(child) || retained.iter().any(|&kept| std::ptr::eq(kept, child)) {
                    root.add_child(child.clone());
                }
            }
        }
    }

    tracing::debug!(
        ?mode,
        series = series.len(),
        components = root.children.len(),
        "Shaped calendar object"
    );
    Ok(ICalendar::from_root(root))
}

/// Materializes one component per instance of the group in `window`.
fn expand_group(
    group: &SeriesGroup<'_>,
    window: &Period,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<Vec<Component>> {
    let mut out = Vec::new();
    match group.master {
        Some(master) => {
            for instance in expand(master, &group.overrides, window, ctx, options)?.iter() {
                out.push(materialize(instance, ctx)?);
            }
        }
        None => {
            for &lone in &group.overrides {
                for instance in expand(lone, &[], window, ctx, options)?.iter() {
                    let mut component = materialize(instance, ctx)?;
                    if let Some(rid) = lone.recurrence_id() {
                        component.set_property(utc_recurrence_id(rid, ctx)?);
                    }
                    out.push(component);
                }
            }
        }
    }
    Ok(out)
}

/// Copies the instance's source component with its times rewritten in UTC.
fn materialize(instance: &Instance<'_>, ctx: &TimeContext<'_>) -> ServiceResult<Component> {
    let source = instance.component;
    let all_day = ComponentSpan::resolve(source, ctx)?.is_some_and(|span| span.all_day);

    let mut component = source.clone();
    component
        .properties
        .retain(|p| !RECURRENCE_PROPERTIES.iter().any(|n| p.name.eq_ignore_ascii_case(n)));

    let stamp = |name: &str, instant: DateTime<Utc>| {
        if all_day {
            Property::date(name, local_date(instant, ctx))
        } else {
            Property::datetime(name, IcalDateTime::from_chrono_utc(instant))
        }
    };

    component.add_property(stamp(names::DTSTART, instance.start));
    if source.has_property(names::DURATION) {
        component.add_property(Property::duration(
            names::DURATION,
            IcalDuration::from_time_delta(instance.end.signed_duration_since(instance.start)),
        ));
    } else if source.has_property(names::DUE) {
        component.add_property(stamp(names::DUE, instance.end));
    } else if source.has_property(names::DTEND) || instance.end > instance.start {
        component.add_property(stamp(names::DTEND, instance.end));
    }
    component.add_property(stamp(names::RECURRENCE_ID, instance.recurrence_id));

    tracing::trace!(
        recurrence_id = %instance.recurrence_id,
        source = ?instance.source,
        "Materialized instance"
    );
    Ok(component)
}

/// Rewrites an override's own RECURRENCE-ID in UTC, dropping RANGE.
fn utc_recurrence_id(rid: &Property, ctx: &TimeContext<'_>) -> ServiceResult<Property> {
    Ok(match ctx.property_to_utc(rid)? {
        Some(instant) => Property::datetime(
            names::RECURRENCE_ID,
            IcalDateTime::from_chrono_utc(instant),
        ),
        None => {
            let mut copy = rid.clone();
            copy.remove_param("RANGE");
            copy
        }
    })
}

/// Copies a component with its zoned and floating date-times rewritten in UTC.
///
/// DATE values stay as they are.
fn with_utc_times(component: &Component, ctx: &TimeContext<'_>) -> ServiceResult<Component> {
    let mut copy = component.clone();
    for prop in &mut copy.properties {
        if !TIME_PROPERTIES.iter().any(|n| prop.name.eq_ignore_ascii_case(n)) {
            continue;
        }
        let tzid = prop.get_param_value("TZID").map(str::to_string);
        let instant = |dt: &IcalDateTime| -> ServiceResult<IcalDateTime> {
            let resolved = ctx
                .registry
                .resolve_datetime(dt, tzid.as_deref(), ctx.reference)?;
            Ok(IcalDateTime::from_chrono_utc(resolved))
        };
        let period = |p: &IcalPeriod| -> ServiceResult<IcalPeriod> {
            let resolved = ctx.period_to_utc(p, tzid.as_deref())?;
            Ok(IcalPeriod::explicit(
                IcalDateTime::from_chrono_utc(resolved.start),
                IcalDateTime::from_chrono_utc(resolved.end),
            ))
        };
        let value = match &prop.value {
            Value::DateTime(dt) => Value::DateTime(instant(dt)?),
            Value::DateTimeList(list) => {
                Value::DateTimeList(list.iter().map(instant).collect::<ServiceResult<_>>()?)
            }
            Value::Period(p) => Value::Period(period(p)?),
            Value::PeriodList(list) => {
                Value::PeriodList(list.iter().map(period).collect::<ServiceResult<_>>()?)
            }
            _ => continue,
        };
        prop.value = value;
        prop.remove_param("TZID");
    }
    Ok(copy)
}

fn local_date(instant: DateTime<Utc>, ctx: &TimeContext<'_>) -> Date {
    let zone = ctx.reference.unwrap_or(Tz::UTC);
    Date::from_naive(instant.with_timezone(&zone).date_naive())
}

/// Components of the group a limited response keeps.
fn limit_group<'a>(
    group: &SeriesGroup<'a>,
    window: &Period,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<Vec<&'a Component>> {
    let Some(master) = group.master else {
        let mut kept = Vec::new();
        for &lone in &group.overrides {
            if ComponentSpan::resolve(lone, ctx)?.is_some_and(|s| s.period().intersects(window)) {
                kept.push(lone);
            }
        }
        return Ok(kept);
    };

    let instances = expand(master, &group.overrides, window, ctx, options)?;
    let mut governing: Vec<DateTime<Utc>> = Vec::new();
    let mut exact: Vec<DateTime<Utc>> = Vec::new();
    for instance in instances.iter() {
        match instance.source {
            InstanceSource::Master => {}
            InstanceSource::Override => exact.push(instance.recurrence_id),
            InstanceSource::ThisAndFuture { recurrence_id } => governing.push(recurrence_id),
        }
    }

    let mut kept = vec![master];
    for &candidate in &group.overrides {
        let Some(rid) = candidate.recurrence_id() else {
            continue;
        };
        let Some(rid) = ctx.property_to_utc(rid)? else {
            continue;
        };
        let wanted = if candidate.is_this_and_future() {
            governing.contains(&rid) || exact.contains(&rid)
        } else {
            exact.contains(&rid)
        };
        if wanted {
            kept.push(candidate);
        }
    }
    tracing::trace!(
        uid = group.uid,
        kept = kept.len(),
        overrides = group.overrides.len(),
        "Limited recurrence set"
    );
    Ok(kept)
}
