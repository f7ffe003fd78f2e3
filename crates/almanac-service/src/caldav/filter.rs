//! `CalDAV` calendar-query filter evaluation (RFC 4791 §9.7-9.9).
//!
//! The evaluator answers "match" or "no match"; only a structurally invalid
//! filter or a malformed recurrence rule surfaces as an error.

use almanac_rfc::filter::{
    CalendarFilter, CompFilter, ParamFilter, PropFilter, TimeRange, validate_filter,
};
use almanac_rfc::ical::core::{
    Component, ComponentKind, Duration as IcalDuration, ICalendar, Property, Value, names,
};
use chrono::{DateTime, TimeDelta, Utc};

use super::instance::expand;
use super::period::Period;
use super::time::{ComponentSpan, TimeContext};
use crate::error::ServiceResult;
use crate::options::EngineOptions;

/// ## Summary
/// Evaluates `filter` against `calendar`.
///
/// ## Errors
/// Returns `ServiceError::InvalidFilter` for a malformed filter, and rule or
/// timezone errors raised while expanding recurring components.
pub fn matches(
    calendar: &ICalendar,
    filter: &CalendarFilter,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<bool> {
    validate_filter(&filter.root)?;

    let evaluator = Evaluator {
        calendar,
        ctx: *ctx,
        options,
    };
    let matched = evaluator.component_matches(&calendar.root, &filter.root, None)?;
    tracing::debug!(matched, "Evaluated calendar filter");
    Ok(matched)
}

struct Evaluator<'c, 'r> {
    calendar: &'c ICalendar,
    ctx: TimeContext<'r>,
    options: &'c EngineOptions,
}

impl Evaluator<'_, '_> {
    fn component_matches(
        &self,
        component: &Component,
        filter: &CompFilter,
        parent: Option<&Component>,
    ) -> ServiceResult<bool> {
        if let Some(range) = &filter.time_range
            && !self.in_range(component, range, parent)?
        {
            return Ok(false);
        }

        for prop_filter in &filter.prop_filters {
            if !self.prop_matches(component, prop_filter)? {
                return Ok(false);
            }
        }

        for comp_filter in &filter.comp_filters {
            if !self.children_match(component, comp_filter)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn children_match(&self, parent: &Component, filter: &CompFilter) -> ServiceResult<bool> {
        let kind = ComponentKind::parse(&filter.name);
        let mut children = parent.children_of_kind(kind).peekable();

        if filter.is_not_defined {
            return Ok(children.peek().is_none());
        }

        for child in children {
            if self.component_matches(child, filter, Some(parent))? {
                return Ok(true);
            }
        }
        tracing::trace!(component = %filter.name, "No child component matched");
        Ok(false)
    }

    fn in_range(
        &self,
        component: &Component,
        range: &TimeRange,
        parent: Option<&Component>,
    ) -> ServiceResult<bool> {
        let window = Period::new(range.start_or_min(), range.end_or_max())?;
        let ctx = self.ctx.with_reference(range.timezone);

        match component.kind {
            ComponentKind::Calendar => Ok(true),
            kind if kind.is_recurring_type() && is_master(component) => {
                let overrides = self.overrides_of(component);
                Ok(!expand(component, &overrides, &window, &ctx, self.options)?.is_empty())
            }
            ComponentKind::Event | ComponentKind::Journal => {
                Ok(ComponentSpan::resolve(component, &ctx)?
                    .is_some_and(|span| span.period().intersects(&window)))
            }
            ComponentKind::Todo => todo_in_range(component, &window, &ctx),
            ComponentKind::FreeBusy => freebusy_in_range(component, &window, &ctx),
            ComponentKind::Alarm => match parent {
                Some(parent) => self.alarm_in_range(component, parent, &window, &ctx),
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    /// Top-level components sharing the master's UID and carrying a RECURRENCE-ID.
    fn overrides_of(&self, master: &Component) -> Vec<&Component> {
        self.calendar
            .components()
            .iter()
            .filter(|c| {
                c.kind == master.kind && c.recurrence_id().is_some() && c.uid() == master.uid()
            })
            .collect()
    }

    /// ## Summary
    /// Tests whether any trigger of `alarm` fires inside `window`.
    ///
    /// Relative triggers are evaluated against every instance of the parent,
    /// from its start or (with `RELATED=END`) its end. REPEAT/DURATION add
    /// further trigger instants.
    fn alarm_in_range(
        &self,
        alarm: &Component,
        parent: &Component,
        window: &Period,
        ctx: &TimeContext<'_>,
    ) -> ServiceResult<bool> {
        let Some(trigger) = alarm.get_property(names::TRIGGER) else {
            return Ok(false);
        };
        let repeat = alarm
            .get_property(names::REPEAT)
            .and_then(|p| p.value.as_integer())
            .unwrap_or(0)
            .max(0);
        let interval = alarm
            .get_property(names::DURATION)
            .and_then(Property::as_duration)
            .map_or_else(TimeDelta::zero, IcalDuration::to_time_delta);
        let fires = |base: DateTime<Utc>| {
            (0..=repeat).any(|k| {
                interval
                    .checked_mul(k)
                    .and_then(|step| base.checked_add_signed(step))
                    .is_some_and(|t| Period::instant(t).intersects(window))
            })
        };

        if let Some(absolute) = ctx.property_to_utc(trigger)? {
            return Ok(fires(absolute));
        }
        let Some(offset) = trigger.as_duration().map(IcalDuration::to_time_delta) else {
            return Ok(false);
        };
        let related_end = trigger
            .get_param("RELATED")
            .is_some_and(|p| p.has_value("END"));

        let bases: Vec<DateTime<Utc>> = if parent.kind.is_recurring_type() && is_master(parent) {
            let reach = interval
                .checked_mul(repeat)
                .and_then(|span| span.checked_add(&offset.abs()))
                .and_then(|span| span.checked_add(&TimeDelta::seconds(1)))
                .unwrap_or(TimeDelta::MAX);
            let overrides = self.overrides_of(parent);
            expand(parent, &overrides, &window.widen(reach, reach), ctx, self.options)?
                .iter()
                .map(|i| if related_end { i.end } else { i.start })
                .collect()
        } else {
            ComponentSpan::resolve(parent, ctx)?
                .map(|span| if related_end { span.end } else { span.start })
                .into_iter()
                .collect()
        };

        Ok(bases
            .into_iter()
            .filter_map(|base| base.checked_add_signed(offset))
            .any(fires))
    }

    fn prop_matches(&self, component: &Component, filter: &PropFilter) -> ServiceResult<bool> {
        let mut props = component.get_properties(&filter.name).peekable();
        if filter.is_not_defined {
            return Ok(props.peek().is_none());
        }

        for prop in props {
            if let Some(range) = &filter.time_range
                && !self.prop_in_range(prop, range)?
            {
                continue;
            }
            if let Some(text_match) = &filter.text_match
                && !text_match.matches(&prop.value.to_match_text())
            {
                continue;
            }
            if filter.param_filters.iter().all(|pf| param_matches(prop, pf)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// DATE-TIME values match when `S <= t < E`; DATE values cover their whole day.
    fn prop_in_range(&self, prop: &Property, range: &TimeRange) -> ServiceResult<bool> {
        let window = Period::new(range.start_or_min(), range.end_or_max())?;
        let ctx = self.ctx.with_reference(range.timezone);
        Ok(ctx
            .property_periods(prop, None)?
            .iter()
            .any(|p| p.intersects(&window)))
    }
}

fn is_master(component: &Component) -> bool {
    component.is_recurring() && component.recurrence_id().is_none()
}

fn param_matches(prop: &Property, filter: &ParamFilter) -> bool {
    let param = prop.get_param(&filter.name);
    if filter.is_not_defined {
        return param.is_none();
    }
    match (param, &filter.text_match) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(param), Some(text_match)) => param.values.iter().any(|v| text_match.matches(v)),
    }
}

fn instant_of(
    component: &Component,
    name: &str,
    ctx: &TimeContext<'_>,
) -> ServiceResult<Option<DateTime<Utc>>> {
    match component.get_property(name) {
        Some(prop) => ctx.property_to_utc(prop),
        None => Ok(None),
    }
}

/// VTODO overlap table of RFC 4791 §9.9.
fn todo_in_range(todo: &Component, window: &Period, ctx: &TimeContext<'_>) -> ServiceResult<bool> {
    let (s, e) = (window.start, window.end);
    let dtstart = instant_of(todo, names::DTSTART, ctx)?;
    let due = instant_of(todo, names::DUE, ctx)?;
    let duration = todo
        .get_property(names::DURATION)
        .and_then(Property::as_duration)
        .map(IcalDuration::to_time_delta);

    let matched = match (dtstart, duration, due) {
        (Some(start), Some(duration), _) => {
            let end = start
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            s <= end && (s < end || s <= start) && (e > start || e >= end)
        }
        (Some(start), None, Some(due)) => (s < due || s <= start) && (e > start || e >= due),
        (Some(start), None, None) => s <= start && e > start,
        (None, _, Some(due)) => s < due && e >= due,
        (None, _, None) => {
            let completed = instant_of(todo, names::COMPLETED, ctx)?;
            let created = instant_of(todo, names::CREATED, ctx)?;
            match (completed, created) {
                (Some(completed), Some(created)) => {
                    (s <= created || s <= completed) && (e >= created || e >= completed)
                }
                (Some(completed), None) => s <= completed && e >= completed,
                (None, Some(created)) => e > created,
                (None, None) => true,
            }
        }
    };
    Ok(matched)
}

/// VFREEBUSY overlap: DTSTART/DTEND when present, else any FREEBUSY period.
fn freebusy_in_range(
    freebusy: &Component,
    window: &Period,
    ctx: &TimeContext<'_>,
) -> ServiceResult<bool> {
    let start = instant_of(freebusy, names::DTSTART, ctx)?;
    let end = instant_of(freebusy, names::DTEND, ctx)?;
    if let (Some(start), Some(end)) = (start, end) {
        return Ok(window.start <= end && window.end > start);
    }

    for prop in freebusy.get_properties(names::FREEBUSY) {
        if !matches!(prop.value, Value::Period(_) | Value::PeriodList(_)) {
            continue;
        }
        if ctx
            .property_periods(prop, None)?
            .iter()
            .any(|p| window.start < p.end && window.end > p.start)
        {
            return Ok(true);
        }
    }
    Ok(false)
}
