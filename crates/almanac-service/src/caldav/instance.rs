//! ## Summary
//! Expansion of a master component and its overrides into concrete instances.
//!
//! Each generated recurrence id resolves to exactly one source: an exact
//! override for that id, else the latest THISANDFUTURE override at or before
//! it, else the master. Overrides whose recurrence id the master never
//! generates are orphans; they are reported and emitted on their own times.

use std::collections::BTreeMap;

use almanac_rfc::ical::core::Component;
use chrono::{DateTime, Months, TimeDelta, Utc};

use super::period::Period;
use super::recurrence::RecurrenceSeries;
use super::time::{ComponentSpan, TimeContext};
use crate::error::{ServiceError, ServiceResult};
use crate::options::EngineOptions;

/// Which component an instance's properties come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSource {
    Master,
    /// An override targeting exactly this recurrence id.
    Override,
    /// A THISANDFUTURE override issued at `recurrence_id`.
    ThisAndFuture { recurrence_id: DateTime<Utc> },
}

/// One resolved occurrence.
#[derive(Debug, Clone, Copy)]
pub struct Instance<'a> {
    pub recurrence_id: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub component: &'a Component,
    pub source: InstanceSource,
}

impl Instance<'_> {
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        self.source != InstanceSource::Master
    }

    #[must_use]
    pub fn period(&self) -> Period {
        Period::clamped(self.start, self.end)
    }
}

/// Expansion result keyed by recurrence id.
#[derive(Debug, Clone, Default)]
pub struct InstanceList<'a> {
    instances: BTreeMap<DateTime<Utc>, Instance<'a>>,
    orphans: Vec<DateTime<Utc>>,
}

impl<'a> InstanceList<'a> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterates instances in recurrence-id order.
    pub fn iter(&self) -> impl Iterator<Item = &Instance<'a>> {
        self.instances.values()
    }

    #[must_use]
    pub fn get(&self, recurrence_id: DateTime<Utc>) -> Option<&Instance<'a>> {
        self.instances.get(&recurrence_id)
    }

    /// Recurrence ids of overrides with no matching master occurrence.
    #[must_use]
    pub fn orphan_overrides(&self) -> &[DateTime<Utc>] {
        &self.orphans
    }
}

impl<'a> IntoIterator for InstanceList<'a> {
    type Item = Instance<'a>;
    type IntoIter = std::collections::btree_map::IntoValues<DateTime<Utc>, Instance<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.into_values()
    }
}

#[derive(Debug, Clone, Copy)]
struct ResolvedOverride<'a> {
    component: &'a Component,
    recurrence_id: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ResolvedOverride<'_> {
    fn shift(&self) -> TimeDelta {
        self.start.signed_duration_since(self.recurrence_id)
    }

    fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    fn period(&self) -> Period {
        Period::clamped(self.start, self.end)
    }
}

/// Exact overrides by recurrence id, and THISANDFUTURE overrides sorted by recurrence id.
type OverrideIndex<'a> = (
    BTreeMap<DateTime<Utc>, ResolvedOverride<'a>>,
    Vec<ResolvedOverride<'a>>,
);

fn resolve_overrides<'a>(
    overrides: &[&'a Component],
    default_duration: TimeDelta,
    ctx: &TimeContext<'_>,
) -> ServiceResult<OverrideIndex<'a>> {
    let mut exact = BTreeMap::new();
    let mut this_and_future = Vec::new();

    for &component in overrides {
        let Some(rid_prop) = component.recurrence_id() else {
            continue;
        };
        let Some(recurrence_id) = ctx.property_to_utc(rid_prop)? else {
            return Err(ServiceError::InvalidComponent {
                component: component.uid().unwrap_or(&component.name).to_string(),
                reason: "RECURRENCE-ID is not a DATE or DATE-TIME".to_string(),
            });
        };
        let (start, end) = match ComponentSpan::resolve(component, ctx)? {
            Some(span) => (span.start, span.end),
            None => (recurrence_id, recurrence_id + default_duration),
        };
        let resolved = ResolvedOverride {
            component,
            recurrence_id,
            start,
            end,
        };

        if component.is_this_and_future() {
            this_and_future.push(resolved);
        } else {
            exact.entry(recurrence_id).or_insert(resolved);
        }
    }

    this_and_future.sort_by_key(|o| o.recurrence_id);
    Ok((exact, this_and_future))
}

/// ## Summary
/// Expands `master` with its `overrides` into the instances intersecting `window`.
///
/// ## Errors
/// Returns `ServiceError::InvalidWindow` for an inverted window,
/// `ServiceError::InvalidRecurrenceRule` for a malformed rule, and timezone
/// errors for unresolvable date-times.
pub fn expand<'a>(
    master: &'a Component,
    overrides: &[&'a Component],
    window: &Period,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<InstanceList<'a>> {
    window.validate()?;

    let series = RecurrenceSeries::from_master(master, ctx, options)?;
    let default_duration = series
        .as_ref()
        .map_or_else(TimeDelta::zero, RecurrenceSeries::duration);
    let (exact, this_and_future) = resolve_overrides(overrides, default_duration, ctx)?;

    // Widen by the longest instance and by THISANDFUTURE shifts so that
    // occurrences generated outside the window but moved into it are seen.
    let mut before = series
        .as_ref()
        .map_or_else(TimeDelta::zero, RecurrenceSeries::max_duration);
    let mut after = TimeDelta::zero();
    for o in &this_and_future {
        before = before.max(o.shift() + o.duration());
        after = after.max(-o.shift());
    }
    let generation = window.widen(before, after);

    let mut list = InstanceList::default();
    let generated = series
        .as_ref()
        .map(|s| s.occurrences(&generation))
        .unwrap_or_default();

    for occurrence in &generated {
        let rid = occurrence.start;
        let instance = if let Some(o) = exact.get(&rid) {
            Instance {
                recurrence_id: rid,
                start: o.start,
                end: o.end,
                component: o.component,
                source: InstanceSource::Override,
            }
        } else if let Some(o) = governing(&this_and_future, rid) {
            let start = rid + o.shift();
            Instance {
                recurrence_id: rid,
                start,
                end: start + o.duration(),
                component: o.component,
                source: InstanceSource::ThisAndFuture {
                    recurrence_id: o.recurrence_id,
                },
            }
        } else {
            Instance {
                recurrence_id: rid,
                start: occurrence.start,
                end: occurrence.end,
                component: master,
                source: InstanceSource::Master,
            }
        };
        list.instances.insert(rid, instance);
    }

    let leftovers = exact
        .values()
        .map(|o| (o, InstanceSource::Override))
        .chain(this_and_future.iter().map(|o| {
            (
                o,
                InstanceSource::ThisAndFuture {
                    recurrence_id: o.recurrence_id,
                },
            )
        }));
    for (o, source) in leftovers {
        if list.instances.contains_key(&o.recurrence_id) {
            continue;
        }
        let known = series.as_ref().is_some_and(|s| s.contains(o.recurrence_id));
        if !known {
            tracing::warn!(
                uid = master.uid().unwrap_or_default(),
                recurrence_id = %o.recurrence_id,
                "Override does not match any master occurrence"
            );
            list.orphans.push(o.recurrence_id);
        }
        if o.period().intersects(window) {
            list.instances.insert(
                o.recurrence_id,
                Instance {
                    recurrence_id: o.recurrence_id,
                    start: o.start,
                    end: o.end,
                    component: o.component,
                    source,
                },
            );
        }
    }

    list.instances
        .retain(|_, instance| instance.period().intersects(window));

    tracing::debug!(
        uid = master.uid().unwrap_or_default(),
        window_start = %window.start,
        window_end = %window.end,
        instances = list.len(),
        orphans = list.orphans.len(),
        "Expanded recurrence set"
    );
    Ok(list)
}

/// A master and the overrides that share its UID.
#[derive(Debug, Clone)]
pub struct SeriesGroup<'a> {
    pub uid: &'a str,
    pub master: Option<&'a Component>,
    pub overrides: Vec<&'a Component>,
}

impl SeriesGroup<'_> {
    /// Returns whether the group needs expansion rather than a single span.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        !self.overrides.is_empty() || self.master.is_some_and(Component::is_recurring)
    }
}

/// ## Summary
/// Groups components by UID in order of first appearance.
///
/// The first component without RECURRENCE-ID becomes the master; later
/// duplicates are ignored. Components without a UID are returned separately.
pub fn group_by_uid<'a>(
    components: impl IntoIterator<Item = &'a Component>,
) -> (Vec<SeriesGroup<'a>>, Vec<&'a Component>) {
    let mut groups: Vec<SeriesGroup<'a>> = Vec::new();
    let mut index: BTreeMap<&'a str, usize> = BTreeMap::new();
    let mut loose = Vec::new();

    for component in components {
        let Some(uid) = component.uid() else {
            loose.push(component);
            continue;
        };
        let slot = *index.entry(uid).or_insert_with(|| {
            groups.push(SeriesGroup {
                uid,
                master: None,
                overrides: Vec::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        if component.recurrence_id().is_some() {
            group.overrides.push(component);
        } else if group.master.is_none() {
            group.master = Some(component);
        } else {
            tracing::warn!(uid, "Ignoring duplicate master component");
        }
    }
    (groups, loose)
}

/// Latest THISANDFUTURE override at or before `rid` in a list sorted by recurrence id.
fn governing<'s, 'a>(
    sorted: &'s [ResolvedOverride<'a>],
    rid: DateTime<Utc>,
) -> Option<&'s ResolvedOverride<'a>> {
    let idx = sorted.partition_point(|o| o.recurrence_id <= rid);
    idx.checked_sub(1).and_then(|i| sorted.get(i))
}

/// ## Summary
/// Reports whether `instant` is the start of an occurrence generated by
/// `master`'s recurrence set.
///
/// ## Errors
/// Returns rule and timezone errors raised while building the series.
pub fn is_occurrence(
    master: &Component,
    instant: DateTime<Utc>,
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<bool> {
    Ok(RecurrenceSeries::from_master(master, ctx, options)?
        .is_some_and(|series| series.contains(instant)))
}

/// Overall span covered by a recurrence set. `end` is `None` for an unbounded series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRange {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl RecurrenceRange {
    /// Returns the end, substituting `now + horizon_months` for an unbounded series.
    #[must_use]
    pub fn end_or_horizon(&self, now: DateTime<Utc>, horizon_months: u32) -> DateTime<Utc> {
        self.end.unwrap_or_else(|| {
            now.checked_add_months(Months::new(horizon_months))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}

/// ## Summary
/// Computes the span from the first instance start to the last instance end.
///
/// Finite series are expanded in full, capped by `max_instances`. Override
/// periods widen the span.
///
/// ## Errors
/// Returns rule and timezone errors raised while building the series.
pub fn calculate_recurrence_range(
    master: &Component,
    overrides: &[&Component],
    ctx: &TimeContext<'_>,
    options: &EngineOptions,
) -> ServiceResult<Option<RecurrenceRange>> {
    let Some(series) = RecurrenceSeries::from_master(master, ctx, options)? else {
        return Ok(None);
    };

    let mut start = series.dtstart();
    let mut end = if series.is_bounded() {
        let everything = Period::clamped(series.dtstart(), DateTime::<Utc>::MAX_UTC);
        Some(
            series
                .occurrences(&everything)
                .iter()
                .map(|p| p.end)
                .fold(series.dtstart() + series.duration(), std::cmp::max),
        )
    } else {
        None
    };

    let (exact, this_and_future) = resolve_overrides(overrides, series.duration(), ctx)?;
    for o in exact.values().chain(this_and_future.iter()) {
        start = start.min(o.start);
        end = end.map(|e| e.max(o.end));
    }

    tracing::debug!(%start, end = ?end, "Calculated recurrence range");
    Ok(Some(RecurrenceRange { start, end }))
}
