//! Recurrence set of a master component: RRULE, RDATE, EXDATE and EXRULE
//! resolved against the series timezone.

use almanac_rfc::ical::core::{Component, DateTimeForm, Property, Value, names};
use almanac_rfc::ical::timezone::local_to_utc;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use rrule::{RRule, RRuleSet, Tz, Unvalidated};

use super::period::Period;
use super::time::{ComponentSpan, TimeContext};
use crate::error::{ServiceError, ServiceResult};
use crate::options::EngineOptions;

/// A parsed RRULE or EXRULE, kept with its source text for error reporting.
#[derive(Debug, Clone)]
struct Rule {
    text: String,
    set: RRuleSet,
    bounded: bool,
}

/// An RDATE instant. PERIOD values carry their own end.
#[derive(Debug, Clone, Copy)]
struct RDate {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

/// Resolved recurrence definition of one master component.
#[derive(Debug, Clone)]
pub struct RecurrenceSeries {
    label: String,
    dtstart: DateTime<Utc>,
    duration: TimeDelta,
    all_day: bool,
    zone: Option<chrono_tz::Tz>,
    rules: Vec<Rule>,
    exrules: Vec<Rule>,
    rdates: Vec<RDate>,
    exdates: Vec<DateTime<Utc>>,
    limit: u16,
}

impl RecurrenceSeries {
    /// ## Summary
    /// Builds the recurrence set of `master`.
    ///
    /// A component without RRULE or RDATE yields a series holding only its
    /// DTSTART. Returns `Ok(None)` when the component has no DTSTART.
    ///
    /// ## Errors
    /// Returns `ServiceError::InvalidRecurrenceRule` for a malformed RRULE or
    /// EXRULE, and timezone errors for unresolvable date-times.
    pub fn from_master(
        master: &Component,
        ctx: &TimeContext<'_>,
        options: &EngineOptions,
    ) -> ServiceResult<Option<Self>> {
        let Some(span) = ComponentSpan::resolve(master, ctx)? else {
            tracing::trace!(component = %master.name, "No DTSTART, nothing to expand");
            return Ok(None);
        };
        let label = master.uid().unwrap_or(&master.name).to_string();
        let zone = series_zone(master, ctx)?;
        let rule_start = match zone {
            Some(tz) => span.start.with_timezone(&Tz::Tz(tz)),
            None => span.start.with_timezone(&Tz::UTC),
        };

        let rules = master
            .get_properties(names::RRULE)
            .filter_map(|prop| {
                build_rule(&label, prop, rule_start, zone, span.all_day).transpose()
            })
            .collect::<ServiceResult<Vec<_>>>()?;
        let exrules = master
            .get_properties(names::EXRULE)
            .filter_map(|prop| {
                build_rule(&label, prop, rule_start, zone, span.all_day).transpose()
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        let mut rdates = Vec::new();
        for prop in master.get_properties(names::RDATE) {
            let keeps_end = matches!(prop.value, Value::Period(_) | Value::PeriodList(_));
            rdates.extend(
                ctx.property_periods(prop, None)?
                    .into_iter()
                    .map(|p| RDate {
                        start: p.start,
                        end: keeps_end.then_some(p.end),
                    }),
            );
        }

        let mut exdates = Vec::new();
        for prop in master.get_properties(names::EXDATE) {
            exdates.extend(ctx.property_periods(prop, None)?.into_iter().map(|p| p.start));
        }

        tracing::debug!(
            component = %label,
            dtstart = %span.start,
            rules = rules.len(),
            exrules = exrules.len(),
            rdates = rdates.len(),
            exdates = exdates.len(),
            "Built recurrence series"
        );

        Ok(Some(Self {
            label,
            dtstart: span.start,
            duration: span.duration(),
            all_day: span.all_day,
            zone,
            rules,
            exrules,
            rdates,
            exdates,
            limit: options.rrule_limit(),
        }))
    }

    #[must_use]
    pub fn dtstart(&self) -> DateTime<Utc> {
        self.dtstart
    }

    /// Duration of instances generated by RRULE and plain RDATE values.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    #[must_use]
    pub fn is_all_day(&self) -> bool {
        self.all_day
    }

    /// Longest instance duration in the set, including RDATE periods.
    #[must_use]
    pub fn max_duration(&self) -> TimeDelta {
        self.rdates
            .iter()
            .filter_map(|r| r.end.map(|end| end.signed_duration_since(r.start)))
            .fold(self.duration, TimeDelta::max)
    }

    /// Returns whether the series ends, i.e. every RRULE has COUNT or UNTIL.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.rules.iter().all(|r| r.bounded)
    }

    /// ## Summary
    /// Generates every instance whose start lies in `[from.start, from.end]`.
    ///
    /// Instances are returned sorted by start with duplicates removed. The
    /// start is the instance's recurrence id. DTSTART is always an instance
    /// unless excluded.
    #[must_use]
    pub fn occurrences(&self, from: &Period) -> Vec<Period> {
        let in_range = |t: DateTime<Utc>| from.start <= t && t <= from.end;
        let mut starts: std::collections::BTreeMap<DateTime<Utc>, DateTime<Utc>> =
            std::collections::BTreeMap::new();
        let plain_end = |t: DateTime<Utc>| {
            t.checked_add_signed(self.duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        };

        if in_range(self.dtstart) {
            starts.insert(self.dtstart, plain_end(self.dtstart));
        }
        for rule in &self.rules {
            for t in self.rule_instants(rule, from) {
                starts.entry(t).or_insert_with(|| plain_end(t));
            }
        }
        for rdate in self.rdates.iter().filter(|r| in_range(r.start)) {
            let end = rdate.end.unwrap_or_else(|| plain_end(rdate.start));
            starts.entry(rdate.start).or_insert(end);
        }

        let excluded: Vec<DateTime<Utc>> = self
            .exrules
            .iter()
            .flat_map(|rule| self.rule_instants(rule, from))
            .chain(self.exdates.iter().copied())
            .collect();
        starts.retain(|start, _| !excluded.iter().any(|ex| self.same_instance(*start, *ex)));

        tracing::trace!(
            component = %self.label,
            from = %from.start,
            to = %from.end,
            count = starts.len(),
            "Generated occurrences"
        );

        starts
            .into_iter()
            .map(|(start, end)| Period::clamped(start, end))
            .collect()
    }

    /// Returns whether `instant` is the start of a generated occurrence.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.occurrences(&Period::instant(instant))
            .iter()
            .any(|p| p.start == instant)
    }

    fn rule_instants(&self, rule: &Rule, from: &Period) -> Vec<DateTime<Utc>> {
        let to_rule_tz = |t: DateTime<Utc>| match self.zone {
            Some(tz) => t.with_timezone(&Tz::Tz(tz)),
            None => t.with_timezone(&Tz::UTC),
        };
        let mut set = rule.set.clone();
        if let Some(after) = from.start.checked_sub_signed(TimeDelta::seconds(1)) {
            set = set.after(to_rule_tz(after));
        }
        if let Some(before) = from.end.checked_add_signed(TimeDelta::seconds(1)) {
            set = set.before(to_rule_tz(before));
        }

        let result = set.all(self.limit);
        if result.limited {
            tracing::warn!(
                component = %self.label,
                rule = %rule.text,
                limit = self.limit,
                "Recurrence expansion hit the instance limit"
            );
        }
        result
            .dates
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .filter(|t| from.start <= *t && *t <= from.end)
            .collect()
    }

    fn same_instance(&self, start: DateTime<Utc>, excluded: DateTime<Utc>) -> bool {
        if start == excluded {
            return true;
        }
        self.all_day && self.local_date(start) == self.local_date(excluded)
    }

    fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        match self.zone {
            Some(tz) => t.with_timezone(&tz).date_naive(),
            None => t.date_naive(),
        }
    }
}

/// Zone the rule is evaluated in: the DTSTART zone, or the reference zone
/// for floating and DATE values.
fn series_zone(
    master: &Component,
    ctx: &TimeContext<'_>,
) -> ServiceResult<Option<chrono_tz::Tz>> {
    let Some(dtstart) = master.get_property(names::DTSTART) else {
        return Ok(ctx.reference);
    };
    let zone = match &dtstart.value {
        Value::DateTime(dt) => match &dt.form {
            DateTimeForm::Utc => None,
            DateTimeForm::Zoned { tzid } => Some(ctx.registry.resolve(tzid)?),
            DateTimeForm::Floating => match dtstart.get_param_value("TZID") {
                Some(tzid) => Some(ctx.registry.resolve(tzid)?),
                None => ctx.reference,
            },
        },
        _ => ctx.reference,
    };
    Ok(zone)
}

fn build_rule(
    label: &str,
    prop: &Property,
    dt_start: DateTime<Tz>,
    zone: Option<chrono_tz::Tz>,
    all_day: bool,
) -> ServiceResult<Option<Rule>> {
    let invalid = |rule: &str, reason: String| ServiceError::InvalidRecurrenceRule {
        component: label.to_string(),
        rule: rule.to_string(),
        reason,
    };

    let Some(raw) = prop.value.as_recur() else {
        return Err(invalid(
            &prop.value.to_match_text(),
            format!("{} is not a RECUR value", prop.name),
        ));
    };
    let text = normalize_until(raw, zone, all_day).map_err(|reason| invalid(raw, reason))?;
    if utc_until(&text).is_some_and(|until| until < dt_start.with_timezone(&Utc)) {
        tracing::debug!(component = %label, rule = %raw, "UNTIL precedes DTSTART, rule is empty");
        return Ok(None);
    }
    let bounded = rule_parts(&text).any(|(key, _)| key == "COUNT" || key == "UNTIL");

    let set = text
        .parse::<RRule<Unvalidated>>()
        .map_err(|err| invalid(raw, err.to_string()))?
        .build(dt_start)
        .map_err(|err| invalid(raw, err.to_string()))?;

    tracing::trace!(component = %label, rule = %text, "Parsed recurrence rule");
    Ok(Some(Rule {
        text: raw.to_string(),
        set,
        bounded,
    }))
}

/// UNTIL of a rule already passed through `normalize_until`.
fn utc_until(text: &str) -> Option<DateTime<Utc>> {
    let (_, value) = rule_parts(text).find(|(key, _)| key == "UNTIL")?;
    let value = value.strip_suffix(['Z', 'z'])?;
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(|local| local.and_utc())
}

fn rule_parts(text: &str) -> impl Iterator<Item = (String, &str)> {
    text.split(';').filter_map(|part| {
        let (key, value) = part.split_once('=')?;
        Some((key.trim().to_ascii_uppercase(), value.trim()))
    })
}

/// ## Summary
/// Rewrites UNTIL as a UTC date-time.
///
/// A DATE UNTIL covers the whole day in the series zone. A floating UNTIL is
/// read in the series zone. A UTC UNTIL is kept.
fn normalize_until(
    text: &str,
    zone: Option<chrono_tz::Tz>,
    all_day: bool,
) -> Result<String, String> {
    let mut parts = Vec::new();
    for part in text.split(';').filter(|p| !p.trim().is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            parts.push(part.to_string());
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("UNTIL") || value.ends_with(['Z', 'z']) {
            parts.push(part.to_string());
            continue;
        }

        let local = if value.len() == 8 {
            let date = NaiveDate::parse_from_str(value, "%Y%m%d")
                .map_err(|err| format!("invalid UNTIL {value}: {err}"))?;
            let time = if all_day {
                NaiveTime::MIN
            } else {
                NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
            };
            date.and_time(time)
        } else {
            NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
                .map_err(|err| format!("invalid UNTIL {value}: {err}"))?
        };
        let until = match zone {
            Some(tz) => local_to_utc(local, tz).map_err(|err| err.to_string())?,
            None => local.and_utc(),
        };
        parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
    }
    Ok(parts.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_rfc::ical::core::{Date, DateTime as IcalDateTime, Period as IcalPeriod};
    use almanac_rfc::ical::timezone::TimezoneRegistry;
    use chrono::TimeZone;

    fn utc(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, month, day, hour, 0, 0).unwrap()
    }

    fn daily_master(rule: &str) -> Component {
        Component::event()
            .with_property(Property::text(names::UID, "daily"))
            .with_property(Property::datetime(
                names::DTSTART,
                IcalDateTime::utc(2006, 1, 2, 19, 0, 0),
            ))
            .with_property(Property::datetime(
                names::DTEND,
                IcalDateTime::utc(2006, 1, 2, 20, 0, 0),
            ))
            .with_property(Property::recur(names::RRULE, rule))
    }

    fn series(master: &Component) -> RecurrenceSeries {
        let registry = TimezoneRegistry::new();
        let ctx = TimeContext::new(&registry, None);
        RecurrenceSeries::from_master(master, &ctx, &EngineOptions::default())
            .unwrap()
            .unwrap()
    }

    fn starts(periods: &[Period]) -> Vec<DateTime<Utc>> {
        periods.iter().map(|p| p.start).collect()
    }

    #[test_log::test]
    fn count_bounds_the_series() {
        let series = series(&daily_master("FREQ=DAILY;COUNT=5"));
        let all = series
            .occurrences(&Period::new(utc(1, 1, 0), utc(2, 1, 0)).unwrap());
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].start, utc(1, 6, 19));
        assert_eq!(all[0].duration(), TimeDelta::hours(1));
        assert!(series.is_bounded());
    }

    #[test_log::test]
    fn range_bounds_are_inclusive() {
        let series = series(&daily_master("FREQ=DAILY;COUNT=5"));
        let found = series
            .occurrences(&Period::new(utc(1, 3, 19), utc(1, 5, 19)).unwrap());
        assert_eq!(
            starts(&found),
            vec![utc(1, 3, 19), utc(1, 4, 19), utc(1, 5, 19)]
        );
    }

    #[test_log::test]
    fn exdate_and_rdate() {
        let master = daily_master("FREQ=DAILY;COUNT=4")
            .with_property(Property::datetimes(
                names::EXDATE,
                vec![
                    IcalDateTime::utc(2006, 1, 3, 19, 0, 0),
                    IcalDateTime::utc(2006, 1, 5, 19, 0, 0),
                ],
            ))
            .with_property(Property::periods(
                names::RDATE,
                vec![IcalPeriod::explicit(
                    IcalDateTime::utc(2006, 1, 10, 8, 0, 0),
                    IcalDateTime::utc(2006, 1, 10, 12, 0, 0),
                )],
            ));
        let series = series(&master);
        let found = series
            .occurrences(&Period::new(utc(1, 1, 0), utc(2, 1, 0)).unwrap());
        assert_eq!(
            starts(&found),
            vec![utc(1, 2, 19), utc(1, 4, 19), utc(1, 10, 8)]
        );
        assert_eq!(found[2].duration(), TimeDelta::hours(4));
        assert_eq!(series.max_duration(), TimeDelta::hours(4));
    }

    #[test_log::test]
    fn exrule_removes_generated_instants() {
        let master = daily_master("FREQ=DAILY;COUNT=6")
            .with_property(Property::recur(names::EXRULE, "FREQ=DAILY;INTERVAL=2;COUNT=3"));
        let found = series(&master)
            .occurrences(&Period::new(utc(1, 1, 0), utc(2, 1, 0)).unwrap());
        assert_eq!(
            starts(&found),
            vec![utc(1, 3, 19), utc(1, 5, 19), utc(1, 7, 19)]
        );
    }

    #[test_log::test]
    fn until_before_dtstart_leaves_only_dtstart() {
        let master = Component::event()
            .with_property(Property::text(names::UID, "late"))
            .with_property(Property::datetime(
                names::DTSTART,
                IcalDateTime::utc(2006, 1, 5, 9, 0, 0),
            ))
            .with_property(Property::recur(
                names::RRULE,
                "FREQ=DAILY;UNTIL=20060101T000000Z",
            ));
        let series = series(&master);
        let found = series.occurrences(&Period::new(utc(1, 1, 0), utc(1, 10, 0)).unwrap());
        assert_eq!(starts(&found), vec![utc(1, 5, 9)]);
        assert!(series.is_bounded());
    }

    #[test_log::test]
    fn dtstart_is_always_an_instance() {
        let master = Component::event()
            .with_property(Property::datetime(
                names::DTSTART,
                IcalDateTime::utc(2006, 1, 2, 19, 0, 0),
            ))
            .with_property(Property::recur(names::RRULE, "FREQ=WEEKLY;BYDAY=FR;COUNT=2"));
        let found = series(&master)
            .occurrences(&Period::new(utc(1, 1, 0), utc(2, 1, 0)).unwrap());
        assert_eq!(
            starts(&found),
            vec![utc(1, 2, 19), utc(1, 6, 19), utc(1, 13, 19)]
        );
    }

    #[test_log::test]
    fn zoned_series_follows_local_time_across_dst() {
        let master = Component::event()
            .with_property(Property::datetime(
                names::DTSTART,
                IcalDateTime::zoned(2006, 3, 31, 14, 0, 0, "US/Eastern"),
            ))
            .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=3"));
        let found = series(&master)
            .occurrences(&Period::new(utc(3, 1, 0), utc(5, 1, 0)).unwrap());
        assert_eq!(
            starts(&found),
            vec![utc(3, 31, 19), utc(4, 1, 19), utc(4, 2, 18)]
        );
    }

    #[test_log::test]
    fn date_until_covers_the_whole_day() {
        let found = series(&daily_master("FREQ=DAILY;UNTIL=20060104"))
            .occurrences(&Period::new(utc(1, 1, 0), utc(2, 1, 0)).unwrap());
        assert_eq!(found.len(), 3);
    }

    #[test_log::test]
    fn all_day_exdate_matches_by_date() {
        let master = Component::event()
            .with_property(Property::date(names::DTSTART, Date::new(2006, 1, 2)))
            .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=3"))
            .with_property(Property::datetime(
                names::EXDATE,
                IcalDateTime::utc(2006, 1, 3, 12, 0, 0),
            ));
        let series = series(&master);
        assert!(series.is_all_day());
        let found = series
            .occurrences(&Period::new(utc(1, 1, 0), utc(2, 1, 0)).unwrap());
        assert_eq!(starts(&found), vec![utc(1, 2, 0), utc(1, 4, 0)]);
        assert_eq!(found[0].duration(), TimeDelta::days(1));
    }

    #[test_log::test]
    fn unbounded_rule_is_reported() {
        let series = series(&daily_master("FREQ=WEEKLY"));
        assert!(!series.is_bounded());
    }

    #[test_log::test]
    fn contains_checks_generated_starts() {
        let series = series(&daily_master("FREQ=DAILY;COUNT=5"));
        assert!(series.contains(utc(1, 4, 19)));
        assert!(!series.contains(utc(1, 4, 20)));
        assert!(!series.contains(utc(1, 7, 19)));
    }

    #[test_log::test]
    fn malformed_rule_is_rejected() {
        let registry = TimezoneRegistry::new();
        let ctx = TimeContext::new(&registry, None);
        let result = RecurrenceSeries::from_master(
            &daily_master("FREQ=SOMETIMES;COUNT=5"),
            &ctx,
            &EngineOptions::default(),
        );
        match result {
            Err(ServiceError::InvalidRecurrenceRule {
                component, rule, ..
            }) => {
                assert_eq!(component, "daily");
                assert_eq!(rule, "FREQ=SOMETIMES;COUNT=5");
            }
            other => panic!("expected InvalidRecurrenceRule, got {other:?}"),
        }
    }

    #[test]
    fn until_is_rewritten_to_utc() {
        assert_eq!(
            normalize_until(
                "FREQ=DAILY;UNTIL=20060104T140000",
                Some(chrono_tz::Tz::America__New_York),
                false
            )
            .unwrap(),
            "FREQ=DAILY;UNTIL=20060104T190000Z"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20060104T190000Z", None, false).unwrap(),
            "FREQ=DAILY;UNTIL=20060104T190000Z"
        );
        assert!(normalize_until("FREQ=DAILY;UNTIL=tomorrow", None, false).is_err());
    }
}
