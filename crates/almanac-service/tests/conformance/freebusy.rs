use almanac_rfc::ical::core::{
    Component, DateTime as IcalDateTime, ICalendar, Parameter, Period as IcalPeriod, Property,
    names,
};
use almanac_service::caldav::freebusy::{CalendarCollection, FreeBusySource, TimezoneProvider};
use almanac_service::caldav::period::Period;
use chrono_tz::Tz;

use super::helpers::{engine, event, exception, ical, utc, window};

fn weekly_standup() -> ICalendar {
    let master = event("standup", "standup", ical(2, 9, 0), ical(2, 9, 30))
        .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=7"));
    let cancelled = exception(
        "standup",
        "standup",
        ical(3, 9, 0),
        ical(3, 9, 0),
        ical(3, 9, 30),
        false,
    )
    .with_property(Property::text(names::STATUS, "CANCELLED"));
    let transparent = exception(
        "standup",
        "standup",
        ical(4, 9, 0),
        ical(4, 9, 0),
        ical(4, 9, 30),
        false,
    )
    .with_property(Property::text(names::TRANSP, "TRANSPARENT"));
    let maybe = exception(
        "standup",
        "standup",
        ical(5, 9, 0),
        ical(5, 9, 0),
        ical(5, 9, 30),
        false,
    )
    .with_property(Property::text(names::STATUS, "TENTATIVE"));

    ICalendar::default()
        .with_component(master)
        .with_component(cancelled)
        .with_component(transparent)
        .with_component(maybe)
}

fn all_periods(result: &almanac_service::caldav::freebusy::FreeBusyResult) -> Vec<Period> {
    result
        .busy()
        .iter()
        .chain(result.tentative())
        .chain(result.unavailable())
        .copied()
        .collect()
}

#[test_log::test]
fn cancelled_and_transparent_instances_are_free() {
    let calendar = weekly_standup();
    let engine = engine();
    let windows = [
        window(utc(1, 0, 0), utc(10, 0, 0)),
        window(utc(3, 0, 0), utc(5, 0, 0)),
        window(utc(3, 9, 15), utc(3, 9, 15)),
    ];
    for query in &windows {
        let result = engine
            .compute_free_busy(FreeBusySource::Calendar(&calendar), query)
            .expect("free/busy succeeds");
        for period in all_periods(&result) {
            assert!(!period.intersects(&window(utc(3, 9, 0), utc(3, 9, 30))));
            assert!(!period.intersects(&window(utc(4, 9, 0), utc(4, 9, 30))));
        }
    }
}

#[test_log::test]
fn tentative_instance_is_classified_separately() {
    let calendar = weekly_standup();
    let result = engine()
        .compute_free_busy(
            FreeBusySource::Calendar(&calendar),
            &window(utc(1, 0, 0), utc(10, 0, 0)),
        )
        .expect("free/busy succeeds");

    assert_eq!(result.busy().len(), 4);
    assert_eq!(
        result.tentative().as_slice(),
        &[window(utc(5, 9, 0), utc(5, 9, 30))]
    );
}

#[test_log::test]
fn results_stay_inside_window_and_normalized() {
    let overlapping = ICalendar::default()
        .with_component(event("a", "a", ical(1, 20, 0), ical(2, 10, 0)))
        .with_component(event("b", "b", ical(2, 9, 0), ical(2, 12, 0)))
        .with_component(event("c", "c", ical(2, 12, 0), ical(2, 13, 0)))
        .with_component(
            Component::freebusy().with_property(
                Property::periods(
                    names::FREEBUSY,
                    vec![IcalPeriod::explicit(ical(2, 22, 0), ical(3, 4, 0))],
                )
                .with_param(Parameter::fbtype("BUSY-UNAVAILABLE")),
            ),
        );
    let query = window(utc(2, 0, 0), utc(3, 0, 0));
    let result = engine()
        .compute_free_busy(FreeBusySource::Calendar(&overlapping), &query)
        .expect("free/busy succeeds");

    for period in all_periods(&result) {
        assert!(query.start <= period.start && period.end <= query.end);
    }
    assert!(result.busy().is_normalized());
    assert_eq!(result.busy().as_slice(), &[window(utc(2, 0, 0), utc(2, 13, 0))]);
    assert_eq!(
        result.unavailable().as_slice(),
        &[window(utc(2, 22, 0), utc(3, 0, 0))]
    );
}

struct FixedZone(Tz);

impl TimezoneProvider for FixedZone {
    fn timezone_for(&self, _collection: &CalendarCollection) -> Option<Tz> {
        Some(self.0)
    }
}

#[test_log::test]
fn user_rollup_honours_collection_flags_and_timezones() {
    let floating = |uid: &str, day: u8| {
        ICalendar::default().with_component(event(
            uid,
            uid,
            IcalDateTime::floating(2006, 1, day, 9, 0, 0),
            IcalDateTime::floating(2006, 1, day, 10, 0, 0),
        ))
    };
    let mut inbox = CalendarCollection::new("inbox").with_item(floating("inbox", 4));
    inbox.is_calendar = false;
    let collections = vec![
        CalendarCollection::new("work").with_item(floating("work", 2)),
        CalendarCollection::new("hidden")
            .with_item(floating("hidden", 3))
            .excluded_from_rollup(),
        inbox,
    ];

    let result = engine()
        .compute_free_busy_with(
            FreeBusySource::User(&collections),
            &window(utc(1, 0, 0), utc(10, 0, 0)),
            &FixedZone(Tz::Asia__Tokyo),
        )
        .expect("rollup succeeds");

    assert_eq!(result.busy().as_slice(), &[window(utc(2, 0, 0), utc(2, 1, 0))]);
}

#[test_log::test]
fn vfreebusy_output_describes_the_result() {
    let calendar = weekly_standup();
    let query = window(utc(1, 0, 0), utc(10, 0, 0));
    let result = engine()
        .compute_free_busy(FreeBusySource::Calendar(&calendar), &query)
        .expect("free/busy succeeds");
    let vfreebusy = result.to_vfreebusy();

    assert_eq!(
        vfreebusy
            .get_property(names::DTSTART)
            .and_then(Property::as_datetime),
        Some(&ical(1, 0, 0))
    );
    assert_eq!(
        vfreebusy.get_properties(names::FREEBUSY).count(),
        result.busy().len() + result.tentative().len()
    );
}
