use almanac_rfc::ical::core::{Component, DateTime as IcalDateTime, Property, names};
use almanac_service::caldav::instance::InstanceSource;

use super::helpers::{engine, event, exception, ical, utc, window};

fn eastern(day: u8, hour: u8) -> IcalDateTime {
    IcalDateTime::zoned(2006, 1, day, hour, 0, 0, "US/Eastern")
}

/// "event 6": daily at 14:00 US/Eastern, one hour, five times.
fn event_6() -> Component {
    event("event-6", "event 6", eastern(2, 14), eastern(2, 15))
        .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=5"))
}

#[test_log::test]
fn daily_series_yields_instances_inside_window() {
    let master = event_6();
    let query = window(utc(2, 19, 0), utc(5, 19, 0));
    let instances = engine()
        .expand(&master, &[], &query)
        .expect("expansion succeeds");

    let starts: Vec<_> = instances.iter().map(|i| i.start).collect();
    assert_eq!(starts, vec![utc(2, 19, 0), utc(3, 19, 0), utc(4, 19, 0)]);
    assert!(instances.iter().all(|i| !i.is_overridden()));
    assert!(instances.iter().all(|i| i.end - i.start == chrono::TimeDelta::hours(1)));
}

#[test_log::test]
fn whole_day_window_covers_every_start_inside_it() {
    let master = event("utc", "utc", ical(2, 19, 0), ical(2, 20, 0))
        .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=5"));
    let query = window(utc(2, 0, 0), utc(6, 0, 0));
    let instances = engine()
        .expand(&master, &[], &query)
        .expect("expansion succeeds");

    let starts: Vec<_> = instances.iter().map(|i| i.start).collect();
    assert_eq!(
        starts,
        vec![utc(2, 19, 0), utc(3, 19, 0), utc(4, 19, 0), utc(5, 19, 0)]
    );
}

#[test_log::test]
fn exact_override_replaces_its_instance() {
    let master = event_6();
    let changed = exception(
        "event-6",
        "event 6 changed",
        ical(4, 19, 0),
        ical(4, 21, 0),
        ical(4, 22, 0),
        false,
    );
    let query = window(utc(2, 19, 0), utc(5, 19, 0));
    let instances = engine()
        .expand(&master, &[&changed], &query)
        .expect("expansion succeeds");

    assert_eq!(instances.len(), 3);
    let moved = instances.get(utc(4, 19, 0)).expect("instance for 01-04");
    assert_eq!(moved.start, utc(4, 21, 0));
    assert_eq!(moved.source, InstanceSource::Override);
    assert_eq!(moved.component.summary(), Some("event 6 changed"));
    assert_eq!(
        instances.get(utc(3, 19, 0)).map(|i| i.component.summary()),
        Some(Some("event 6"))
    );
}

#[test_log::test]
fn this_and_future_carries_shift_until_superseded() {
    let master = event_6();
    let later = exception(
        "event-6",
        "afternoon",
        ical(3, 19, 0),
        ical(3, 17, 0),
        ical(3, 19, 0),
        true,
    );
    let single = exception(
        "event-6",
        "one off",
        ical(5, 19, 0),
        ical(5, 8, 0),
        ical(5, 9, 0),
        false,
    );
    let query = window(utc(1, 0, 0), utc(10, 0, 0));
    let instances = engine()
        .expand(&master, &[&later, &single], &query)
        .expect("expansion succeeds");

    let summary: Vec<_> = instances
        .iter()
        .map(|i| (i.start, i.component.summary().unwrap_or_default()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (utc(2, 19, 0), "event 6"),
            (utc(3, 17, 0), "afternoon"),
            (utc(4, 17, 0), "afternoon"),
            (utc(5, 8, 0), "one off"),
            (utc(6, 17, 0), "afternoon"),
        ]
    );
    assert!(instances.iter().all(|i| i.end >= i.start));
}

#[test_log::test]
fn orphan_override_is_emitted_on_its_own_time() {
    let master = event_6();
    let orphan = exception(
        "event-6",
        "orphan",
        ical(20, 19, 0),
        ical(20, 19, 0),
        ical(20, 20, 0),
        false,
    );
    let instances = engine()
        .expand(&master, &[&orphan], &window(utc(19, 0, 0), utc(21, 0, 0)))
        .expect("orphans are not errors");

    assert_eq!(instances.orphan_overrides(), &[utc(20, 19, 0)]);
    assert_eq!(instances.len(), 1);

    let elsewhere = engine()
        .expand(&master, &[&orphan], &window(utc(25, 0, 0), utc(26, 0, 0)))
        .expect("orphans are not errors");
    assert!(elsewhere.is_empty());
}

#[test_log::test]
fn point_window_matches_containing_instance() {
    let master = event_6();
    let engine = engine();

    let inside = engine
        .expand(&master, &[], &window(utc(3, 19, 30), utc(3, 19, 30)))
        .expect("expansion succeeds");
    assert_eq!(inside.len(), 1);

    let at_end = engine
        .expand(&master, &[], &window(utc(3, 20, 0), utc(3, 20, 0)))
        .expect("expansion succeeds");
    assert!(at_end.is_empty());

    let instant = event("reminder", "reminder", ical(2, 12, 0), ical(2, 12, 0))
        .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=2"));
    let hit = engine
        .expand(&instant, &[], &window(utc(3, 12, 0), utc(3, 12, 0)))
        .expect("expansion succeeds");
    assert_eq!(hit.len(), 1);
}

#[test_log::test]
fn malformed_rule_is_reported_with_component() {
    let master = event("broken", "broken", ical(2, 9, 0), ical(2, 10, 0))
        .with_property(Property::recur(names::RRULE, "FREQ=SOMETIMES"));
    let err = engine()
        .expand(&master, &[], &window(utc(1, 0, 0), utc(3, 0, 0)))
        .expect_err("rule is rejected");
    assert!(matches!(
        err,
        almanac_service::ServiceError::InvalidRecurrenceRule { ref component, .. }
            if component == "broken"
    ));
}

#[test_log::test]
fn inverted_window_is_rejected() {
    let master = event_6();
    let inverted = almanac_service::caldav::period::Period {
        start: utc(5, 0, 0),
        end: utc(4, 0, 0),
    };
    assert!(matches!(
        engine().expand(&master, &[], &inverted),
        Err(almanac_service::ServiceError::InvalidWindow { .. })
    ));
}
