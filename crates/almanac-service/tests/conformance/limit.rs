use almanac_rfc::ical::core::{Component, ICalendar, Property, names};
use almanac_service::caldav::shape::OutputMode;

use super::helpers::{engine, event, exception, ical, utc, window};

/// Master plus four overrides: three THISANDFUTURE and one exact.
fn stored_set() -> ICalendar {
    let master = event("limit", "master", ical(1, 19, 0), ical(1, 20, 0))
        .with_property(Property::recur(names::RRULE, "FREQ=DAILY;COUNT=10"));
    ICalendar::default()
        .with_component(master)
        .with_component(exception(
            "limit",
            "changed 3",
            ical(2, 19, 0),
            ical(2, 19, 30),
            ical(2, 20, 30),
            true,
        ))
        .with_component(exception(
            "limit",
            "changed 4",
            ical(3, 19, 0),
            ical(3, 19, 0),
            ical(3, 20, 0),
            true,
        ))
        .with_component(exception(
            "limit",
            "changed",
            ical(4, 19, 0),
            ical(4, 21, 0),
            ical(4, 22, 0),
            true,
        ))
        .with_component(exception(
            "limit",
            "changed 2",
            ical(5, 19, 0),
            ical(5, 20, 0),
            ical(5, 21, 0),
            false,
        ))
}

fn summaries(calendar: &ICalendar) -> Vec<&str> {
    calendar.events().filter_map(Component::summary).collect()
}

#[test_log::test]
fn limit_prunes_stale_overrides() {
    let shaped = engine()
        .shape_output(
            &stored_set(),
            &window(utc(4, 0, 0), utc(6, 0, 0)),
            OutputMode::Limit,
        )
        .expect("limit succeeds");

    assert_eq!(shaped.events().count(), 3);
    let kept = summaries(&shaped);
    assert!(!kept.contains(&"changed 3"));
    assert!(!kept.contains(&"changed 4"));
    assert_eq!(kept, vec!["master", "changed", "changed 2"]);
}

#[test_log::test]
fn limit_keeps_governing_override_for_later_window() {
    let shaped = engine()
        .shape_output(
            &stored_set(),
            &window(utc(8, 0, 0), utc(9, 0, 0)),
            OutputMode::Limit,
        )
        .expect("limit succeeds");

    assert_eq!(summaries(&shaped), vec!["master", "changed"]);
}

#[test_log::test]
fn expand_materializes_the_same_window() {
    let shaped = engine()
        .shape_output(
            &stored_set(),
            &window(utc(4, 0, 0), utc(6, 0, 0)),
            OutputMode::Expand,
        )
        .expect("expand succeeds");

    let events: Vec<_> = shaped.events().collect();
    assert_eq!(summaries(&shaped), vec!["changed", "changed 2"]);
    assert!(events.iter().all(|e| !e.has_property(names::RRULE)));
    assert!(events.iter().all(|e| e.has_property(names::RECURRENCE_ID)));
    assert!(
        events
            .iter()
            .filter_map(|e| e.recurrence_id())
            .all(|rid| rid.get_param("RANGE").is_none())
    );
}
