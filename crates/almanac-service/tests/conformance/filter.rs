use almanac_rfc::filter::{CalendarFilter, CompFilter, PropFilter, TextMatch, TimeRange};
use almanac_rfc::ical::core::{Component, ICalendar, Property, names};
use almanac_service::ServiceError;

use super::helpers::{engine, event, exception, ical, utc};

fn recurring_object() -> ICalendar {
    let master = event("filter", "weekly review", ical(2, 15, 0), ical(2, 16, 0))
        .with_property(Property::recur(names::RRULE, "FREQ=WEEKLY;COUNT=4"));
    let moved = exception(
        "filter",
        "weekly review moved",
        ical(16, 15, 0),
        ical(17, 8, 0),
        ical(17, 9, 0),
        false,
    );
    ICalendar::default()
        .with_component(master)
        .with_component(moved)
}

#[test_log::test]
fn absent_component_is_no_match() {
    let todo_filter = CalendarFilter::new(CompFilter::new("VTODO"));
    let journal_in_range = CalendarFilter::component_in_range(
        "VJOURNAL",
        TimeRange::new(utc(1, 0, 0), utc(31, 0, 0)),
    );
    let engine = engine();
    assert!(
        !engine
            .matches(&recurring_object(), &todo_filter)
            .expect("no match is not an error")
    );
    assert!(
        !engine
            .matches(&recurring_object(), &journal_in_range)
            .expect("no match is not an error")
    );
    assert!(
        !engine
            .matches(&ICalendar::default(), &todo_filter)
            .expect("no match is not an error")
    );
}

#[test_log::test]
fn time_range_uses_expanded_instances() {
    let engine = engine();
    let object = recurring_object();
    let in_range = |start, end| {
        engine
            .matches(
                &object,
                &CalendarFilter::component_in_range("VEVENT", TimeRange::new(start, end)),
            )
            .expect("evaluation succeeds")
    };

    // the 16th moved to the morning of the 17th
    assert!(!in_range(utc(16, 14, 0), utc(16, 16, 0)));
    assert!(in_range(utc(17, 8, 30), utc(17, 8, 45)));
    assert!(in_range(utc(23, 15, 0), utc(23, 15, 30)));
    assert!(!in_range(utc(30, 0, 0), utc(31, 0, 0)));
}

#[test_log::test]
fn nested_property_filters_apply_per_component() {
    let filter = CalendarFilter::new(
        CompFilter::new("VEVENT")
            .with_time_range(TimeRange::new(utc(9, 0, 0), utc(10, 0, 0)))
            .with_prop_filter(
                PropFilter::new(names::SUMMARY).with_text_match(TextMatch::contains("REVIEW")),
            ),
    );
    assert!(
        engine()
            .matches(&recurring_object(), &filter)
            .expect("evaluation succeeds")
    );

    let not_moved = CalendarFilter::new(
        CompFilter::new("VEVENT").with_prop_filter(
            PropFilter::new(names::SUMMARY).with_text_match(TextMatch::contains("moved").negate()),
        ),
    );
    assert!(
        engine()
            .matches(&recurring_object(), &not_moved)
            .expect("evaluation succeeds")
    );
}

#[test_log::test]
fn malformed_filters_are_rejected() {
    let unknown = CalendarFilter::new(CompFilter::new("VPOLL"));
    let inverted = CalendarFilter::component_in_range(
        "VEVENT",
        TimeRange::new(utc(10, 0, 0), utc(9, 0, 0)),
    );
    let object = ICalendar::default().with_component(Component::event());
    for filter in [unknown, inverted] {
        assert!(matches!(
            engine().matches(&object, &filter),
            Err(ServiceError::InvalidFilter(_))
        ));
    }
}
