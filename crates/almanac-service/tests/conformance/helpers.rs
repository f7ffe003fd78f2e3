use almanac_rfc::ical::core::{Component, DateTime as IcalDateTime, Parameter, Property, names};
use almanac_rfc::ical::timezone::TimezoneRegistry;
use almanac_service::caldav::period::Period;
use almanac_service::{Engine, EngineOptions};
use chrono::{DateTime, TimeZone, Utc};

/// Registry shared by every scenario; it is never mutated.
pub fn registry() -> &'static TimezoneRegistry {
    static REGISTRY: std::sync::OnceLock<TimezoneRegistry> = std::sync::OnceLock::new();
    REGISTRY.get_or_init(TimezoneRegistry::new)
}

pub fn engine() -> Engine<'static> {
    Engine::new(registry(), EngineOptions::default())
}

pub fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2006, 1, day, hour, minute, 0)
        .single()
        .expect("valid January 2006 instant")
}

pub fn ical(day: u8, hour: u8, minute: u8) -> IcalDateTime {
    IcalDateTime::utc(2006, 1, day, hour, minute, 0)
}

pub fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Period {
    Period::new(start, end).expect("ordered window")
}

/// VEVENT with a UID, SUMMARY, DTSTART and DTEND.
pub fn event(uid: &str, summary: &str, start: IcalDateTime, end: IcalDateTime) -> Component {
    Component::event()
        .with_property(Property::text(names::UID, uid))
        .with_property(Property::text(names::SUMMARY, summary))
        .with_property(Property::datetime(names::DTSTART, start))
        .with_property(Property::datetime(names::DTEND, end))
}

/// Override of `uid` at `rid`, optionally applying to later instances too.
pub fn exception(
    uid: &str,
    summary: &str,
    rid: IcalDateTime,
    start: IcalDateTime,
    end: IcalDateTime,
    this_and_future: bool,
) -> Component {
    let mut recurrence_id = Property::datetime(names::RECURRENCE_ID, rid);
    if this_and_future {
        recurrence_id = recurrence_id.with_param(Parameter::new("RANGE", "THISANDFUTURE"));
    }
    event(uid, summary, start, end).with_property(recurrence_id)
}
