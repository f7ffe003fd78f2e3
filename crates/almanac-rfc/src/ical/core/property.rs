//! iCalendar property type (RFC 5545 §3.1, §3.8).

use super::{Date, DateTime, Duration, Parameter, Period, Value};

/// A typed iCalendar property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name (normalized to uppercase).
    pub name: String,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    pub value: Value,
}

impl Property {
    /// Creates a property from a name and an already-typed value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value,
        }
    }

    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Value::Text(value.into()))
    }

    #[must_use]
    pub fn integer(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, Value::Integer(value))
    }

    /// ## Summary
    /// Creates a DATE-TIME property.
    ///
    /// A zoned value also gets a matching TZID parameter.
    #[must_use]
    pub fn datetime(name: impl Into<String>, dt: DateTime) -> Self {
        let tzid = dt.tzid().map(str::to_string);
        let mut prop = Self::new(name, Value::DateTime(dt));
        if let Some(tzid) = tzid {
            prop.params.push(Parameter::tzid(tzid));
        }
        prop
    }

    /// Creates a DATE property with `VALUE=DATE`.
    #[must_use]
    pub fn date(name: impl Into<String>, d: Date) -> Self {
        let mut prop = Self::new(name, Value::Date(d));
        prop.params.push(Parameter::value_type("DATE"));
        prop
    }

    #[must_use]
    pub fn duration(name: impl Into<String>, d: Duration) -> Self {
        Self::new(name, Value::Duration(d))
    }

    /// Creates a RECUR property such as RRULE or EXRULE.
    #[must_use]
    pub fn recur(name: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::new(name, Value::Recur(rule.into()))
    }

    /// Creates a multi-valued DATE-TIME property (RDATE, EXDATE).
    #[must_use]
    pub fn datetimes(name: impl Into<String>, values: Vec<DateTime>) -> Self {
        let tzid = values.first().and_then(DateTime::tzid).map(str::to_string);
        let mut prop = Self::new(name, Value::DateTimeList(values));
        if let Some(tzid) = tzid {
            prop.params.push(Parameter::tzid(tzid));
        }
        prop
    }

    /// Creates a multi-valued DATE property with `VALUE=DATE`.
    #[must_use]
    pub fn dates(name: impl Into<String>, values: Vec<Date>) -> Self {
        let mut prop = Self::new(name, Value::DateList(values));
        prop.params.push(Parameter::value_type("DATE"));
        prop
    }

    /// Creates a multi-valued PERIOD property (FREEBUSY, `RDATE;VALUE=PERIOD`).
    #[must_use]
    pub fn periods(name: impl Into<String>, values: Vec<Period>) -> Self {
        Self::new(name, Value::PeriodList(values))
    }

    /// Builder-style variant of [`Property::set_param`].
    #[must_use]
    pub fn with_param(mut self, param: Parameter) -> Self {
        self.set_param(param);
        self
    }

    /// Returns the parameter with the given name.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        self.get_param(name)?.value()
    }

    /// Sets a parameter, replacing any existing parameter with the same name.
    pub fn set_param(&mut self, param: Parameter) {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
    }

    /// Removes every parameter with the given name.
    pub fn remove_param(&mut self, name: &str) {
        self.params.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.value.as_text()
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime> {
        self.value.as_datetime()
    }

    #[must_use]
    pub fn as_date(&self) -> Option<&Date> {
        self.value.as_date()
    }

    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        self.value.as_duration()
    }
}

/// Property names the engine reads or writes.
pub mod names {
    pub const COMPLETED: &str = "COMPLETED";
    pub const CREATED: &str = "CREATED";
    pub const DTEND: &str = "DTEND";
    pub const DTSTAMP: &str = "DTSTAMP";
    pub const DTSTART: &str = "DTSTART";
    pub const DUE: &str = "DUE";
    pub const DURATION: &str = "DURATION";
    pub const EXDATE: &str = "EXDATE";
    pub const EXRULE: &str = "EXRULE";
    pub const FREEBUSY: &str = "FREEBUSY";
    pub const RDATE: &str = "RDATE";
    pub const RECURRENCE_ID: &str = "RECURRENCE-ID";
    pub const REPEAT: &str = "REPEAT";
    pub const RRULE: &str = "RRULE";
    pub const STATUS: &str = "STATUS";
    pub const SUMMARY: &str = "SUMMARY";
    pub const TRANSP: &str = "TRANSP";
    pub const TRIGGER: &str = "TRIGGER";
    pub const UID: &str = "UID";
}
