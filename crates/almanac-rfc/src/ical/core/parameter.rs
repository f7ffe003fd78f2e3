//! iCalendar parameter type (RFC 5545 §3.2).

/// A single property parameter, e.g. `TZID=America/New_York`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name (normalized to uppercase).
    pub name: String,
    /// Parameter values. Most parameters carry exactly one.
    pub values: Vec<String>,
}

impl Parameter {
    /// Creates a new parameter with a single value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            values: vec![value.into()],
        }
    }

    /// Returns the first (and usually only) value.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Returns whether the parameter has the specified value (case-insensitive).
    #[must_use]
    pub fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.eq_ignore_ascii_case(value))
    }

    #[must_use]
    pub fn tzid(tzid: impl Into<String>) -> Self {
        Self::new("TZID", tzid)
    }

    #[must_use]
    pub fn value_type(value_type: impl Into<String>) -> Self {
        Self::new("VALUE", value_type)
    }

    /// Creates an FBTYPE parameter (RFC 5545 §3.2.9).
    #[must_use]
    pub fn fbtype(fbtype: impl Into<String>) -> Self {
        Self::new("FBTYPE", fbtype)
    }

    /// Creates the `RANGE=THISANDFUTURE` parameter for RECURRENCE-ID.
    #[must_use]
    pub fn this_and_future() -> Self {
        Self::new("RANGE", "THISANDFUTURE")
    }

    /// Creates a RELATED parameter for TRIGGER (`START` or `END`).
    #[must_use]
    pub fn related(related: impl Into<String>) -> Self {
        Self::new("RELATED", related)
    }
}
