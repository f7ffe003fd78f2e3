//! iCalendar component types (RFC 5545 §3.4-3.6).

use super::{DateTime, Property, names};

/// Component kind for iCalendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Calendar,
    Event,
    Todo,
    Journal,
    FreeBusy,
    Timezone,
    Alarm,
    Standard,
    Daylight,
    /// X- or IANA component the engine does not interpret.
    Unknown,
}

impl ComponentKind {
    /// Returns the string name for this component kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "VCALENDAR",
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
            Self::Journal => "VJOURNAL",
            Self::FreeBusy => "VFREEBUSY",
            Self::Timezone => "VTIMEZONE",
            Self::Alarm => "VALARM",
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
            Self::Unknown => "X-UNKNOWN",
        }
    }

    /// Parses a component kind from a string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "VCALENDAR" => Self::Calendar,
            "VEVENT" => Self::Event,
            "VTODO" => Self::Todo,
            "VJOURNAL" => Self::Journal,
            "VFREEBUSY" => Self::FreeBusy,
            "VTIMEZONE" => Self::Timezone,
            "VALARM" => Self::Alarm,
            "STANDARD" => Self::Standard,
            "DAYLIGHT" => Self::Daylight,
            _ => Self::Unknown,
        }
    }

    /// Returns whether components of this kind may carry RRULE/RDATE and overrides.
    #[must_use]
    pub const fn is_recurring_type(self) -> bool {
        matches!(self, Self::Event | Self::Todo | Self::Journal)
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An iCalendar component with its properties and nested sub-components.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    /// Original component name (preserved for X-components).
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Component>,
}

impl Component {
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            name: kind.as_str().to_string(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates a component with a custom name (for X-components).
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ComponentKind::parse(&name),
            name,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn event() -> Self {
        Self::new(ComponentKind::Event)
    }

    #[must_use]
    pub fn todo() -> Self {
        Self::new(ComponentKind::Todo)
    }

    #[must_use]
    pub fn journal() -> Self {
        Self::new(ComponentKind::Journal)
    }

    #[must_use]
    pub fn freebusy() -> Self {
        Self::new(ComponentKind::FreeBusy)
    }

    #[must_use]
    pub fn timezone() -> Self {
        Self::new(ComponentKind::Timezone)
    }

    #[must_use]
    pub fn alarm() -> Self {
        Self::new(ComponentKind::Alarm)
    }

    pub fn add_property(&mut self, prop: Property) {
        self.properties.push(prop);
    }

    /// Builder-style variant of [`Component::add_property`].
    #[must_use]
    pub fn with_property(mut self, prop: Property) -> Self {
        self.properties.push(prop);
        self
    }

    pub fn add_child(&mut self, child: Component) {
        self.children.push(child);
    }

    /// Builder-style variant of [`Component::add_child`].
    #[must_use]
    pub fn with_child(mut self, child: Component) -> Self {
        self.children.push(child);
        self
    }

    /// Returns the first property with the given name.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns all properties with the given name.
    pub fn get_properties<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.get_property(name).is_some()
    }

    /// Replaces every property with this name by `prop`.
    pub fn set_property(&mut self, prop: Property) {
        self.remove_properties(&prop.name);
        self.properties.push(prop);
    }

    /// Removes every property with the given name.
    pub fn remove_properties(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.get_property(names::UID)?.as_text()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.get_property(names::SUMMARY)?.as_text()
    }

    /// Returns the RECURRENCE-ID value if this component is an override.
    #[must_use]
    pub fn recurrence_id(&self) -> Option<&Property> {
        self.get_property(names::RECURRENCE_ID)
    }

    /// Returns whether the RECURRENCE-ID carries `RANGE=THISANDFUTURE`.
    #[must_use]
    pub fn is_this_and_future(&self) -> bool {
        self.recurrence_id()
            .and_then(|p| p.get_param("RANGE"))
            .is_some_and(|range| range.has_value("THISANDFUTURE"))
    }

    /// Returns whether this component defines a recurrence set (RRULE or RDATE).
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.has_property(names::RRULE) || self.has_property(names::RDATE)
    }

    /// Returns the DTSTART value when it is a DATE-TIME.
    #[must_use]
    pub fn dtstart(&self) -> Option<&DateTime> {
        self.get_property(names::DTSTART)?.as_datetime()
    }

    /// Returns children of a specific kind.
    pub fn children_of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.children.iter().filter(move |c| c.kind == kind)
    }
}

/// Top-level iCalendar object wrapping its VCALENDAR root.
#[derive(Debug, Clone, PartialEq)]
pub struct ICalendar {
    pub root: Component,
}

impl ICalendar {
    /// Creates a new empty iCalendar with required properties.
    #[must_use]
    pub fn new(prodid: impl Into<String>) -> Self {
        let mut root = Component::new(ComponentKind::Calendar);
        root.add_property(Property::text("VERSION", "2.0"));
        root.add_property(Property::text("PRODID", prodid));
        Self { root }
    }

    /// Wraps an existing root component.
    #[must_use]
    pub fn from_root(root: Component) -> Self {
        Self { root }
    }

    /// Adds a top-level component.
    pub fn add_component(&mut self, component: Component) {
        self.root.add_child(component);
    }

    /// Builder-style variant of [`ICalendar::add_component`].
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.root.add_child(component);
        self
    }

    /// Returns all top-level components.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.root.children
    }

    pub fn events(&self) -> impl Iterator<Item = &Component> {
        self.root.children_of_kind(ComponentKind::Event)
    }

    pub fn timezones(&self) -> impl Iterator<Item = &Component> {
        self.root.children_of_kind(ComponentKind::Timezone)
    }

    pub fn freebusy(&self) -> impl Iterator<Item = &Component> {
        self.root.children_of_kind(ComponentKind::FreeBusy)
    }

    /// Returns whether any top-level component is a recurrence master or override.
    #[must_use]
    pub fn has_recurrence(&self) -> bool {
        self.root.children.iter().any(|c| {
            c.kind.is_recurring_type() && (c.is_recurring() || c.recurrence_id().is_some())
        })
    }
}

impl Default for ICalendar {
    fn default() -> Self {
        Self::new("-//Almanac//Almanac Calendar Engine//EN")
    }
}
