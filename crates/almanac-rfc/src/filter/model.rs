use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// A complete calendar-query filter. The root comp-filter must name VCALENDAR.
#[derive(Debug, Clone)]
pub struct CalendarFilter {
    pub root: CompFilter,
}

impl CalendarFilter {
    /// Creates a filter whose VCALENDAR root wraps `filter`.
    #[must_use]
    pub fn new(filter: CompFilter) -> Self {
        Self {
            root: CompFilter::new("VCALENDAR").with_comp_filter(filter),
        }
    }

    /// Creates a filter from an explicit root comp-filter.
    #[must_use]
    pub fn from_root(root: CompFilter) -> Self {
        Self { root }
    }

    /// ## Summary
    /// Builds `VCALENDAR > <component> > time-range`.
    #[must_use]
    pub fn component_in_range(component: &str, range: TimeRange) -> Self {
        Self::new(CompFilter::new(component).with_time_range(range))
    }
}

/// Component filter.
#[derive(Debug, Clone)]
pub struct CompFilter {
    pub name: String,
    pub is_not_defined: bool,
    pub time_range: Option<TimeRange>,
    pub prop_filters: Vec<PropFilter>,
    pub comp_filters: Vec<CompFilter>,
}

impl CompFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            time_range: None,
            prop_filters: Vec::new(),
            comp_filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_prop_filter(mut self, filter: PropFilter) -> Self {
        self.prop_filters.push(filter);
        self
    }

    #[must_use]
    pub fn with_comp_filter(mut self, filter: CompFilter) -> Self {
        self.comp_filters.push(filter);
        self
    }
}

/// Property filter.
#[derive(Debug, Clone)]
pub struct PropFilter {
    pub name: String,
    pub is_not_defined: bool,
    pub text_match: Option<TextMatch>,
    /// Time range over the property's DATE or DATE-TIME value.
    pub time_range: Option<TimeRange>,
    pub param_filters: Vec<ParamFilter>,
}

impl PropFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            text_match: None,
            time_range: None,
            param_filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_param_filter(mut self, filter: ParamFilter) -> Self {
        self.param_filters.push(filter);
        self
    }
}

/// Parameter filter.
#[derive(Debug, Clone)]
pub struct ParamFilter {
    pub name: String,
    pub is_not_defined: bool,
    pub text_match: Option<TextMatch>,
}

impl ParamFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            text_match: None,
        }
    }

    #[must_use]
    pub fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }
}

/// Text matching criteria.
#[derive(Debug, Clone)]
pub struct TextMatch {
    pub value: String,
    /// `i;ascii-casemap` when absent.
    pub collation: Option<String>,
    pub match_type: MatchType,
    pub negate: bool,
}

impl TextMatch {
    /// Creates a contains match.
    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            collation: None,
            match_type: MatchType::Contains,
            negate: false,
        }
    }

    /// Creates an equals match.
    #[must_use]
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Equals,
            ..Self::contains(value)
        }
    }

    #[must_use]
    pub fn starts_with(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::StartsWith,
            ..Self::contains(value)
        }
    }

    #[must_use]
    pub fn ends_with(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::EndsWith,
            ..Self::contains(value)
        }
    }

    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }

    #[must_use]
    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Returns whether comparison is case-sensitive (`i;octet`).
    #[must_use]
    pub fn is_case_sensitive(&self) -> bool {
        self.collation
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("i;octet"))
    }

    /// ## Summary
    /// Applies the match (including negation) to a candidate string.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let found = if self.is_case_sensitive() {
            self.match_type.apply(candidate, &self.value)
        } else {
            self.match_type.apply(
                &candidate.to_ascii_lowercase(),
                &self.value.to_ascii_lowercase(),
            )
        };
        found != self.negate
    }
}

/// Match type for text matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

impl MatchType {
    fn apply(self, candidate: &str, needle: &str) -> bool {
        match self {
            Self::Contains => candidate.contains(needle),
            Self::Equals => candidate == needle,
            Self::StartsWith => candidate.starts_with(needle),
            Self::EndsWith => candidate.ends_with(needle),
        }
    }
}

/// Time range for filtering. An absent bound is unbounded.
#[derive(Debug, Clone)]
pub struct TimeRange {
    /// Start of range (inclusive).
    pub start: Option<DateTime<Utc>>,
    /// End of range (exclusive).
    pub end: Option<DateTime<Utc>>,
    /// Reference zone for floating date-times compared against this range.
    pub timezone: Option<Tz>,
}

impl TimeRange {
    /// Creates a time range with start and end.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            timezone: None,
        }
    }

    /// Creates a range starting from a time.
    #[must_use]
    pub fn starting(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
            timezone: None,
        }
    }

    /// Creates a range ending at a time.
    #[must_use]
    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
            timezone: None,
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Returns the start bound, or the earliest representable instant.
    #[must_use]
    pub fn start_or_min(&self) -> DateTime<Utc> {
        self.start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the end bound, or the latest representable instant.
    #[must_use]
    pub fn end_or_max(&self) -> DateTime<Utc> {
        self.end.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
