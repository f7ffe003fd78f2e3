//! `CalDAV` calendar-query filter model (RFC 4791 §9.7) and its validation.

mod model;
mod validate;

pub use model::{
    CalendarFilter, CompFilter, MatchType, ParamFilter, PropFilter, TextMatch, TimeRange,
};
pub use validate::{SUPPORTED_COLLATIONS, validate_filter};
