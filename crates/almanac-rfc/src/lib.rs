//! In-memory iCalendar model, timezone registry and `CalDAV` filter model.

pub mod error;
pub mod filter;
pub mod ical;
