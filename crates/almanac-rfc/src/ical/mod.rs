//! iCalendar object model (RFC 5545) and timezone handling.

pub mod core;
pub mod timezone;
