//! `CalDAV` time computations: recurrence expansion, calendar-query
//! filtering, free/busy aggregation and response shaping.

pub mod filter;
pub mod freebusy;
pub mod instance;
pub mod period;
pub mod recurrence;
pub mod shape;
pub mod time;
