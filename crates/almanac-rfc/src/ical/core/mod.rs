//! iCalendar core models (RFC 5545).
//!
//! Components are built programmatically or by an external parser; this
//! module only carries the typed, already-parsed representation the engine
//! reads from.

mod component;
mod datetime;
mod duration;
mod parameter;
mod property;
mod value;

pub use component::{Component, ComponentKind, ICalendar};
pub use datetime::{DateTime, DateTimeForm};
pub use duration::Duration;
pub use parameter::Parameter;
pub use property::{Property, names};
pub use value::{Date, Period, Value};
