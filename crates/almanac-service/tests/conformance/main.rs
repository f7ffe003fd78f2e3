//! Cross-module scenarios for the calendaring engine.

mod expansion;
mod filter;
mod freebusy;
mod helpers;
mod limit;
mod period;
