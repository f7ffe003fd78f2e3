//! ## Summary
//! Structural validation of calendar-query filters.
//!
//! A filter that names an unsupported component, inverts a time range or
//! asks for an unknown collation is rejected before evaluation, so that the
//! evaluator itself only ever answers "match" or "no match".

use crate::error::{RfcError, RfcResult};
use crate::ical::core::ComponentKind;

use super::{CompFilter, PropFilter, TextMatch, TimeRange};

/// Collations accepted in text-match elements (RFC 4790).
pub const SUPPORTED_COLLATIONS: &[&str] = &["i;ascii-casemap", "i;octet"];

/// ## Summary
/// Validates a filter tree rooted at `root`.
///
/// ## Errors
/// Returns `RfcError::InvalidFilter` if the root is not VCALENDAR, a nested
/// comp-filter names an unknown component, a time range has `start > end`
/// or no bounds at all, or a text-match uses an unsupported collation.
pub fn validate_filter(root: &CompFilter) -> RfcResult<()> {
    if ComponentKind::parse(&root.name) != ComponentKind::Calendar {
        return Err(RfcError::InvalidFilter(format!(
            "root comp-filter must be VCALENDAR, found {}",
            root.name
        )));
    }
    validate_comp(root)
}

fn validate_comp(filter: &CompFilter) -> RfcResult<()> {
    if ComponentKind::parse(&filter.name) == ComponentKind::Unknown {
        return Err(RfcError::InvalidFilter(format!(
            "unsupported component type {}",
            filter.name
        )));
    }

    if let Some(range) = &filter.time_range {
        validate_range(range, &filter.name)?;
    }

    for prop in &filter.prop_filters {
        validate_prop(prop)?;
    }

    for child in &filter.comp_filters {
        validate_comp(child)?;
    }

    Ok(())
}

fn validate_prop(filter: &PropFilter) -> RfcResult<()> {
    if let Some(range) = &filter.time_range {
        validate_range(range, &filter.name)?;
    }
    if let Some(text_match) = &filter.text_match {
        validate_text_match(text_match)?;
    }
    for param in &filter.param_filters {
        if let Some(text_match) = &param.text_match {
            validate_text_match(text_match)?;
        }
    }
    Ok(())
}

fn validate_range(range: &TimeRange, owner: &str) -> RfcResult<()> {
    match (range.start, range.end) {
        (None, None) => Err(RfcError::InvalidFilter(format!(
            "time-range on {owner} has neither start nor end"
        ))),
        (Some(start), Some(end)) if start > end => Err(RfcError::InvalidFilter(format!(
            "time-range on {owner} starts at {start} after its end {end}"
        ))),
        _ => Ok(()),
    }
}

fn validate_text_match(text_match: &TextMatch) -> RfcResult<()> {
    match &text_match.collation {
        Some(collation)
            if !SUPPORTED_COLLATIONS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(collation)) =>
        {
            Err(RfcError::InvalidFilter(format!(
                "unsupported collation {collation}"
            )))
        }
        _ => Ok(()),
    }
}
