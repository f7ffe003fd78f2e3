//! Half-open time intervals and normalized interval lists.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// A `[start, end)` interval of UTC instants with `start <= end`.
///
/// A zero-length period stands for a single instant and is treated as
/// intersecting any non-empty period that contains that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// ## Summary
    /// Creates a period, rejecting `start > end`.
    ///
    /// ## Errors
    /// Returns `ServiceError::InvalidWindow` if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ServiceResult<Self> {
        let period = Self { start, end };
        period.validate()?;
        Ok(period)
    }

    /// Creates a period, clamping `end` up to `start` when it precedes it.
    #[must_use]
    pub fn clamped(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Creates a period of `duration` from `start`, saturating at the maximum instant.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, duration: TimeDelta) -> Self {
        let end = start
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::clamped(start, end)
    }

    /// Creates the zero-length period at `instant`.
    #[must_use]
    pub fn instant(instant: DateTime<Utc>) -> Self {
        Self {
            start: instant,
            end: instant,
        }
    }

    /// ## Summary
    /// Checks the `start <= end` invariant on a period built from public fields.
    ///
    /// ## Errors
    /// Returns `ServiceError::InvalidWindow` if `start` is after `end`.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.start > self.end {
            return Err(ServiceError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    /// Returns whether `instant` lies in `[start, end)`.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// ## Summary
    /// Half-open intersection test.
    ///
    /// Touching periods do not intersect. A zero-length period intersects a
    /// period that contains its instant, and two zero-length periods
    /// intersect only when they coincide.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => self.start == other.start,
            (true, false) => other.contains(self.start),
            (false, true) => self.contains(other.start),
            (false, false) => self.start < other.end && other.start < self.end,
        }
    }

    /// Returns the overlap of two intersecting periods.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        self.intersects(other).then(|| Self {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Restricts this period to `range`, or `None` if they do not intersect.
    #[must_use]
    pub fn clip(&self, range: &Self) -> Option<Self> {
        self.intersection(range)
    }

    /// Returns this period widened by `before` at the start and `after` at the end.
    #[must_use]
    pub fn widen(&self, before: TimeDelta, after: TimeDelta) -> Self {
        let start = self
            .start
            .checked_sub_signed(before)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = self
            .end
            .checked_add_signed(after)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::clamped(start, end)
    }
}

/// An ordered list of periods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodList(Vec<Period>);

impl PeriodList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, period: Period) {
        self.0.push(period);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Period> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Period] {
        &self.0
    }

    /// ## Summary
    /// Sorts by start and merges overlapping or touching periods.
    ///
    /// Afterwards every adjacent pair satisfies `p[i].end < p[i + 1].start`.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        // stable: equal starts keep their input order
        self.0.sort_by_key(|p| p.start);

        let mut merged: Vec<Period> = Vec::with_capacity(self.0.len());
        for period in self.0 {
            match merged.last_mut() {
                Some(last) if period.start <= last.end => {
                    last.end = last.end.max(period.end);
                }
                _ => merged.push(period),
            }
        }
        Self(merged)
    }

    /// Returns whether the list is sorted, disjoint and non-touching.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0].end < pair[1].start)
    }
}

impl From<Vec<Period>> for PeriodList {
    fn from(periods: Vec<Period>) -> Self {
        Self(periods)
    }
}

impl FromIterator<Period> for PeriodList {
    fn from_iter<I: IntoIterator<Item = Period>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Period> for PeriodList {
    fn extend<I: IntoIterator<Item = Period>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a PeriodList {
    type Item = &'a Period;
    type IntoIter = std::slice::Iter<'a, Period>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
