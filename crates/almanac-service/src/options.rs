use almanac_core::config::Settings;

/// Engine-facing projection of [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Cap on instants generated per rule in one expansion.
    pub max_instances: u32,
    /// Horizon used to bound an unbounded series when a finite end is needed.
    pub horizon_months: u32,
    /// TZID used for floating times when a collection declares none.
    pub default_timezone: Option<String>,
    /// Fan free/busy rollup out across collections with rayon.
    pub parallel_rollup: bool,
}

impl EngineOptions {
    /// Limit handed to the `rrule` crate, which counts in `u16`.
    #[must_use]
    pub fn rrule_limit(&self) -> u16 {
        u16::try_from(self.max_instances).unwrap_or(u16::MAX)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for EngineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_instances: settings.expansion.max_instances,
            horizon_months: settings.expansion.horizon_months,
            default_timezone: settings.freebusy.default_timezone.clone(),
            parallel_rollup: settings.freebusy.parallel,
        }
    }
}
