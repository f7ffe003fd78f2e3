use almanac_rfc::error::RfcError;
use almanac_rfc::ical::timezone::ConversionError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Engine errors. All of them describe caller input; none are retryable.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid recurrence rule on {component}: {rule}: {reason}")]
    InvalidRecurrenceRule {
        component: String,
        rule: String,
        reason: String,
    },

    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid {component}: {reason}")]
    InvalidComponent { component: String, reason: String },

    #[error(transparent)]
    Timezone(#[from] ConversionError),
}

impl From<RfcError> for ServiceError {
    fn from(err: RfcError) -> Self {
        match err {
            RfcError::InvalidFilter(reason) => Self::InvalidFilter(reason),
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
