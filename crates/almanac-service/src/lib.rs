//! Recurrence expansion, filtering, free/busy aggregation and output shaping
//! over in-memory calendar objects.
//!
//! Every operation is a pure function of its inputs. The [`Engine`] facade
//! bundles the read-only timezone registry with the engine options so that
//! request handlers can share one instance across threads.

pub mod caldav;
pub mod engine;
pub mod error;
pub mod options;

pub use engine::Engine;
pub use error::{ServiceError, ServiceResult};
pub use options::EngineOptions;
