//! Pure types and decision logic for install-referrer tracking.

pub mod backoff;
pub mod commands;
pub mod engine;
pub mod model;
pub mod outcomes;
pub mod referrer;
pub mod types;

pub use backoff::*;
pub use commands::*;
pub use engine::*;
pub use model::*;
pub use outcomes::*;
pub use referrer::*;
pub use types::*;
