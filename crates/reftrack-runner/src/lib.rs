pub mod config;
pub mod coordinator;
pub mod doctor;
#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
pub mod gate;
pub mod host;
pub mod queue;
pub mod receiver;
#[cfg(any(test, feature = "test-util"))]
pub mod scenario;
pub mod strategy;
pub mod timer;
pub mod util;

pub use config::*;
pub use coordinator::*;
pub use doctor::*;
pub use gate::*;
pub use host::*;
pub use queue::*;
pub use receiver::*;
pub use strategy::*;
pub use timer::*;
pub use util::*;
