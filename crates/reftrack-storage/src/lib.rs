pub mod contract;
pub mod memory;
pub mod traits;

pub use memory::*;
pub use traits::*;
