pub mod client;
pub mod http;
pub mod types;

pub use client::*;
pub use http::*;
pub use types::*;
