pub mod config;
pub mod routing;
pub mod types;

pub use types::*;
