//! CLI command implementations

pub mod cat;
pub mod config;

pub use cat::execute as cat;
pub use config::execute as config;
