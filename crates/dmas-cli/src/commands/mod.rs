pub mod config;
pub mod fleet;
