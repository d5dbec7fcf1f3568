pub mod bars;
pub mod config;
