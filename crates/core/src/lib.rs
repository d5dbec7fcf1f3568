pub mod bar;
pub mod common;
pub mod config;
pub mod store;
