pub mod error;
#[cfg(feature = "test-utils")]
pub mod mem;
pub mod port;
