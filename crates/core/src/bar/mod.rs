pub mod entity;
pub mod period;
