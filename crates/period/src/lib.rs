pub mod aggregator;
pub mod driver;
pub mod error;
pub mod tally;
