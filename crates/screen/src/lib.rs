pub mod error;
pub mod pattern;
pub mod predicates;
pub mod scanner;
pub mod window;
