//! Utility modules for the weights engine.

mod glob;
mod time_parser;

pub use glob::glob_match;
pub use time_parser::{TimeParseError, parse_time, parse_time_with_base};
