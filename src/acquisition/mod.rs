//! Tag read acquisition
//!
//! Turns reader output into [`TagEvent`](crate::types::TagEvent)s:
//!
//! - [`record_parser`]: CSV report lines as written by the vendor listener
//! - [`simulator`]: a synthetic two-tag reader with a known phase offset

pub mod record_parser;
pub mod simulator;

pub use record_parser::{format_reader_line, parse_reader_line};
pub use simulator::{SimulatedReader, SimulatorSettings};

use thiserror::Error;

/// Errors turning raw reader output into events.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
