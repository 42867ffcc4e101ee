//! Configuration parse errors

use thiserror::Error;

/// A configuration text could not be parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct ConfigParseError {
    /// 1-based line number the problem was detected on
    pub line: usize,
    pub kind: ConfigErrorKind,
}

impl ConfigParseError {
    pub fn new(line: usize, kind: ConfigErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    #[error("Attribute found outside of any section")]
    AttributeOutsideSection,

    #[error("Unknown section [{0}]")]
    UnknownSection(String),

    #[error("Malformed line, expected `Key = Value`")]
    Syntax,

    #[error("Unrecognized key {0}")]
    UnrecognizedKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Duplicate [Interface] section")]
    DuplicateInterface,

    #[error("Missing [Interface] section")]
    MissingInterface,

    #[error("Missing required attribute {0}")]
    MissingAttribute(&'static str),
}
