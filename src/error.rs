//! # Error Types
//!
//! Typed errors for the parsing and statistics engine. Parsing failures are
//! fatal for the file they occur in; statistical degeneracies are not errors
//! at all and are absorbed into zero-valued sentinels by the callers.
//!
//! The binary wraps these in `anyhow::Error` and adds file context.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading traces, parsing summaries or aggregating runs
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The first line of a summary block does not carry a `d<int>-l<int>-<int>` token
    #[error("{run}: block {block}: malformed title line {line:?}")]
    MalformedTitle {
        run: String,
        block: usize,
        line: String,
    },

    /// A fixed-position line is absent from a summary block
    #[error("{run}: block {block}: missing line {line} ({field})")]
    MissingLine {
        run: String,
        block: usize,
        line: usize,
        field: &'static str,
    },

    /// A fixed-position token is absent or does not parse as a number
    #[error("{run}: block {block}: cannot parse {field} from {value:?}")]
    MalformedField {
        run: String,
        block: usize,
        field: &'static str,
        value: String,
    },

    /// A raw run identifier has no entry in the canonicalization table
    #[error("unknown test configuration: {0}")]
    UnknownConfiguration(String),

    /// A confidence interval was requested past the tabulated t distribution
    #[error("no Student-t critical value for {degrees_of_freedom} degrees of freedom (table covers 1..={max})")]
    DegreesOfFreedomOutOfRange { degrees_of_freedom: usize, max: usize },

    /// A trace file ended before its first complete record
    #[error("trace holds no complete samples")]
    EmptyTrace,

    /// A parameter was outside its accepted range
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Opening or reading an input file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the library
pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = AnalysisError::UnknownConfiguration("stock-triple-queue".to_string());
        assert_eq!(
            err.to_string(),
            "unknown test configuration: stock-triple-queue"
        );

        let err = AnalysisError::MalformedField {
            run: "rt-load".to_string(),
            block: 3,
            field: "packet count",
            value: "many".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "rt-load: block 3: cannot parse packet count from \"many\""
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = AnalysisError::io("/tmp/missing.data", inner);
        assert!(err.to_string().contains("/tmp/missing.data"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
