use std::fmt;
use thiserror::Error;

/// A single exposition-format syntax error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number of the offending line
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text format parsing error in line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Errors surfaced by the ingestion pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Both the plain parse and the comment-stripped retry failed
    #[error("failed to parse metrics without comments; cause: {retry}; original cause: {original}")]
    Parse {
        original: ParseError,
        retry: ParseError,
    },

    /// HTTP transport error while fetching a snapshot
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status code: {0}")]
    UnexpectedStatus(u16),

    #[error("response body is empty")]
    EmptyBody,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration, reported once at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opaque failure of an injected snapshot collaborator
    #[error("{0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short label for status lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::Http(_) | Self::UnexpectedStatus(_) | Self::EmptyBody | Self::Source(_) => {
                "fetch_error"
            }
            Self::Io(_) => "io_error",
            Self::Config(_) => "config_error",
        }
    }
}
