use core::fmt;

/// Result alias for `hiermap`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by loaders, writers and the partitioning facade.
///
/// The partition engine itself has no recoverable failure modes; everything
/// here originates at the boundary (input parsing, output, configuration).
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Malformed network file.
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Underlying I/O failure (message only, so the error stays `Clone`).
    Io(String),

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::Parse { line, message } => write!(f, "parse error on line {line}: {message}"),
            Error::Io(msg) => write!(f, "i/o error: {msg}"),
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_error() {
        let err = Error::Parse {
            line: 7,
            message: "expected '*Arcs'".to_string(),
        };
        assert_eq!(err.to_string(), "parse error on line 7: expected '*Arcs'");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.net");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(ref m) if m.contains("missing.net")));
    }
}
