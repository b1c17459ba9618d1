use std::error::Error as StdErr;

use crate::parser::ParseFailure;

/// Failures reported by the external delivery collaborator. Boxed so the
/// scheduler stays agnostic of the front-end's error types.
pub type DeliveryError = Box<dyn StdErr + Send + Sync>;

#[derive(Debug)]
pub enum Error {
    /// The time expression could not be resolved. User-correctable and
    /// terminal for that input; never retried internally.
    Parse(ParseFailure),
    /// Invalid reminder contents (empty message, past trigger instant).
    Validation(String),
    Libsql(libsql::Error),
    Serde(serde::de::value::Error),
    Io(std::io::Error),
    /// The collaborator failed to deliver a due reminder. Only ever logged
    /// by the scheduler; the reminder stays due.
    Delivery(DeliveryError),
}
use core::result::Result as StdResult;

pub type Result<T = ()> = StdResult<T, Error>;

impl StdErr for Error {
    fn source(&self) -> Option<&(dyn StdErr + 'static)> {
        match self {
            Error::Parse(_) => None,
            Error::Validation(_) => None,
            Error::Libsql(error) => error.source(),
            Error::Serde(error) => error.source(),
            Error::Io(error) => error.source(),
            Error::Delivery(error) => Some(&**error),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Error::Parse(error) => write!(f, "{error}"),
            Error::Validation(reason) => write!(f, "{reason}"),
            Error::Libsql(error) => write!(f, "{error}"),
            Error::Serde(error) => write!(f, "{error}"),
            Error::Io(error) => write!(f, "{error}"),
            Error::Delivery(error) => write!(f, "{error}"),
        }
    }
}

impl Error {
    /// Whether the error should be surfaced verbatim to the requester
    /// (parse and validation failures) or as a generic retryable failure.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Validation(_))
    }
}

impl From<ParseFailure> for Error {
    fn from(value: ParseFailure) -> Self {
        Self::Parse(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<libsql::Error> for Error {
    fn from(value: libsql::Error) -> Self {
        Self::Libsql(value)
    }
}

impl From<serde::de::value::Error> for Error {
    fn from(value: serde::de::value::Error) -> Self {
        Self::Serde(value)
    }
}
