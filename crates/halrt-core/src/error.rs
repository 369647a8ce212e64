//! Error and status types.
//!
//! Every public entry point returns [`Result`]. At the host boundary an
//! [`Error`] collapses to a [`Status`] code via [`Error::status`].

use std::fmt;

use halrt_registry::ObjectId;
use thiserror::Error;

use crate::property::Selector;

/// Result alias used across the runtime.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by runtime operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced object is not registered, or is being destroyed.
    #[error("object {id} not found")]
    NotFound {
        /// Id that failed to resolve.
        id: ObjectId,
    },

    /// A required argument is missing or the call is not valid for this
    /// object.
    #[error("illegal operation: {0}")]
    IllegalOperation(&'static str),

    /// The object has no property with this selector.
    #[error("unknown property '{selector}'")]
    UnknownProperty {
        /// Selector that was requested.
        selector: Selector,
    },

    /// Caller buffer or value does not have the size the property requires.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size the property requires.
        expected: usize,
        /// Size the caller provided.
        actual: usize,
    },

    /// The value is not in the advertised supported set.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// A control or I/O handler reported failure.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl Error {
    /// Status code reported to the host for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::NotFound { .. } => Status::BadObject,
            Error::IllegalOperation(_) => Status::IllegalOperation,
            Error::UnknownProperty { .. } => Status::UnknownProperty,
            Error::SizeMismatch { .. } => Status::BadPropertySize,
            Error::UnsupportedValue(_) => Status::UnsupportedOperation,
            Error::Handler(_) => Status::Unspecified,
        }
    }

    pub(crate) fn not_found(id: ObjectId) -> Self {
        Error::NotFound { id }
    }
}

/// Failure reported by a user-supplied handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Wire-level status codes understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// No error.
    Ok,
    /// Object id did not resolve.
    BadObject,
    /// Operation not permitted.
    IllegalOperation,
    /// Property selector not supported.
    UnknownProperty,
    /// Property data size is wrong.
    BadPropertySize,
    /// Value or operation not supported.
    UnsupportedOperation,
    /// Unclassified failure.
    Unspecified,
}

impl Status {
    /// Four-character code the host expects.
    pub const fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::BadObject => u32::from_be_bytes(*b"!obj"),
            Status::IllegalOperation => u32::from_be_bytes(*b"nope"),
            Status::UnknownProperty => u32::from_be_bytes(*b"who?"),
            Status::BadPropertySize => u32::from_be_bytes(*b"!siz"),
            Status::UnsupportedOperation => u32::from_be_bytes(*b"unop"),
            Status::Unspecified => u32::from_be_bytes(*b"what"),
        }
    }

    /// Collapse a result to its status.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }

    /// Whether this is [`Status::Ok`].
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("ok"),
            other => {
                let code = other.code().to_be_bytes();
                write!(f, "'{}'", String::from_utf8_lossy(&code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::not_found(ObjectId::new(7)).status(), Status::BadObject);
        assert_eq!(
            Error::IllegalOperation("null").status(),
            Status::IllegalOperation
        );
        assert_eq!(
            Error::UnknownProperty {
                selector: Selector::NAME
            }
            .status(),
            Status::UnknownProperty
        );
        assert_eq!(
            Error::SizeMismatch {
                expected: 8,
                actual: 4
            }
            .status(),
            Status::BadPropertySize
        );
        assert_eq!(
            Error::UnsupportedValue("rate".into()).status(),
            Status::UnsupportedOperation
        );
        assert_eq!(
            Error::from(HandlerError::new("boom")).status(),
            Status::Unspecified
        );
    }

    #[test]
    fn display_messages() {
        assert_eq!(Error::not_found(ObjectId::new(7)).to_string(), "object 7 not found");
        assert_eq!(
            Error::UnknownProperty {
                selector: Selector::NAME
            }
            .to_string(),
            "unknown property 'lnam'"
        );
        assert_eq!(
            Error::SizeMismatch {
                expected: 8,
                actual: 4
            }
            .to_string(),
            "size mismatch: expected 8 bytes, got 4"
        );
    }

    #[test]
    fn handler_error_is_source() {
        let err = Error::from(HandlerError::new("device unplugged"));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "handler failed: device unplugged");
    }

    #[test]
    fn status_codes_are_fourcc() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::BadObject.code(), 0x216F_626A);
        assert_eq!(Status::BadObject.to_string(), "'!obj'");
        assert_eq!(Status::from_result(&Ok::<_, Error>(())), Status::Ok);
        assert!(
            !Status::from_result(&Err::<(), _>(Error::IllegalOperation("x"))).is_ok()
        );
    }
}
