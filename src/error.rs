//! Error types.
//!
//! Every failure surfaced by this crate is a [`GlError`]. It carries the
//! [`ErrorKind`], the name of the operation that detected the problem, the
//! source location of the detection point and a formatted message. Errors
//! are raised at the point of detection and never retried.

use std::fmt;
use std::panic::Location;

/// Category of a [`GlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A native object could not be allocated.
    ResourceCreation,
    /// A shader or effect could not be compiled or linked by the driver.
    Program,
    /// Invalid binding, texture unit overflow, out-of-range mapping or a
    /// failing native state call.
    State,
    /// An intentionally unsupported code path.
    NotImplemented,
    /// Device or context setup failed.
    Initialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceCreation => f.write_str("resource creation failed"),
            Self::Program => f.write_str("program error"),
            Self::State => f.write_str("state error"),
            Self::NotImplemented => f.write_str("not implemented"),
            Self::Initialization => f.write_str("initialization failed"),
        }
    }
}

/// Error raised by contexts, queues and resources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} in `{operation}` ({location}): {message}")]
pub struct GlError {
    kind: ErrorKind,
    operation: &'static str,
    location: &'static Location<'static>,
    message: String,
}

impl GlError {
    /// Create a new error, recording the caller's source location.
    #[track_caller]
    pub fn new(kind: ErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            location: Location::caller(),
            message: message.into(),
        }
    }

    #[track_caller]
    pub fn resource_creation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceCreation, operation, message)
    }

    #[track_caller]
    pub fn program(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Program, operation, message)
    }

    #[track_caller]
    pub fn state(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, operation, message)
    }

    #[track_caller]
    pub fn not_implemented(operation: &'static str) -> Self {
        Self::new(
            ErrorKind::NotImplemented,
            operation,
            "this code path is not supported",
        )
    }

    #[track_caller]
    pub fn initialization(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Initialization, operation, message)
    }

    /// Get the error category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the name of the operation that raised the error.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the source location where the error was detected.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Get the formatted message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error code reported by a native driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("native error 0x{code:04x}")]
pub struct DriverError {
    /// Native error code.
    pub code: u32,
}

impl DriverError {
    pub const INVALID_ENUM: Self = Self { code: 0x0500 };
    pub const INVALID_VALUE: Self = Self { code: 0x0501 };
    pub const INVALID_OPERATION: Self = Self { code: 0x0502 };
    pub const OUT_OF_MEMORY: Self = Self { code: 0x0505 };
}

/// Converts native call results into [`GlError`]s with context.
pub(crate) trait DriverResultExt<T> {
    fn or_gl(self, kind: ErrorKind, operation: &'static str, message: &str)
    -> Result<T, GlError>;
}

impl<T> DriverResultExt<T> for Result<T, DriverError> {
    #[track_caller]
    fn or_gl(
        self,
        kind: ErrorKind,
        operation: &'static str,
        message: &str,
    ) -> Result<T, GlError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(GlError::new(
                kind,
                operation,
                format!("{message}. Reason: {err}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GlError::state("bind_texture", "texture unit 40 exceeds maximum 16");
        let text = err.to_string();
        assert!(text.starts_with("state error in `bind_texture`"));
        assert!(text.ends_with("texture unit 40 exceeds maximum 16"));
        assert!(text.contains("error.rs"));
    }

    #[test]
    fn test_error_records_caller_location() {
        let line = line!() + 1;
        let err = GlError::not_implemented("map");
        assert_eq!(err.location().line(), line);
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        assert_eq!(err.operation(), "map");
    }

    #[test]
    fn test_driver_error_context() {
        let result: Result<(), DriverError> = Err(DriverError::OUT_OF_MEMORY);
        let err = result
            .or_gl(ErrorKind::ResourceCreation, "create_buffer", "Could not generate buffer")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
        assert_eq!(
            err.message(),
            "Could not generate buffer. Reason: native error 0x0505"
        );
    }
}
