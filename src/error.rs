//! Crate-wide error type.
//!
//! Every fallible operation returns `AppError`. The binary maps it to a process
//! exit code; library callers match on [`ErrorKind`].

/// What went wrong, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A loader or fitter code is not in the registry.
    UnknownConfiguration,
    /// A persisted fit (or one of its files) does not exist.
    NotFound,
    /// A model name could not be split into loader / architecture / fitter.
    InvalidModelName,
    /// The request is inconsistent (e.g. saving without a cell id).
    InvalidRequest,
    Io,
    Serialization,
    /// Failure reported by an evaluator while running steps.
    Evaluation,
}

impl ErrorKind {
    /// Default process exit code for this kind.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::UnknownConfiguration | ErrorKind::InvalidModelName | ErrorKind::InvalidRequest => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Io | ErrorKind::Serialization | ErrorKind::Evaluation => 4,
        }
    }
}

#[derive(Clone, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: kind.exit_code(),
            message: message.into(),
        }
    }

    pub fn unknown_configuration(what: &str, code: &str) -> Self {
        Self::new(ErrorKind::UnknownConfiguration, format!("unknown {what} string '{code}'"))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}
