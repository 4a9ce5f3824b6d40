//! Error types.
//!
//! - `FitError` is the structural-failure taxonomy of the fitting core
//!   (unknown names, too little data, numerical breakdown).
//! - `AppError` is what the binary reports: a message plus a process exit code.
//!
//! Fit *quality* is never an error; it travels as data in `FitQuality`.

use thiserror::Error;

/// Structural failures of the model/fit/statistics core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Model '{0}' is unknown.")]
    UnknownModel(String),

    #[error("Statistic type '{0}' is not recognized.")]
    UnknownStatistic(String),

    #[error("Insufficient data for {context}: need at least {needed} points, got {got}.")]
    InsufficientData {
        context: String,
        needed: usize,
        got: usize,
    },

    #[error("Parameter '{0}' is defined by more than one model component.")]
    DuplicateParameter(String),

    #[error("Non-finite value encountered: {0}")]
    NonFinite(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl FitError {
    pub fn insufficient(context: impl Into<String>, needed: usize, got: usize) -> Self {
        FitError::InsufficientData {
            context: context.into(),
            needed,
            got,
        }
    }

    /// Exit code used when this error reaches the command line.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::UnknownModel(_)
            | FitError::UnknownStatistic(_)
            | FitError::DuplicateParameter(_)
            | FitError::InvalidOption(_) => 2,
            FitError::InsufficientData { .. } => 3,
            FitError::NonFinite(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
