use std::sync::Arc;

/// Application error taxonomy.
///
/// Every failure the framework raises is one of these kinds. Each kind maps
/// to an HTTP status so hosts can surface framework errors directly from a
/// handler; [`AppError::status`] returns the association.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    General(String),
    #[error("{0}")]
    Access(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    DuplicateEntry(String),
    #[error("{0}")]
    IllegalValue(String),
    #[error("{0}")]
    NotAllowed(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    RangeOutOfBounds(String),
    /// A kind defined by application code, carrying its own status.
    #[error("{message}")]
    Custom { message: String, status: u16 },
    /// A configuration file that failed to parse. Propagated verbatim so
    /// callers can tell a syntax problem from a semantic validation problem.
    #[error(transparent)]
    Syntax(#[from] serde_json::Error),
    /// Any unrelated error raised by application code; re-raised unchanged.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// The HTTP status associated with this kind.
    #[must_use]
    pub fn status(&self) -> u16 {
        use AppError::{
            Access, Authentication, Custom, DuplicateEntry, General, IllegalValue, NotAllowed, NotFound, NotImplemented, Other,
            RangeOutOfBounds, Syntax,
        };

        match self {
            General(_) | Syntax(_) | Other(_) => 500,
            Access(_) => 403,
            Authentication(_) => 401,
            DuplicateEntry(_) => 409,
            IllegalValue(_) => 400,
            NotAllowed(_) => 405,
            NotFound(_) => 404,
            NotImplemented(_) => 501,
            RangeOutOfBounds(_) => 416,
            Custom { status, .. } => *status,
        }
    }
}

/// Error-constructor namespace handed to modules under the `$E` token.
///
/// Lets module code raise taxonomy errors without importing the enum, and
/// keeps custom status codes inside the valid HTTP range.
#[derive(Debug, Default, Clone, Copy)]
pub struct Errors;

impl Errors {
    #[must_use]
    pub fn general(&self, message: impl Into<String>) -> AppError {
        AppError::General(message.into())
    }

    #[must_use]
    pub fn access(&self, message: impl Into<String>) -> AppError {
        AppError::Access(message.into())
    }

    #[must_use]
    pub fn authentication(&self, message: impl Into<String>) -> AppError {
        AppError::Authentication(message.into())
    }

    #[must_use]
    pub fn duplicate_entry(&self, message: impl Into<String>) -> AppError {
        AppError::DuplicateEntry(message.into())
    }

    #[must_use]
    pub fn illegal_value(&self, message: impl Into<String>) -> AppError {
        AppError::IllegalValue(message.into())
    }

    #[must_use]
    pub fn not_allowed(&self, message: impl Into<String>) -> AppError {
        AppError::NotAllowed(message.into())
    }

    #[must_use]
    pub fn not_found(&self, message: impl Into<String>) -> AppError {
        AppError::NotFound(message.into())
    }

    #[must_use]
    pub fn not_implemented(&self, message: impl Into<String>) -> AppError {
        AppError::NotImplemented(message.into())
    }

    #[must_use]
    pub fn range_out_of_bounds(&self, message: impl Into<String>) -> AppError {
        AppError::RangeOutOfBounds(message.into())
    }

    /// Builds a custom-kind error. The status must be a valid HTTP code,
    /// `100..=505`.
    ///
    /// # Errors
    /// Returns [`AppError::IllegalValue`] if `status` is out of range.
    pub fn custom(&self, message: impl Into<String>, status: u16) -> Result<AppError, AppError> {
        if !(100..=505).contains(&status) {
            return Err(AppError::IllegalValue(format!("{status} is not a valid HTTP status code")));
        }
        Ok(AppError::Custom {
            message: message.into(),
            status,
        })
    }
}

pub(crate) type SharedErrors = Arc<Errors>;
