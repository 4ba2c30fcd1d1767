use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;
use townbook_collab::{DatabaseError, Forbidden, LibraryError, LifecycleError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// The request collides with the current state of a row
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Self::Unknown(message) = &self {
            error!("Request failed: {}", message);
        }

        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            e @ (DatabaseError::Conflict { .. }
            | DatabaseError::Stale { .. }
            | DatabaseError::InUse { .. }) => {
                Self::Conflict(e.to_string())
            }
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<Forbidden> for ServerError {
    fn from(value: Forbidden) -> Self {
        Self::Forbidden(value.to_string())
    }
}

impl From<LifecycleError> for ServerError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Forbidden(e) => e.into(),
            LifecycleError::Db(e) => e.into(),
            LifecycleError::Validation(message) => Self::BadRequest(message),
            e @ (LifecycleError::InvalidTransition { .. } | LifecycleError::Unavailable { .. }) => {
                Self::Conflict(e.to_string())
            }
        }
    }
}

impl From<LibraryError> for ServerError {
    fn from(value: LibraryError) -> Self {
        match value {
            LibraryError::Forbidden(e) => e.into(),
            LibraryError::Db(e) => e.into(),
            LibraryError::Validation(message) => Self::BadRequest(message),
            e @ LibraryError::InUse { .. } => Self::Conflict(e.to_string()),
        }
    }
}
