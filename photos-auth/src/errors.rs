use crate::auth::{federated::ProviderError, ticket_store::TicketStoreError};
use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No accepted scheme established a principal
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Principal established but the policy denied. `reason` is diagnostic only.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Ticket store unreachable or timed out outside of the authentication path (sign-in,
    /// sign-out)
    #[error("Ticket store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Stored ticket could not be decoded
    #[error("Corrupt ticket: {reason}")]
    CorruptTicket { reason: String },

    /// Invalid startup configuration: unregistered handler, missing policy, bad settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Identity provider failed or rejected a federated sign-in
    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::CorruptTicket { .. } => StatusCode::UNAUTHORIZED,
            Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Provider(ProviderError::InvalidCallback(_)) => StatusCode::BAD_REQUEST,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details.
    /// Denials never name the policy or the claims involved.
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { .. } => "Access denied".to_string(),
            Error::StoreUnavailable { .. } => "Service temporarily unavailable".to_string(),
            Error::CorruptTicket { .. } => "Authentication required".to_string(),
            Error::Configuration { .. } => "Internal server error".to_string(),
            Error::Provider(ProviderError::InvalidCallback(_)) => "Sign-in could not be completed".to_string(),
            Error::Provider(_) => "Identity provider unavailable".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Unavailable(_) => "Service temporarily unavailable".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl From<TicketStoreError> for Error {
    fn from(err: TicketStoreError) -> Self {
        match err {
            TicketStoreError::NotFound => Error::Unauthenticated { message: None },
            TicketStoreError::StoreUnavailable { reason } => Error::StoreUnavailable { reason },
            TicketStoreError::CorruptTicket(reason) => Error::CorruptTicket { reason },
            TicketStoreError::SessionIdCollision => Error::Internal {
                operation: "create session: generated session id collided".to_string(),
            },
            TicketStoreError::Encode(reason) => Error::Internal {
                operation: format!("encode ticket: {reason}"),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) | Error::Configuration { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::StoreUnavailable { .. } | Error::Database(DbError::Unavailable(_)) | Error::Provider(_) => {
                tracing::warn!("Dependency unavailable: {}", self);
            }
            Error::CorruptTicket { .. } => {
                tracing::warn!("Corrupt ticket: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            // the policy guard already logged the denial with the principal and reason
            Error::Forbidden { .. } => {}
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let user_message = self.user_message();
        (status, user_message).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
