use thiserror::Error;

use crate::domain::reimbursement::{ReimbursementId, ReimbursementStatus};
use crate::domain::request::{RequestId, RequestStatus};
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request transition from {from:?} to {to:?}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("reimbursement {id} is already {status:?}")]
    AlreadyResolved { id: ReimbursementId, status: ReimbursementStatus },
    #[error("request {id} has no confirmed booking result")]
    NoBookingResult { id: RequestId },
    #[error("validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("email `{0}` is already registered")]
    DuplicateEmail(String),
    #[error("`{actor}` is not permitted to {operation}")]
    PermissionDenied { actor: String, operation: &'static str },
    #[error("{entity} `{id}` was modified concurrently")]
    ConcurrentModification { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("external service failure: {0}")]
    ExternalService(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::Conflict { .. } => {
                "The record was changed by someone else. Reload and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Domain(DomainError::AlreadyResolved { .. })
            | ApplicationError::DuplicateEmail(_)
            | ApplicationError::ConcurrentModification { .. } => {
                Self::Conflict { message, correlation_id }
            }
            ApplicationError::Domain(_) => Self::BadRequest { message, correlation_id },
            ApplicationError::NotFound { .. } => Self::NotFound { message, correlation_id },
            ApplicationError::PermissionDenied { .. } => Self::Forbidden { message, correlation_id },
            ApplicationError::Persistence(message) | ApplicationError::ExternalService(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
