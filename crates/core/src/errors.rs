use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("{0}")]
    Validation(String),
}

/// Failures surfaced by workflow operations. All are terminal; none are
/// retried by the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no authenticated caller")]
    Unauthorized,
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("approval `{0}` has already been decided")]
    AlreadyDecided(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::AlreadyDecided(_) => "already_decided",
            Self::Validation(_) => "validation_error",
            Self::Persistence(_) => "persistence",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        Self::Validation(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "Sign in to continue.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => "The record was already updated by someone else.",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::BadRequest { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            WorkflowError::Unauthorized => Self::Unauthorized { message, correlation_id },
            WorkflowError::Forbidden(_) => Self::Forbidden { message, correlation_id },
            WorkflowError::NotFound { .. } => Self::NotFound { message, correlation_id },
            WorkflowError::AlreadyDecided(_) => Self::Conflict { message, correlation_id },
            WorkflowError::Validation(_) => Self::BadRequest { message, correlation_id },
            WorkflowError::Persistence(_) => Self::ServiceUnavailable { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DomainError, InterfaceError, WorkflowError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = WorkflowError::from(DomainError::Validation("quantity must be >= 1".into()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn already_decided_maps_to_conflict() {
        let interface = WorkflowError::AlreadyDecided("A1".into()).into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert!(interface.message().contains("A1"));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            WorkflowError::Persistence("database lock timeout".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn kinds_are_stable_snake_case() {
        assert_eq!(WorkflowError::Unauthorized.kind(), "unauthorized");
        assert_eq!(WorkflowError::not_found("approval", "A9").kind(), "not_found");
        assert_eq!(WorkflowError::Forbidden("x".into()).kind(), "forbidden");
        assert_eq!(WorkflowError::Validation("x".into()).kind(), "validation_error");
    }
}
