//! Error taxonomy shared by the service and the client.
//!
//! Messages are operator diagnostics; callers dispatch on the variant (or the
//! HTTP status it maps to), never on the text.

use crate::types::EntityId;

pub type Result<T> = std::result::Result<T, WorldError>;

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Missing or malformed request fields.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("entity {0} not found")]
    NotFound(EntityId),

    /// Content generator unreachable or returned an unusable payload.
    #[error("generator failed: {0}")]
    Generator(String),

    /// Network or storage failure while querying. Resolved by the next poll.
    #[error("transient query failure: {0}")]
    TransientQuery(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl WorldError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientQuery(_))
    }

    /// Text for the `{"error": ...}` body. Validation messages go out bare.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(feature = "server")]
mod response {
    use super::WorldError;
    use axum::extract::rejection::{PathRejection, QueryRejection};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use serde_json::json;

    impl WorldError {
        pub fn status(&self) -> StatusCode {
            match self {
                WorldError::Validation(_) => StatusCode::BAD_REQUEST,
                WorldError::NotFound(_) => StatusCode::NOT_FOUND,
                WorldError::TransientQuery(_) => StatusCode::SERVICE_UNAVAILABLE,
                WorldError::Generator(_) | WorldError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }

    impl From<QueryRejection> for WorldError {
        fn from(rejection: QueryRejection) -> Self {
            WorldError::Validation(rejection.body_text())
        }
    }

    impl From<PathRejection> for WorldError {
        fn from(rejection: PathRejection) -> Self {
            WorldError::Validation(rejection.body_text())
        }
    }

    impl IntoResponse for WorldError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                log::error!("request failed: {}", self);
            } else {
                log::debug!("request rejected: {}", self);
            }
            (status, Json(json!({ "error": self.public_message() }))).into_response()
        }
    }
}
