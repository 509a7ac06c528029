//! Error type shared by every RPC, carrying the gRPC status code of the failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Subset of the gRPC status codes the model API answers with.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "INVALID_ARGUMENT")]
    InvalidArgument,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "ALREADY_EXISTS")]
    AlreadyExists,
    #[serde(rename = "FAILED_PRECONDITION")]
    FailedPrecondition,
    #[serde(rename = "INTERNAL")]
    Internal,
}

impl Code {
    /// Numeric value on the gRPC wire.
    pub fn value(&self) -> i32 {
        match self {
            Code::Ok => 0,
            Code::InvalidArgument => 3,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::FailedPrecondition => 9,
            Code::Internal => 13,
        }
    }

    /// HTTP status used by the REST gateway for this code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::InvalidArgument | Code::FailedPrecondition => StatusCode::BAD_REQUEST,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Code> for tonic::Code {
    fn from(code: Code) -> Self {
        match code {
            Code::Ok => tonic::Code::Ok,
            Code::InvalidArgument => tonic::Code::InvalidArgument,
            Code::NotFound => tonic::Code::NotFound,
            Code::AlreadyExists => tonic::Code::AlreadyExists,
            Code::FailedPrecondition => tonic::Code::FailedPrecondition,
            Code::Internal => tonic::Code::Internal,
        }
    }
}

/// JSON error body returned by the REST gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: i32,
    pub status: Code,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn code(&self) -> Code {
        match self {
            ServiceError::InvalidArgument(_) => Code::InvalidArgument,
            ServiceError::NotFound(_) => Code::NotFound,
            ServiceError::AlreadyExists(_) => Code::AlreadyExists,
            ServiceError::FailedPrecondition(_) => Code::FailedPrecondition,
            ServiceError::Database(_)
            | ServiceError::Json(_)
            | ServiceError::Io(_)
            | ServiceError::Internal(_) => Code::Internal,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let code = self.code();
        let message = match code {
            // Internals stay in the log.
            Code::Internal => "internal error".to_owned(),
            _ => self.to_string(),
        };

        ErrorBody {
            code: code.value(),
            status: code,
            message,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let code = self.code();
        if code == Code::Internal {
            log::error!("request failed: {}", self);
        } else {
            log::debug!("request rejected: {}", self);
        }

        (code.http_status(), Json(self.body())).into_response()
    }
}

impl From<ServiceError> for tonic::Status {
    fn from(err: ServiceError) -> Self {
        let body = err.body();
        if body.status == Code::Internal {
            log::error!("rpc failed: {}", err);
        } else {
            log::debug!("rpc rejected: {}", err);
        }

        tonic::Status::new(body.status.into(), body.message)
    }
}

#[cfg(test)]
mod test {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::{Code, ServiceError};

    #[test]
    pub fn codes_map_to_gateway_statuses() {
        let cases = [
            (ServiceError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST, 3),
            (ServiceError::FailedPrecondition("x".into()), StatusCode::BAD_REQUEST, 9),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND, 5),
            (ServiceError::AlreadyExists("x".into()), StatusCode::CONFLICT, 6),
        ];

        for (err, status, value) in cases {
            assert_eq!(err.code().value(), value);
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    pub fn codes_map_to_rpc_statuses() {
        let cases = [
            (ServiceError::InvalidArgument("x".into()), tonic::Code::InvalidArgument),
            (ServiceError::FailedPrecondition("x".into()), tonic::Code::FailedPrecondition),
            (ServiceError::NotFound("x".into()), tonic::Code::NotFound),
            (ServiceError::AlreadyExists("x".into()), tonic::Code::AlreadyExists),
            (ServiceError::Internal(anyhow::anyhow!("disk on fire")), tonic::Code::Internal),
        ];

        for (err, code) in cases {
            let value = err.code().value();
            let status = tonic::Status::from(err);
            assert_eq!(status.code(), code);
            assert_eq!(status.code() as i32, value);
        }
        let status = tonic::Status::from(ServiceError::Internal(anyhow::anyhow!("disk on fire")));
        assert_eq!(status.message(), "internal error");
    }

    #[test]
    pub fn internal_message_is_hidden() {
        let err = ServiceError::Internal(anyhow::anyhow!("disk on fire"));
        let body = err.body();

        assert_eq!(body.status, Code::Internal);
        assert_eq!(body.code, 13);
        assert_eq!(body.message, "internal error");
    }

    #[test]
    pub fn error_body_serde() {
        let body = ServiceError::NotFound("models/abc".into()).body();
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"code":5,"status":"NOT_FOUND","message":"not found: models/abc"}"#
        );
    }
}
