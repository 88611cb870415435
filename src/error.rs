use crate::serializer::FieldErrors;
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, Method, StatusCode, header::ALLOW},
    response::{IntoResponse, Response},
};
use serde_json::json;
use snafu::Snafu;
use std::num::ParseIntError;

pub type EscolaResult<T> = Result<T, EscolaError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EscolaError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    MigrateError { source: sqlx::migrate::MigrateError },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse env var `{}` as a number", name))]
    ParseNumber {
        source: ParseIntError,
        name: &'static str,
    },
    #[snafu(display("Unknown storage backend {:?}, expected `postgres` or `memory`", found))]
    UnknownStorageBackend { found: String },
    #[snafu(display("Invalid student data"))]
    Validation { errors: FieldErrors },
    #[snafu(display("student with this email already exists."))]
    EmailTaken,
    #[snafu(display("Unable to find student with ID: {}", id))]
    MissingStudent { id: String },
    #[snafu(display("Invalid page."))]
    InvalidPage { page: String },
    #[snafu(display("{}", source.body_text()))]
    BadJson { source: JsonRejection },
    #[snafu(display("{}", source.body_text()))]
    BadQuery { source: QueryRejection },
    #[snafu(display("Method \"{}\" not allowed.", method))]
    MethodNotAllowed {
        method: Method,
        allowed: &'static str,
    },
    #[snafu(display("Not found."))]
    UnknownRoute,
}

impl IntoResponse for EscolaError {
    #[allow(clippy::match_same_arms)]
    fn into_response(self) -> Response {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input

        let status_code = match &self {
            Self::OpenDatabase { .. } | Self::MigrateError { .. } => ISE,
            Self::MakeQuery { .. } => ISE,
            Self::BadEnvVar { .. } | Self::ParseNumber { .. } => ISE,
            Self::UnknownStorageBackend { .. } => ISE,
            Self::Validation { .. } | Self::EmailTaken => BI,
            Self::MissingStudent { .. } | Self::InvalidPage { .. } | Self::UnknownRoute => NF,
            Self::BadJson { source } => source.status(),
            Self::BadQuery { source } => source.status(),
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        };

        if status_code.is_server_error() {
            error!(?self, "Error!");
        } else {
            debug!(?self, %status_code, "Rejected request");
        }

        match self {
            Self::Validation { errors } => (status_code, Json(errors)).into_response(),
            Self::EmailTaken => {
                (status_code, Json(json!({"email": [Self::EmailTaken.to_string()]})))
                    .into_response()
            }
            Self::MissingStudent { .. } => {
                (status_code, Json(json!({"detail": "Not found."}))).into_response()
            }
            Self::MethodNotAllowed { ref allowed, .. } => {
                let allow = HeaderValue::from_static(*allowed);
                (
                    status_code,
                    [(ALLOW, allow)],
                    Json(json!({"detail": self.to_string()})),
                )
                    .into_response()
            }
            _ if status_code.is_server_error() => (
                status_code,
                Json(json!({"detail": "A server error occurred."})),
            )
                .into_response(),
            other => (status_code, Json(json!({"detail": other.to_string()}))).into_response(),
        }
    }
}
