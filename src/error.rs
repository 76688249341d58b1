//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported database type '{0}' (expected sqlite or postgres)")]
    UnsupportedBackend(String),
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Why a single extension package could not be loaded. Never fatal to boot.
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: invalid archive: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{}: missing manifest.json", path.display())]
    MissingManifest { path: PathBuf },
    #[error("{}: invalid manifest.json: {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },
    #[error("{}: invalid migration file '{file}': {message}", path.display())]
    InvalidMigration {
        path: PathBuf,
        file: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("duplicate migration version {version} ({first} and {second})")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },
    #[error("migration {version} ({description}) from {source_name} failed: {cause}")]
    ApplyFailure {
        version: i64,
        description: String,
        source_name: String,
        #[source]
        cause: sqlx::Error,
    },
    #[error("migration {0} is not applied")]
    NotApplied(i64),
    #[error("no migration with version {0}")]
    UnknownVersion(i64),
    #[error("migration {0} has no down script")]
    Irreversible(i64),
    #[error("migration store: {0}")]
    Db(#[from] sqlx::Error),
}

/// Anything that stops the service from starting.
#[derive(Error, Debug)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload has no columns to write")]
    EmptyPayload,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("request body exceeds the size limit")]
    PayloadTooLarge,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidIdentifier(_) | AppError::EmptyPayload | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidIdentifier(_) => "invalid_identifier",
            AppError::NotFound(_) => "not_found",
            AppError::EmptyPayload => "empty_payload",
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::Db(_) => "database_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Db(e) => {
                tracing::error!(error = %e, "database error");
                "internal database error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(AppError::InvalidIdentifier("x;".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::EmptyPayload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("widgets/9".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Db(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn duplicate_version_names_both_sources() {
        let e = MigrationError::DuplicateVersion {
            version: 20240101000000,
            first: "host".into(),
            second: "inventory".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("host"));
        assert!(msg.contains("inventory"));
    }
}
