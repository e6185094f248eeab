//! API error taxonomy and its HTTP mapping.

use anyhow::anyhow;
use log::{error, warn};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use crate::grades::GradeVectorError;
use crate::record_id::RecordId;

/// Every failure a handler can report, each mapped to one HTTP status.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// malformed id in the request path (400)
    #[error("Invalid {kind} id: {id}")]
    InvalidIdentifier { kind: &'static str, id: String },
    /// missing or empty field, bad grade vector, empty update (400)
    #[error("{0}")]
    Validation(String),
    /// referenced record does not exist (404)
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: RecordId },
    /// anything unexpected, usually a database failure (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
    pub fn status(&self) -> Status {
        match self {
            ApiError::InvalidIdentifier { .. } => Status::BadRequest,
            ApiError::Validation(_) => Status::BadRequest,
            ApiError::NotFound { .. } => Status::NotFound,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(anyhow!("SQL error: {err}"))
    }
}
impl From<GradeVectorError> for ApiError {
    fn from(err: GradeVectorError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageBody {
    pub message: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        match &self {
            ApiError::Internal(err) => {
                error!("{} {}: {err}\nbacktrace: {}", request.method(), request.uri(), err.backtrace());
            }
            _ => warn!("{} {} -> {}: {self}", request.method(), request.uri(), status.code),
        }
        Custom(status, Json(ErrorBody { error: self.to_string() })).respond_to(request)
    }
}

pub trait OptionExt<T> {
    fn or_not_found(self, kind: &'static str, id: &RecordId) -> ApiResult<T>;
}
impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, kind: &'static str, id: &RecordId) -> ApiResult<T> {
        self.ok_or_else(|| ApiError::NotFound { kind, id: id.clone() })
    }
}

pub fn parse_record_id(kind: &'static str, id: &str) -> ApiResult<RecordId> {
    RecordId::parse(id).ok_or_else(|| ApiError::InvalidIdentifier { kind, id: id.to_string() })
}
