use rocket::serde::json::{self, Json};
use crate::error::{ApiError, ApiResult};

/// Unwraps a JSON request body, a body that does not parse is a validation error.
pub(crate) fn json_body<T>(body: Result<Json<T>, json::Error<'_>>) -> ApiResult<T> {
    body.map(Json::into_inner)
        .map_err(|e| ApiError::validation(format!("Invalid JSON body: {e}")))
}

/// Trimmed value of a mandatory name field.
pub(crate) fn required_name(field: &str, value: Option<&str>) -> ApiResult<String> {
    match value.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ApiError::validation(format!("{field} is required"))),
    }
}

/// Trimmed value of an optional text field, blank means absent.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
