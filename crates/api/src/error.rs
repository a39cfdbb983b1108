use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_with::skip_serializing_none;

/// A single invalid input field, in the shape clients render next to the
/// form control that caused it.
#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[skip_serializing_none]
#[derive(Serialize, Debug)]
pub struct ApiError {
    pub error: String,
    #[serde(rename = "error_description")]
    pub description: Option<String>,
    pub fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing)]
    pub status_code: StatusCode,
}

impl ApiError {
    pub fn new(error: &str, status_code: StatusCode) -> Self {
        ApiError {
            error: String::from(error),
            description: None,
            fields: None,
            status_code,
        }
    }

    pub fn new_with_description(error: &str, description: &str, status_code: StatusCode) -> Self {
        ApiError {
            error: String::from(error),
            description: Some(String::from(description)),
            fields: None,
            status_code,
        }
    }

    pub fn invalid_fields(fields: Vec<FieldError>, status_code: StatusCode) -> Self {
        ApiError {
            error: String::from("Validation failed"),
            description: None,
            fields: Some(fields),
            status_code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}
