use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relaygate_schema::{AnthropicErrorBody, OpenaiErrorBody};

/// `{type:"error", error:{type:"api_error"|"invalid_request_error", message}}`.
pub fn anthropic_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let error_type = if status == StatusCode::BAD_REQUEST {
        "invalid_request_error"
    } else {
        "api_error"
    };
    let body = AnthropicErrorBody::new(error_type, message.into());
    (status, Json(body)).into_response()
}

/// `{error:{message, type:"api_error", code:status}}`.
pub fn openai_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = OpenaiErrorBody::api_error(message.into(), status.as_u16());
    (status, Json(body)).into_response()
}

/// Gemini dialect surfaces a plain text body with the upstream status
/// preserved, matching the wire behavior of the upstream it proxies.
pub fn gemini_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}
