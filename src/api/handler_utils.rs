use axum::http::StatusCode;
use axum::Json;
use tracing::error;

use crate::api::error::{ErrorBody, ErrorKind};
use crate::tryon::error::TryOnError;

pub type ApiObject<T> = (StatusCode, Json<T>);

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: &'static str,
    message: impl Into<String>,
) -> ApiObject<ErrorBody> {
    (status, Json(ErrorBody::new(kind, code, message)))
}

pub fn map_tryon_error(error: &TryOnError) -> ApiObject<ErrorBody> {
    if let TryOnError::Unexpected(detail) = error {
        return internal_error(detail.as_str());
    }

    let kind = error.kind();
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = ErrorBody::new(kind.into(), kind.code(), error.to_string());
    body.requires_api_key = error.requires_api_key();
    (status, Json(body))
}

pub fn internal_error(detail: impl Into<String>) -> ApiObject<ErrorBody> {
    let detail = detail.into();
    error!(detail = %detail, "internal api error");
    let unexpected = TryOnError::Unexpected(detail);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        unexpected.kind().code(),
        unexpected.to_string(),
    )
}
