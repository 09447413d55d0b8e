use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{error_response, map_tryon_error};
use crate::api::server::AppState;
use crate::tryon::request::TryOnRequestBody;

#[derive(Debug, Clone, Serialize)]
pub struct TryOnResponse {
    pub ok: bool,
    pub output: Vec<String>,
    pub job_id: String,
}

pub async fn tryon_handler(
    State(state): State<AppState>,
    payload: Result<Json<TryOnRequestBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let (status, code) = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            } else {
                (StatusCode::BAD_REQUEST, "bad_request")
            };
            return error_response(status, ErrorKind::Validation, code, rejection.body_text())
                .into_response();
        }
    };

    match state.tryon.run_isolated(body).await {
        Ok(result) => (
            StatusCode::OK,
            Json(TryOnResponse {
                ok: true,
                output: result.output,
                job_id: result.job_id,
            }),
        )
            .into_response(),
        Err(error) => map_tryon_error(&error).into_response(),
    }
}
