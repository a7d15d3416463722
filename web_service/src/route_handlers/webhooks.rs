use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use shared_lib::call_structs::{CallCategory, CallEventPayload, CallEventRecord, PayloadError};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    message: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookError {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(WebhookError { error })).into_response()
}

/// `POST /webhook/:category`, the category is checked against the allow-list before anything else.
pub async fn category_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
    body: Bytes,
) -> Response {
    let category = match category.parse::<CallCategory>() {
        Ok(category) => category,
        Err(e) => {
            tracing::warn!("Rejected webhook: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "Unknown call category");
        }
    };

    handler(state, category, body).await
}

pub async fn handler(state: AppState, category: CallCategory, body: Bytes) -> Response {
    let payload = match CallEventPayload::from_json_bytes(&body) {
        Ok(payload) => payload,
        Err(PayloadError::Empty) => {
            tracing::warn!("No data received for {}", category);
            return error_response(StatusCode::BAD_REQUEST, "No data received");
        }
        Err(e @ PayloadError::Invalid(_)) => {
            tracing::warn!("Rejected {} webhook: {}", category, e);
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON payload");
        }
    };

    let record = CallEventRecord::from_payload(category, payload);
    tracing::debug!("Webhook request: {:?}", record);

    match state.db.insert_call_event(&record).await {
        Ok(_) => {
            tracing::info!(
                "Data inserted into {} (callID {:?})",
                category.table(),
                record.call_id
            );
            let message = format!("{} call received", category.label());
            (StatusCode::OK, Json(WebhookResponse { message })).into_response()
        }
        Err(e) => {
            tracing::error!("Database error while storing {} call: {:?}", category, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store call event",
            )
        }
    }
}
