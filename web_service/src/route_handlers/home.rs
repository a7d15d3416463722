pub const LIVENESS_TEXT: &str = "Call Event Webhook Receiver is Running";

pub async fn handler() -> impl axum::response::IntoResponse {
    LIVENESS_TEXT
}
