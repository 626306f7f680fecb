mod error;
mod relay;

pub use error::{ErrorResponse, RelayError};
pub use relay::Relay;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use tracing::instrument;

/// Reply used when the inference service answers with nothing usable.
pub const FALLBACK_REPLY: &str = "could not obtain a response at this time";

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct ChatRequest {
    /// Missing and `null` both mean an empty message.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct ChatResponse {
    pub reply: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Messages of any length are forwarded, so axum's body limit is lifted.
pub fn app(relay: Relay) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .layer(DefaultBodyLimit::disable())
        .with_state(relay)
}

#[instrument(skip_all, fields(message_len))]
async fn chat_handler(
    State(relay): State<Relay>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, RelayError> {
    let Json(request) =
        request.map_err(|rejection| RelayError::BadRequest(rejection.body_text()))?;
    tracing::Span::current().record("message_len", request.message.len());

    let reply = relay.reply_to(&request.message).await?;
    tracing::info!("Replying with {} bytes", reply.len());

    Ok(Json(ChatResponse { reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_defaults_to_empty() {
        let request: ChatRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.message, "");

        let request: ChatRequest = serde_json::from_str(r#"{"message": null}"#).unwrap();
        assert_eq!(request.message, "");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hola", "user": "ana"}"#).unwrap();
        assert_eq!(request.message, "hola");
    }

    #[test]
    fn non_string_message_is_rejected() {
        assert!(serde_json::from_str::<ChatRequest>(r#"{"message": 5}"#).is_err());
        assert!(serde_json::from_str::<ChatRequest>(r#""message""#).is_err());
    }

    #[test]
    fn response_shape() {
        let body = serde_json::to_value(ChatResponse { reply: "hi".into() }).unwrap();
        assert_eq!(body, serde_json::json!({"reply": "hi"}));
    }
}
