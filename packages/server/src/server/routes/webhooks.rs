//! `POST /webhooks/:user_id/:pipeline`: signed deliveries from outside
//! systems (mail forwarders, job alert services).
//!
//! The body is signed with HMAC-SHA256 over the raw bytes using the shared
//! webhook secret, sent as `X-Webhook-Signature: sha256=<hex>`. Only
//! pipelines that opt in to webhooks can be started this way.

use axum::body::Bytes;
use axum::extract::{Extension, Path};
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use crate::common::UserId;
use crate::domains::pipelines::{InvokeRequest, TriggerSource};
use crate::domains::users::User;
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::routes::idempotency_key;
use crate::server::routes::pipelines::{parse_input, RunResponse};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// `sha256=<hex>` signature of `body`.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of a `sha256=<hex>` header value.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(signature) = header
        .trim()
        .strip_prefix("sha256=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

pub async fn receive_webhook(
    Extension(state): Extension<AxumAppState>,
    Path((user_id, pipeline)): Path<(UserId, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    if state.webhook_secret.is_empty() {
        return Err(ApiError::Unavailable("webhooks are disabled".to_string()));
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&state.webhook_secret, &body, signature) {
        warn!(pipeline = %pipeline, user_id = %user_id, "rejected webhook with bad signature");
        return Err(ApiError::Unauthorized("invalid webhook signature".to_string()));
    }

    let input = parse_input(&body)?;
    if !User::exists(user_id, &state.db_pool).await? {
        return Err(ApiError::not_found("user"));
    }

    let request = InvokeRequest::builder()
        .pipeline(pipeline)
        .input(input)
        .user_id(Some(user_id))
        .trigger(TriggerSource::Webhook)
        .idempotency_key(idempotency_key(&headers).map(|k| format!("webhook:{}:{}", user_id, k)))
        .build();

    let outcome = state.registry.invoke(request, &state.deps).await?;
    info!(
        run_id = %outcome.run.id,
        pipeline = %outcome.run.pipeline_name,
        replayed = outcome.replayed,
        "webhook delivery handled"
    );

    Ok(Json(RunResponse {
        run: outcome.run.into(),
        replayed: outcome.replayed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"title":"Rust Engineer","company":"Acme"}"#;
        let header = sign_payload("shh", body).unwrap();

        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
        assert!(verify_signature("shh", body, &header));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let header = sign_payload("shh", b"original").unwrap();

        assert!(!verify_signature("shh", b"tampered", &header));
        assert!(!verify_signature("other", b"original", &header));
    }

    #[test]
    fn test_signature_requires_prefix_and_hex() {
        let header = sign_payload("shh", b"body").unwrap();
        let bare = header.trim_start_matches("sha256=");

        assert!(!verify_signature("shh", b"body", bare));
        assert!(!verify_signature("shh", b"body", "sha256=not-hex"));
        assert!(!verify_signature("shh", b"body", ""));
    }
}
