use serde::Serialize;

use crate::domains::email::models::EmailSource;

/// Tokens never leave the server.
#[derive(Debug, Clone, Serialize)]
pub struct EmailSourceData {
    pub id: String,
    pub provider: String,
    pub address: String,
    pub enabled: bool,
    pub connected: bool,
    pub last_synced_at: Option<String>,
    pub created_at: String,
}

impl From<EmailSource> for EmailSourceData {
    fn from(source: EmailSource) -> Self {
        Self {
            id: source.id.to_string(),
            provider: source.provider,
            address: source.address,
            enabled: source.enabled,
            connected: source.access_token.is_some(),
            last_synced_at: source.last_synced_at.map(|t| t.to_rfc3339()),
            created_at: source.created_at.to_rfc3339(),
        }
    }
}
