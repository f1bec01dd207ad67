//! API Key domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::uuid_id;

uuid_id! {
    /// Unique identifier for an admin API key.
    ApiKeyId
}

/// An admin API key. Only the SHA-256 hash is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Creates a new API key with the given name and hash.
    pub fn new(name: String, key_hash: String) -> Self {
        Self {
            id: ApiKeyId::new(),
            name,
            key_hash,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}
