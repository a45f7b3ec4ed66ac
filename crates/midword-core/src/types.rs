use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NamespaceId = Uuid;
pub type RoundId = Uuid;

/// Stable reference to an immutable embedding row.
pub type EmbeddingId = Uuid;

/// Opaque id handed over by the identity provider.
pub type UserId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub id: NamespaceId,
    pub name: String,
    pub creator_id: UserId,
    pub public: bool,
}

/// A word of a namespace together with its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Embedding {
    pub id: EmbeddingId,
    pub namespace_id: NamespaceId,
    pub title: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub display_name: Option<String>,
    pub anonymous: bool,
    /// Anonymous account whose progress was claimed by another account.
    pub captured: bool,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    /// Bumped by every write to the row.
    #[serde(default)]
    pub version: i64,
}

impl User {
    pub fn anonymous(id: impl Into<UserId>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            anonymous: true,
            captured: false,
            score: 0,
            created_at,
            version: 0,
        }
    }

    pub fn named(id: impl Into<UserId>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(name.into()),
            anonymous: false,
            captured: false,
            score: 0,
            created_at,
            version: 0,
        }
    }
}

/// Normalizes free text the way titles are compared everywhere.
pub fn normalize_title(s: &str) -> String {
    s.trim().to_lowercase()
}
