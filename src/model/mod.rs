//! News article types: the raw client payload, the validated draft and the
//! persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unvalidated request body for create and update.
///
/// Absent fields decode to their empty value so the validator reports them
/// instead of the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsPayload {
    pub author: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub source: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub tags: Vec<String>,
}

/// A validated article that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub author: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    /// Canonical form of the parsed source URL
    pub source: String,
    pub tags: Vec<String>,
    /// `None` lets the store stamp the creation time
    pub created_at: Option<DateTime<Utc>>,
}

/// A persisted news article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub author: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub source: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Build a live article from a draft, stamping creation at `now`.
    ///
    /// A client-supplied `created_at` later than `now` also becomes the
    /// initial `updated_at`, keeping `created_at <= updated_at`.
    pub fn from_draft(id: Uuid, draft: ArticleDraft, now: DateTime<Utc>) -> Self {
        let created_at = draft.created_at.unwrap_or(now);
        Self {
            id,
            author: draft.author,
            title: draft.title,
            summary: draft.summary,
            content: draft.content,
            source: draft.source,
            tags: draft.tags,
            created_at,
            updated_at: created_at.max(now),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Response body of the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsList {
    pub news: Vec<Article>,
}
