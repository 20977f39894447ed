//! News record storage.
//!
//! Handlers depend on [`NewsStorer`] only; [`SqliteNewsStore`] is the
//! production backend and [`InMemoryNewsStore`] a drop-in test double.

mod clock;
mod memory;
mod sqlite;

use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::model::{Article, ArticleDraft};

pub use memory::InMemoryNewsStore;
pub use sqlite::SqliteNewsStore;

/// Backend failures, classified once at the store boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal(message.into())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// CRUD capability set over news articles.
///
/// Every call honors the context: an interrupted context fails with
/// [`StoreError::Internal`].
pub trait NewsStorer: Send + Sync + 'static {
    /// Persist a new article under a fresh id
    fn create(
        &self,
        ctx: &RequestContext,
        draft: ArticleDraft,
    ) -> impl Future<Output = StoreResult<Article>> + Send;

    /// All live articles, oldest first
    fn find_all(&self, ctx: &RequestContext)
        -> impl Future<Output = StoreResult<Vec<Article>>> + Send;

    fn find_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> impl Future<Output = StoreResult<Article>> + Send;

    /// Replace the client fields of a live article; `NotFound` when none matches.
    /// `updated_at` always moves strictly forward.
    fn update_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        draft: ArticleDraft,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Update, then return the record as stored.
    ///
    /// The default runs two calls; backends override it so the write and the
    /// read see the same row even under a concurrent delete.
    fn update_and_fetch(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        draft: ArticleDraft,
    ) -> impl Future<Output = StoreResult<Article>> + Send {
        async move {
            self.update_by_id(ctx, id, draft).await?;
            self.find_by_id(ctx, id).await
        }
    }

    /// Soft delete. Deleting an absent or already deleted id succeeds.
    fn delete_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}
