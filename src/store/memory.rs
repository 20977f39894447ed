use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use super::clock::Clock;
use super::{NewsStorer, StoreError, StoreResult};
use crate::context::RequestContext;
use crate::model::{Article, ArticleDraft};

/// Process-local store with the same observable behavior as the SQLite one.
/// Records live in insertion order; deletion only stamps `deleted_at`.
#[derive(Debug, Default)]
pub struct InMemoryNewsStore {
    records: RwLock<Vec<Article>>,
    clock: Clock,
}

impl InMemoryNewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Vec<Article>>> {
        self.records
            .read()
            .map_err(|_| StoreError::internal("Lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Vec<Article>>> {
        self.records
            .write()
            .map_err(|_| StoreError::internal("Lock poisoned"))
    }
}

fn check(ctx: &RequestContext, op: &str) -> StoreResult<()> {
    match ctx.interrupted() {
        Some(reason) => Err(StoreError::internal(format!("{}: {}", op, reason))),
        None => Ok(()),
    }
}

/// Mirrors the table's non-empty CHECK constraints
fn check_required(op: &str, draft: &ArticleDraft) -> StoreResult<()> {
    let fields = [
        ("author", &draft.author),
        ("title", &draft.title),
        ("summary", &draft.summary),
        ("content", &draft.content),
        ("source", &draft.source),
    ];
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((field, _)) => Err(StoreError::internal(format!(
            "{}: constraint failed: {} must not be empty",
            op, field
        ))),
        None => Ok(()),
    }
}

impl NewsStorer for InMemoryNewsStore {
    async fn create(&self, ctx: &RequestContext, draft: ArticleDraft) -> StoreResult<Article> {
        check(ctx, "create")?;
        check_required("create", &draft)?;

        let article = Article::from_draft(Uuid::new_v4(), draft, self.clock.now());
        self.write()?.push(article.clone());
        Ok(article)
    }

    async fn find_all(&self, ctx: &RequestContext) -> StoreResult<Vec<Article>> {
        check(ctx, "find_all")?;
        Ok(self
            .read()?
            .iter()
            .filter(|a| !a.is_deleted())
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, ctx: &RequestContext, id: Uuid) -> StoreResult<Article> {
        check(ctx, "find_by_id")?;
        self.read()?
            .iter()
            .find(|a| a.id == id && !a.is_deleted())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        draft: ArticleDraft,
    ) -> StoreResult<()> {
        self.update_and_fetch(ctx, id, draft).await.map(|_| ())
    }

    async fn update_and_fetch(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        draft: ArticleDraft,
    ) -> StoreResult<Article> {
        check(ctx, "update_by_id")?;
        check_required("update_by_id", &draft)?;

        let now = self.clock.now();
        let mut records = self.write()?;
        let article = records
            .iter_mut()
            .find(|a| a.id == id && !a.is_deleted())
            .ok_or(StoreError::NotFound)?;

        article.author = draft.author;
        article.title = draft.title;
        article.summary = draft.summary;
        article.content = draft.content;
        article.source = draft.source;
        article.tags = draft.tags;
        article.updated_at = now.max(article.updated_at + chrono::Duration::nanoseconds(1));
        Ok(article.clone())
    }

    async fn delete_by_id(&self, ctx: &RequestContext, id: Uuid) -> StoreResult<()> {
        check(ctx, "delete_by_id")?;

        let now = self.clock.now();
        if let Some(article) = self
            .write()?
            .iter_mut()
            .find(|a| a.id == id && !a.is_deleted())
        {
            article.deleted_at = Some(now);
        }
        Ok(())
    }
}
