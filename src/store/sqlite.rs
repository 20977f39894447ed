use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use super::clock::Clock;
use super::{NewsStorer, StoreError, StoreResult};
use crate::context::RequestContext;
use crate::db::Database;
use crate::model::{Article, ArticleDraft};

const COLUMNS: &str =
    "id, author, title, summary, content, source, tags, created_at, updated_at, deleted_at";

/// VM instructions between abort checks
const PROGRESS_OPS: c_int = 1_000;

/// News store over the `news` table.
///
/// Each call runs on tokio's blocking pool and races the caller's context;
/// losing the race raises an abort flag that interrupts the statement.
pub struct SqliteNewsStore {
    db: Database,
    clock: Clock,
}

impl SqliteNewsStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            clock: Clock::default(),
        }
    }

    async fn run<T, F>(&self, ctx: &RequestContext, op: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        if let Some(reason) = ctx.interrupted() {
            return Err(StoreError::internal(format!("{}: {}", op, reason)));
        }

        let abort = AbortOnDrop::default();
        let flag = abort.flag();
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || {
            db.with_conn(|conn| {
                if flag.load(Ordering::Relaxed) {
                    return Err(StoreError::internal(format!("{}: aborted before start", op)));
                }
                let _watch = ProgressWatch::install(conn, Arc::clone(&flag));
                f(conn)
            })
        });

        let result = tokio::select! {
            joined = task => match joined {
                Ok(result) => result,
                Err(e) => Err(StoreError::internal(format!("{}: worker failed: {}", op, e))),
            },
            reason = ctx.done() => Err(StoreError::internal(format!("{}: {}", op, reason))),
        };
        drop(abort);

        if let Err(e) = &result {
            debug!(parent: ctx.span(), operation = op, error = %e, "store operation failed");
        }
        result
    }
}

/// Raises the abort flag when the awaiting side goes away, including when
/// the request future itself is dropped.
#[derive(Default)]
struct AbortOnDrop(Arc<AtomicBool>);

impl AbortOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Progress handler bound to one operation; removed on drop so a pooled
/// connection never keeps a stale flag.
struct ProgressWatch<'a> {
    conn: &'a Connection,
}

impl<'a> ProgressWatch<'a> {
    fn install(conn: &'a Connection, flag: Arc<AtomicBool>) -> Self {
        conn.progress_handler(PROGRESS_OPS, Some(move || flag.load(Ordering::Relaxed)));
        Self { conn }
    }
}

impl Drop for ProgressWatch<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

fn internal(op: &str, e: rusqlite::Error) -> StoreError {
    StoreError::internal(format!("{}: {}", op, e))
}

/// Fixed-width UTC form; string order matches time order
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn encode_tags(op: &str, tags: &[String]) -> StoreResult<String> {
    serde_json::to_string(tags)
        .map_err(|e| StoreError::internal(format!("{}: encoding tags: {}", op, e)))
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    let id: String = row.get(0)?;
    let tags: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let deleted_at: Option<String> = row.get(9)?;

    Ok(Article {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        author: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        content: row.get(4)?,
        source: row.get(5)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(6, e))?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
        deleted_at: deleted_at
            .map(|text| parse_timestamp(9, &text))
            .transpose()?,
    })
}

/// Rewrite a live row inside one immediate transaction.
///
/// The new `updated_at` is strictly after the stored one, so it advances
/// even when the stored value is ahead of this process's clock.
fn update_row(
    conn: &Connection,
    id: Uuid,
    draft: &ArticleDraft,
    tags: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Article> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let previous: String = tx.query_row(
        "SELECT updated_at FROM news WHERE id = ?1 AND deleted_at IS NULL",
        [id.to_string()],
        |row| row.get(0),
    )?;
    let previous = parse_timestamp(0, &previous)?;
    let updated_at = now.max(previous + chrono::Duration::nanoseconds(1));

    let article = tx.query_row(
        &format!(
            "UPDATE news
             SET author = ?2, title = ?3, summary = ?4, content = ?5, source = ?6,
                 tags = ?7, updated_at = ?8
             WHERE id = ?1 AND deleted_at IS NULL
             RETURNING {}",
            COLUMNS
        ),
        params![
            id.to_string(),
            draft.author,
            draft.title,
            draft.summary,
            draft.content,
            draft.source,
            tags,
            format_timestamp(&updated_at),
        ],
        article_from_row,
    )?;
    tx.commit()?;
    Ok(article)
}

impl NewsStorer for SqliteNewsStore {
    async fn create(&self, ctx: &RequestContext, draft: ArticleDraft) -> StoreResult<Article> {
        let article = Article::from_draft(Uuid::new_v4(), draft, self.clock.now());
        let tags = encode_tags("create", &article.tags)?;

        self.run(ctx, "create", move |conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO news
                     (id, author, title, summary, content, source, tags, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     RETURNING {}",
                    COLUMNS
                ),
                params![
                    article.id.to_string(),
                    article.author,
                    article.title,
                    article.summary,
                    article.content,
                    article.source,
                    tags,
                    format_timestamp(&article.created_at),
                    format_timestamp(&article.updated_at),
                ],
                article_from_row,
            )
            .map_err(|e| internal("create", e))
        })
        .await
    }

    async fn find_all(&self, ctx: &RequestContext) -> StoreResult<Vec<Article>> {
        self.run(ctx, "find_all", |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM news WHERE deleted_at IS NULL ORDER BY rowid",
                    COLUMNS
                ))
                .map_err(|e| internal("find_all", e))?;

            let articles = stmt
                .query_map([], article_from_row)
                .map_err(|e| internal("find_all", e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| internal("find_all", e))?;

            Ok(articles)
        })
        .await
    }

    async fn find_by_id(&self, ctx: &RequestContext, id: Uuid) -> StoreResult<Article> {
        self.run(ctx, "find_by_id", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM news WHERE id = ?1 AND deleted_at IS NULL",
                    COLUMNS
                ),
                [id.to_string()],
                article_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => internal("find_by_id", other),
            })
        })
        .await
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
        let now = self.clock.now();
        let tags = encode_tags("update_by_id", &draft.tags)?;

        self.run(ctx, "update_by_id", move |conn| {
            update_row(conn, id, &draft, &tags, now).map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => internal("update_by_id", other),
            })
        })
        .await
    }

    async fn delete_by_id(&self, ctx: &RequestContext, id: Uuid) -> StoreResult<()> {
        let now = format_timestamp(&self.clock.now());

        self.run(ctx, "delete_by_id", move |conn| {
            // Zero rows means already gone, which is fine
            conn.execute(
                "UPDATE news SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string(), now],
            )
            .map(|_| ())
            .map_err(|e| internal("delete_by_id", e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::config::DatabaseConfig;

    fn store() -> SqliteNewsStore {
        let db = Database::open_in_memory().unwrap();
        db.migrate_up().unwrap();
        SqliteNewsStore::new(db)
    }

    fn draft(author: &str) -> ArticleDraft {
        ArticleDraft {
            author: author.to_string(),
            title: "Breaking NEWS".to_string(),
            summary: "A brief summary of news".to_string(),
            content: "Batman is a hero with super powers who saves people from devil".to_string(),
            source: "https://www.google.com/".to_string(),
            tags: vec!["marvel".to_string(), "test-1".to_string()],
            created_at: None,
        }
    }

    fn assert_client_fields(expected: &ArticleDraft, got: &Article) {
        assert_eq!(expected.author, got.author);
        assert_eq!(expected.title, got.title);
        assert_eq!(expected.summary, got.summary);
        assert_eq!(expected.content, got.content);
        assert_eq!(expected.source, got.source);
        assert_eq!(expected.tags, got.tags);
        assert!(got.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_create_then_find_round_trip() {
        let store = store();
        let ctx = RequestContext::background();
        let d = draft("Batman");

        let created = store.create(&ctx, d.clone()).await.unwrap();
        assert_client_fields(&d, &created);
        assert_eq!(created.created_at, created.updated_at);

        let found = store.find_by_id(&ctx, created.id).await.unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_create_keeps_client_created_at() {
        let store = store();
        let ctx = RequestContext::background();
        let created_at = DateTime::parse_from_rfc3339("2026-01-30T18:35:43+05:30")
            .unwrap()
            .with_timezone(&Utc);
        let mut d = draft("Batman");
        d.created_at = Some(created_at);

        let created = store.create(&ctx, d).await.unwrap();
        assert_eq!(created.created_at, created_at);
        assert!(created.updated_at >= created.created_at);
    }

    #[tokio::test]
    async fn test_create_missing_author_is_internal() {
        let store = store();
        let result = store.create(&RequestContext::background(), draft("")).await;
        assert!(matches!(result, Err(StoreError::Internal(msg)) if msg.contains("CHECK")));
    }

    #[tokio::test]
    async fn test_find_all_returns_live_records_in_order() {
        let store = store();
        let ctx = RequestContext::background();

        assert!(store.find_all(&ctx).await.unwrap().is_empty());

        let batman = store.create(&ctx, draft("Batman")).await.unwrap();
        let superman = store.create(&ctx, draft("Superman")).await.unwrap();
        let joker = store.create(&ctx, draft("Joker")).await.unwrap();
        store.delete_by_id(&ctx, joker.id).await.unwrap();

        let all = store.find_all(&ctx).await.unwrap();
        assert_eq!(all, vec![batman, superman]);
    }

    #[tokio::test]
    async fn test_find_by_id_missing_is_not_found() {
        let store = store();
        let result = store
            .find_by_id(&RequestContext::background(), Uuid::new_v4())
            .await;
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let store = store();
        let ctx = RequestContext::background();
        let created = store.create(&ctx, draft("Batman")).await.unwrap();

        let mut changed = draft("Bruce Wayne");
        changed.tags = vec!["dc".to_string()];
        changed.created_at = Some(created.created_at - chrono::Duration::days(30));
        store.update_by_id(&ctx, created.id, changed.clone()).await.unwrap();

        let found = store.find_by_id(&ctx, created.id).await.unwrap();
        assert_client_fields(&changed, &found);
        assert_eq!(found.id, created.id);
        assert_eq!(found.created_at, created.created_at);
        assert!(found.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn test_update_advances_past_future_created_at() {
        let store = store();
        let ctx = RequestContext::background();
        let mut d = draft("Batman");
        d.created_at = Some(Utc::now() + chrono::Duration::days(365));
        let created = store.create(&ctx, d.clone()).await.unwrap();
        assert_eq!(created.updated_at, created.created_at);

        let mut previous = created.updated_at;
        for _ in 0..3 {
            store.update_by_id(&ctx, created.id, d.clone()).await.unwrap();
            let found = store.find_by_id(&ctx, created.id).await.unwrap();
            assert!(found.updated_at > previous);
            assert!(found.created_at <= found.updated_at);
            previous = found.updated_at;
        }
    }

    #[tokio::test]
    async fn test_update_advances_past_stored_clock() {
        let store = store();
        let ctx = RequestContext::background();
        let created = store.create(&ctx, draft("Batman")).await.unwrap();

        // A row written by a process whose clock ran ahead of ours
        let ahead = Utc::now() + chrono::Duration::hours(1);
        store.db.with_conn(|conn| {
            conn.execute(
                "UPDATE news SET updated_at = ?2 WHERE id = ?1",
                params![created.id.to_string(), format_timestamp(&ahead)],
            )
            .unwrap()
        });

        let updated = store
            .update_and_fetch(&ctx, created.id, draft("Robin"))
            .await
            .unwrap();
        assert!(updated.updated_at > ahead);
    }

    #[tokio::test]
    async fn test_update_and_fetch_returns_stored_row() {
        let store = store();
        let ctx = RequestContext::background();
        let created = store.create(&ctx, draft("Batman")).await.unwrap();

        let updated = store
            .update_and_fetch(&ctx, created.id, draft("Robin"))
            .await
            .unwrap();
        assert_eq!(updated.author, "Robin");
        assert_eq!(updated, store.find_by_id(&ctx, created.id).await.unwrap());

        store.delete_by_id(&ctx, created.id).await.unwrap();
        assert_eq!(
            store.update_and_fetch(&ctx, created.id, draft("Joker")).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = store();
        let result = store
            .update_by_id(&RequestContext::background(), Uuid::new_v4(), draft("Batman"))
            .await;
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_update_deleted_is_not_found() {
        let store = store();
        let ctx = RequestContext::background();
        let created = store.create(&ctx, draft("Batman")).await.unwrap();
        store.delete_by_id(&ctx, created.id).await.unwrap();

        let result = store.update_by_id(&ctx, created.id, draft("Robin")).await;
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_soft_delete() {
        let store = store();
        let ctx = RequestContext::background();

        store.delete_by_id(&ctx, Uuid::new_v4()).await.unwrap();

        let created = store.create(&ctx, draft("Batman")).await.unwrap();
        store.delete_by_id(&ctx, created.id).await.unwrap();
        store.delete_by_id(&ctx, created.id).await.unwrap();
        assert_eq!(
            store.find_by_id(&ctx, created.id).await,
            Err(StoreError::NotFound)
        );

        // The row stays behind with its id, so the id cannot be reused
        let deleted_at: Option<String> = store.db.with_conn(|conn| {
            conn.query_row(
                "SELECT deleted_at FROM news WHERE id = ?1",
                [created.id.to_string()],
                |row| row.get(0),
            )
            .unwrap()
        });
        assert!(deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_canceled_context_fails_without_writing() {
        let store = store();
        let ctx = RequestContext::background();
        ctx.cancel();

        let result = store.create(&ctx, draft("Batman")).await;
        assert!(matches!(result, Err(StoreError::Internal(msg)) if msg.contains("canceled")));

        let all = store.find_all(&RequestContext::background()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_expired_deadline_is_internal() {
        let store = store();
        let ctx = RequestContext::background().with_timeout(Duration::ZERO);

        let result = store.find_all(&ctx).await;
        assert!(matches!(result, Err(StoreError::Internal(msg)) if msg.contains("deadline")));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_running_statement() {
        let store = store();
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(50));

        let result: StoreResult<i64> = store
            .run(&ctx, "endless", |conn| {
                conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                     SELECT COUNT(*) FROM c",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| internal("endless", e))
            })
            .await;
        assert!(matches!(result, Err(StoreError::Internal(msg)) if msg.contains("deadline")));

        // The single connection is released once the statement is interrupted
        let all = store.find_all(&RequestContext::background()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = DatabaseConfig::with_path(tmp.path().join("news.db"));
        let ctx = RequestContext::background();

        let created = {
            let db = Database::open(&config).unwrap();
            db.migrate_up().unwrap();
            SqliteNewsStore::new(db)
                .create(&ctx, draft("Batman"))
                .await
                .unwrap()
        };

        let store = SqliteNewsStore::new(Database::open(&config).unwrap());
        assert_eq!(store.find_by_id(&ctx, created.id).await.unwrap(), created);
    }
}
