use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use super::flow::{self, NoBody, NoId, Outcome, RawRequest};
use super::AppState;
use crate::model::{ArticleDraft, NewsList};
use crate::store::NewsStorer;

/// POST /news
pub async fn create_news<S: NewsStorer>(
    State(state): State<AppState<S>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let store = Arc::clone(&state.store);
    flow::run(
        state.request_context(),
        "create_news",
        RawRequest::new().with_body_result(body),
        move |ctx, NoId, draft: ArticleDraft| async move {
            let article = store.create(&ctx, draft).await?;
            Ok(Outcome::Created(article))
        },
    )
    .await
}

/// GET /news
pub async fn list_news<S: NewsStorer>(State(state): State<AppState<S>>) -> Response {
    let store = Arc::clone(&state.store);
    flow::run(
        state.request_context(),
        "list_news",
        RawRequest::new(),
        move |ctx, NoId, NoBody| async move {
            let news = store.find_all(&ctx).await?;
            Ok(Outcome::Ok(NewsList { news }))
        },
    )
    .await
}

/// GET /news/{news_id}
pub async fn get_news<S: NewsStorer>(
    State(state): State<AppState<S>>,
    Path(news_id): Path<String>,
) -> Response {
    let store = Arc::clone(&state.store);
    flow::run(
        state.request_context(),
        "get_news",
        RawRequest::new().with_id(news_id),
        move |ctx, id: Uuid, NoBody| async move {
            let article = store.find_by_id(&ctx, id).await?;
            Ok(Outcome::Ok(article))
        },
    )
    .await
}

/// PUT /news/{news_id}; answers with the record as stored after the update
pub async fn update_news<S: NewsStorer>(
    State(state): State<AppState<S>>,
    Path(news_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let store = Arc::clone(&state.store);
    flow::run(
        state.request_context(),
        "update_news",
        RawRequest::new().with_id(news_id).with_body_result(body),
        move |ctx, id: Uuid, draft: ArticleDraft| async move {
            let article = store.update_and_fetch(&ctx, id, draft).await?;
            Ok(Outcome::Ok(article))
        },
    )
    .await
}

/// DELETE /news/{news_id}
pub async fn delete_news<S: NewsStorer>(
    State(state): State<AppState<S>>,
    Path(news_id): Path<String>,
) -> Response {
    let store = Arc::clone(&state.store);
    flow::run(
        state.request_context(),
        "delete_news",
        RawRequest::new().with_id(news_id),
        move |ctx, id: Uuid, NoBody| async move {
            store.delete_by_id(&ctx, id).await?;
            Ok(Outcome::<()>::NoContent)
        },
    )
    .await
}
