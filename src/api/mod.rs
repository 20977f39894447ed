//! HTTP surface: router, shared state, handlers and the server lifecycle.

pub mod error;
pub mod flow;
pub mod handlers;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info_span, Level, Span};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::store::NewsStorer;

pub use error::{ApiError, ApiResult};
pub use server::{serve, shutdown_signal};

/// Matches axum's own default
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// State shared by every handler
pub struct AppState<S> {
    pub store: Arc<S>,
    pub request_timeout: Option<Duration>,
    pub max_body_bytes: usize,
    /// Parent of every request context; canceling it aborts in-flight store calls
    pub shutdown: CancellationToken,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: NewsStorer> AppState<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            request_timeout: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Context for the request being handled; picks up the request span
    pub fn request_context(&self) -> RequestContext {
        let ctx = RequestContext::new(self.shutdown.child_token()).with_span(Span::current());
        match self.request_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }
}

pub fn router<S: NewsStorer>(state: AppState<S>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            info_span!(
                "request",
                request_id = %Uuid::new_v4(),
                method = %request.method(),
                path = %request.uri().path(),
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route(
            "/news",
            post(handlers::create_news::<S>).get(handlers::list_news::<S>),
        )
        .route(
            "/news/{news_id}",
            get(handlers::get_news::<S>)
                .put(handlers::update_news::<S>)
                .delete(handlers::delete_news::<S>),
        )
        .layer(body_limit)
        .layer(trace)
        .with_state(state)
}
