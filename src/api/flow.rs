//! The request flow shared by every endpoint.
//!
//! Each handler plugs in how to read its path id, how to read its body and
//! which store call to make; the order of the steps is fixed here:
//! decode body, validate id, validate payload, call the store, respond.
//! Nothing before the store call touches the store.

use std::future::Future;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::context::RequestContext;
use crate::model::{ArticleDraft, NewsPayload};
use crate::validator;

/// Untyped inputs pulled off the HTTP request
#[derive(Debug, Default)]
pub struct RawRequest {
    pub news_id: Option<String>,
    pub body: Option<Bytes>,
    /// Why the body could not be read at all, e.g. over the size limit
    pub body_rejection: Option<String>,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, news_id: String) -> Self {
        self.news_id = Some(news_id);
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Take the body extractor's result; a rejection fails the decode step
    pub fn with_body_result(mut self, body: Result<Bytes, BytesRejection>) -> Self {
        match body {
            Ok(body) => self.body = Some(body),
            Err(rejection) => self.body_rejection = Some(rejection.body_text()),
        }
        self
    }
}

/// How an endpoint reads its path identifier
pub trait PathId: Sized + Send {
    fn parse(raw: Option<&str>) -> ApiResult<Self>;
}

/// Route without an id
#[derive(Debug, Clone, Copy)]
pub struct NoId;

impl PathId for NoId {
    fn parse(_raw: Option<&str>) -> ApiResult<Self> {
        Ok(NoId)
    }
}

impl PathId for Uuid {
    fn parse(raw: Option<&str>) -> ApiResult<Self> {
        match raw {
            Some(raw) => Ok(validator::validate_id(raw)?),
            None => Err(ApiError::Internal("route carries no news id".to_string())),
        }
    }
}

/// How an endpoint reads and validates its body
pub trait Payload: Sized + Send {
    type Decoded: Send;

    fn decode(body: Option<&Bytes>) -> ApiResult<Self::Decoded>;

    fn validate(decoded: Self::Decoded) -> ApiResult<Self>;
}

/// Route without a body
#[derive(Debug, Clone, Copy)]
pub struct NoBody;

impl Payload for NoBody {
    type Decoded = ();

    fn decode(_body: Option<&Bytes>) -> ApiResult<Self::Decoded> {
        Ok(())
    }

    fn validate(_decoded: Self::Decoded) -> ApiResult<Self> {
        Ok(NoBody)
    }
}

impl Payload for ArticleDraft {
    type Decoded = NewsPayload;

    fn decode(body: Option<&Bytes>) -> ApiResult<Self::Decoded> {
        let bytes = body.map(|b| b.as_ref()).unwrap_or_default();
        serde_json::from_slice(bytes).map_err(|e| ApiError::InvalidBody(e.to_string()))
    }

    fn validate(decoded: Self::Decoded) -> ApiResult<Self> {
        Ok(validator::validate(&decoded)?)
    }
}

/// Successful result of the store step
#[derive(Debug)]
pub enum Outcome<T> {
    Created(T),
    Ok(T),
    NoContent,
}

/// Drive one request through the flow and render the response.
///
/// All logging happens inside the context's span.
pub async fn run<I, B, T, F, Fut>(
    ctx: RequestContext,
    op: &'static str,
    raw: RawRequest,
    call: F,
) -> Response
where
    I: PathId,
    B: Payload,
    T: Serialize,
    F: FnOnce(RequestContext, I, B) -> Fut,
    Fut: Future<Output = ApiResult<Outcome<T>>>,
{
    let span = ctx.span().clone();
    async move {
        match execute(ctx, raw, call).await {
            Ok(response) => {
                info!(operation = op, status = response.status().as_u16(), "request handled");
                response
            }
            Err(err) => {
                let status = err.status_code();
                if status.is_server_error() {
                    error!(operation = op, status = status.as_u16(), error = %err, "request failed");
                } else {
                    warn!(operation = op, status = status.as_u16(), error = %err, "request rejected");
                }
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn execute<I, B, T, F, Fut>(ctx: RequestContext, raw: RawRequest, call: F) -> ApiResult<Response>
where
    I: PathId,
    B: Payload,
    T: Serialize,
    F: FnOnce(RequestContext, I, B) -> Fut,
    Fut: Future<Output = ApiResult<Outcome<T>>>,
{
    if let Some(reason) = raw.body_rejection {
        return Err(ApiError::InvalidBody(reason));
    }
    let decoded = B::decode(raw.body.as_ref())?;
    let id = I::parse(raw.news_id.as_deref())?;
    let body = B::validate(decoded)?;
    let outcome = call(ctx, id, body).await?;
    respond(outcome)
}

fn respond<T: Serialize>(outcome: Outcome<T>) -> ApiResult<Response> {
    let (status, value) = match outcome {
        Outcome::Created(value) => (StatusCode::CREATED, value),
        Outcome::Ok(value) => (StatusCode::OK, value),
        Outcome::NoContent => return Ok(StatusCode::NO_CONTENT.into_response()),
    };

    let body = serde_json::to_vec(&value)
        .map_err(|e| ApiError::Internal(format!("serializing response: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn body(json: &str) -> RawRequest {
        RawRequest::new().with_body(Bytes::from(json.to_string()))
    }

    fn valid_json() -> String {
        serde_json::json!({
            "author": "a",
            "title": "t",
            "summary": "s",
            "content": "c",
            "source": "https://example.com",
            "createdAt": "2026-01-30T18:35:43+05:30",
            "tags": ["x"],
        })
        .to_string()
    }

    /// Runs a flow whose store step records that it was reached
    async fn run_recording<I: PathId, B: Payload>(raw: RawRequest) -> (StatusCode, bool) {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let response = run(
            RequestContext::background(),
            "test",
            raw,
            move |_ctx, _id: I, _body: B| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(Outcome::<()>::NoContent)
            },
        )
        .await;
        (response.status(), reached.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_malformed_body_stops_before_store() {
        let (status, reached) = run_recording::<NoId, ArticleDraft>(body("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!reached);
    }

    #[tokio::test]
    async fn test_missing_body_is_bad_request() {
        let (status, reached) = run_recording::<NoId, ArticleDraft>(RawRequest::new()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!reached);
    }

    #[tokio::test]
    async fn test_invalid_id_stops_before_store() {
        let (status, reached) =
            run_recording::<Uuid, NoBody>(RawRequest::new().with_id("abc".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!reached);
    }

    #[tokio::test]
    async fn test_invalid_payload_stops_before_store() {
        let (status, reached) = run_recording::<NoId, ArticleDraft>(body("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!reached);
    }

    #[tokio::test]
    async fn test_valid_request_reaches_store() {
        let raw = body(&valid_json()).with_id(Uuid::new_v4().to_string());
        let (status, reached) = run_recording::<Uuid, ArticleDraft>(raw).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(reached);
    }

    #[tokio::test]
    async fn test_decode_failure_wins_over_bad_id() {
        let raw = body("[").with_id("abc".to_string());
        let response = run(
            RequestContext::background(),
            "test",
            raw,
            |_ctx, _id: Uuid, _body: ArticleDraft| async { Ok(Outcome::<()>::NoContent) },
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("unable to decode request body"));
    }

    #[test]
    fn test_respond_created_is_json() {
        let response = respond(Outcome::Created(serde_json::json!({"id": 1}))).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_store_errors_map_to_status() {
        let not_found = ApiError::from(crate::store::StoreError::NotFound).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let internal = ApiError::from(crate::store::StoreError::internal("x")).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
