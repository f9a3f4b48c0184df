// HTTP listener: `POST /taiga` runs the update pipeline, everything else is 404.

use std::future::Future;
use std::time::Instant;

use axum::{
    body::{self, Body},
    extract::State,
    http::{header, header::HeaderValue, HeaderMap, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::UpdatePipeline;

pub const UPDATE_PATH: &str = "/taiga";

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build_router(pipeline: UpdatePipeline) -> Router {
    apply_middleware(
        Router::new()
            .route(UPDATE_PATH, post(handle_update).fallback(not_found))
            .fallback(not_found)
            .with_state(pipeline),
    )
}

/// Serve until `shutdown` resolves. Accepting stops at that point; requests
/// already accepted run to completion.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn handle_update(
    State(pipeline): State<UpdatePipeline>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    if uri.query().is_some() {
        return StatusCode::NOT_FOUND;
    }

    debug!(
        host = header_str(&headers, header::HOST),
        user_agent = header_str(&headers, header::USER_AGENT),
        "update request"
    );

    let outcome = match body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => pipeline.run(&bytes).await,
        Err(error) => Err(PipelineError::Body(error)),
    };

    match outcome {
        Ok(outcome) => {
            if let Some(push) = outcome.push {
                pipeline.pushes().track(push);
            }
            StatusCode::OK
        }
        Err(error) => {
            let status = error.status();
            if status.is_client_error() {
                warn!(stage = %error.stage(), %error, "rejected update");
            } else {
                error!(stage = %error.stage(), %error, "update failed");
            }
            status
        }
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or("")
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().clone();
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(request_id_header) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id_header);
    }

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
