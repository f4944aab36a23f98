//! Router assembly.
//!
//! Layer order, outermost first: panic recovery, body limit, request id,
//! tracing, CORS, admission, then the handlers. Rejected requests still get
//! a request id, a trace span and CORS headers.

use std::any::Any;

use axum::{
    Json, Router,
    body::Body,
    http::{
        self, HeaderName, HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE},
    },
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    handlers::{self, movies::EXPECTED_VERSION_HEADER},
    middleware::admission::{AdmissionGate, admit},
    state::AppState,
};

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState, gate: AdmissionGate) -> Router {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let cors = cors_layer(&state.config.cors_trusted_origins);

    Router::new()
        .merge(handlers::health::router())
        .merge(handlers::movies::router())
        .merge(handlers::users::router())
        .merge(handlers::tokens::router())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(from_fn_with_state(gate, admit))
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &http::Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
}

async fn not_found() -> AppError {
    AppError::not_found()
}

async fn method_not_allowed(method: Method) -> AppError {
    AppError::Rejected(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("the {method} method is not supported for this resource"),
    )
}

/// Only the listed origins are echoed back. An empty list disables CORS.
fn cors_layer(trusted: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring unparseable trusted origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::OPTIONS,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(EXPECTED_VERSION_HEADER),
        ])
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("handler panicked: {detail}");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "the server encountered a problem and could not process your request"
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
