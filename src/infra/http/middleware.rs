use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request data shared with handlers through request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Route template that matched, `None` for the fallback.
    pub route: Option<String>,
}

impl RequestContext {
    /// Slug named by an article route, if this request hit one.
    pub fn slug<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self.route.as_deref() {
            Some("/p/{slug}") | Some("/p/{slug}/raw") => path
                .strip_prefix("/p/")
                .and_then(|rest| rest.split('/').next())
                .filter(|slug| !slug.is_empty()),
            _ => None,
        }
    }
}

/// Tag each request with an id, echo it back in `x-request-id` and log failed responses.
///
/// Missing articles are ordinary traffic and only logged at debug level.
pub async fn track_requests(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        route: request
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string()),
    };
    request.extensions_mut().insert(ctx.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let elapsed_ms = start.elapsed().as_millis();
    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("router", Vec::new()),
    };
    let detail = messages.first().map(String::as_str).unwrap_or("none");
    let route = ctx.route.as_deref().unwrap_or("fallback");
    let slug = ctx.slug(&path).unwrap_or_default();

    if status.is_server_error() {
        error!(
            target = "lantern::http::response",
            status = status.as_u16(),
            method = %method,
            route,
            path = %path,
            slug,
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = %ctx.request_id,
            "request failed",
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            target = "lantern::http::response",
            method = %method,
            route,
            path = %path,
            slug,
            request_id = %ctx.request_id,
            "not found",
        );
    } else {
        warn!(
            target = "lantern::http::response",
            status = status.as_u16(),
            method = %method,
            route,
            path = %path,
            slug,
            elapsed_ms,
            source,
            detail,
            request_id = %ctx.request_id,
            "client request error",
        );
    }

    response
}
