use std::{
    io::ErrorKind,
    path::{Component, PathBuf},
    sync::Arc,
};

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::error;

use crate::{
    application::{
        engine::{Engine, EngineError},
        error::HttpError,
        syndication,
    },
    domain::{article::RecordFilter, error::DomainError},
    presentation::views::{
        AboutTemplate, AboutView, IndexTemplate, LayoutContext, ListingContext, PageMetaView,
        PostTemplate, SiteView, render_not_found_response, render_template_response,
    },
};

use super::middleware::track_requests;

#[derive(Clone)]
pub struct HttpState {
    pub engine: Arc<Engine>,
    pub static_dir: PathBuf,
}

impl HttpState {
    fn site(&self) -> SiteView {
        SiteView::from(self.engine.site())
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/p/{slug}", get(post_detail))
        .route("/p/{slug}/raw", get(post_raw))
        .route("/t/{tag}", get(tag_index))
        .route("/about", get(about))
        .route("/rss", get(rss_feed))
        .route("/atom", get(atom_feed))
        .route("/json", get(json_feed))
        .route("/static/{*path}", get(serve_static))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(track_requests))
}

async fn index(State(state): State<HttpState>) -> Response {
    let site = state.site();
    match state.engine.list_records(&RecordFilter::public()) {
        Ok(records) => {
            let meta = PageMetaView::for_site(&site);
            let content = ListingContext::new(None, &records);
            let view = LayoutContext::new(site, meta, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn tag_index(State(state): State<HttpState>, Path(tag): Path<String>) -> Response {
    let site = state.site();
    match state.engine.list_records(&RecordFilter::tagged(tag.clone())) {
        Ok(records) => {
            let canonical = canonical_url(&site.url, &format!("/t/{tag}"));
            let meta = PageMetaView::for_site(&site).with_canonical(canonical);
            let content = ListingContext::new(Some(tag), &records);
            let view = LayoutContext::new(site, meta, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_detail(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    let site = state.site();
    match state.engine.get_record(&slug) {
        Ok(record) => {
            render_template_response(PostTemplate::for_record(site, &record), StatusCode::OK)
        }
        Err(err) => engine_error_to_response(err, site),
    }
}

async fn post_raw(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    match state.engine.get_record(&slug) {
        Ok(record) => markdown_response(record.raw_markdown),
        Err(err) => engine_error_to_response(err, state.site()),
    }
}

async fn about(State(state): State<HttpState>) -> Response {
    let site = state.site();
    match state.engine.about() {
        Some(record) => {
            let canonical = canonical_url(&site.url, "/about");
            let meta = PageMetaView::for_site(&site).with_canonical(canonical);
            let content = AboutView {
                content_html: record.rendered_html,
            };
            let view = LayoutContext::new(site, meta, content);
            render_template_response(AboutTemplate { view }, StatusCode::OK)
        }
        None => render_not_found_response(site),
    }
}

async fn rss_feed(State(state): State<HttpState>) -> Response {
    match state.engine.get_feed_document() {
        Ok(feed) => feed_response(syndication::rss(&feed), "application/rss+xml"),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn atom_feed(State(state): State<HttpState>) -> Response {
    match state.engine.get_feed_document() {
        Ok(feed) => feed_response(syndication::atom(&feed), "application/atom+xml"),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn json_feed(State(state): State<HttpState>) -> Response {
    const SOURCE: &str = "infra::http::public::json_feed";

    let feed = match state.engine.get_feed_document() {
        Ok(feed) => feed,
        Err(err) => return HttpError::from(err).into_response(),
    };
    match syndication::json_feed(&feed) {
        Ok(body) => feed_response(body, "application/feed+json"),
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate JSON feed",
            &err,
        )
        .into_response(),
    }
}

async fn serve_static(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_static";

    let Some(relative) = sanitize_static_path(&path) else {
        return HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "rejected static path outside the static directory",
        )
        .into_response();
    };

    match tokio::fs::read(state.static_dir.join(&relative)).await {
        Ok(bytes) => build_static_response(&path, bytes),
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
            HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "File not found",
                "The requested file is not available",
            )
            .into_response()
        }
        Err(err) => {
            error!(
                target = "lantern::http::static",
                path = %path,
                error = %err,
                "failed to read static file"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read file",
                &err,
            )
            .into_response()
        }
    }
}

async fn fallback(State(state): State<HttpState>) -> Response {
    render_not_found_response(state.site())
}

/// Keep only plain path segments so lookups stay under the static directory.
fn sanitize_static_path(raw: &str) -> Option<PathBuf> {
    let candidate = std::path::Path::new(raw);
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn engine_error_to_response(err: EngineError, site: SiteView) -> Response {
    match err {
        EngineError::Domain(DomainError::ArticleNotFound { .. }) => {
            render_not_found_response(site)
        }
        err => HttpError::from(err).into_response(),
    }
}

fn build_static_response(path: &str, bytes: Vec<u8>) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));

    response
}

pub(crate) fn canonical_url(base: &str, path: &str) -> String {
    let root = base.trim_end_matches('/');
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        format!("{root}/")
    } else {
        format!("{root}/{trimmed}")
    }
}

fn feed_response(body: String, content_type: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn markdown_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/markdown; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
