use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};

use crate::{
    application::error::{ErrorReport, HttpError},
    config::SiteSettings,
    domain::article::{ArticleRecord, PublishMarker},
};

const WORDS_PER_MINUTE: usize = 225;
const EXCERPT_CHARS: usize = 250;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(site: SiteView) -> Response {
    let meta = PageMetaView::for_site(&site);
    let view = LayoutContext::new(site, meta, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Site-wide values shared by every page.
#[derive(Clone)]
pub struct SiteView {
    pub title: String,
    pub description: String,
    pub url: String,
    pub keywords: String,
    pub analytics: Option<String>,
}

impl From<&SiteSettings> for SiteView {
    fn from(site: &SiteSettings) -> Self {
        Self {
            title: site.title.clone(),
            description: site.description.clone().unwrap_or_default(),
            url: site.url.clone(),
            keywords: site.keywords.clone(),
            analytics: site.analytics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
    pub image: String,
    pub canonical: String,
}

impl PageMetaView {
    pub fn for_site(site: &SiteView) -> Self {
        Self {
            title: site.title.clone(),
            description: site.description.clone(),
            image: String::new(),
            canonical: format!("{}/", site.url),
        }
    }

    pub fn with_canonical(self, canonical: String) -> Self {
        Self { canonical, ..self }
    }
}

pub struct LayoutContext<T> {
    pub site: SiteView,
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(site: SiteView, meta: PageMetaView, content: T) -> Self {
        Self {
            site,
            meta,
            content,
        }
    }
}

#[derive(Clone)]
pub struct TagBadge {
    pub value: String,
    pub label: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub published: String,
    pub read_minutes: usize,
    pub badges: Vec<TagBadge>,
}

impl From<&ArticleRecord> for PostCard {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            slug: record.slug.clone(),
            title: record.title.clone(),
            excerpt: truncate(&record.summary, EXCERPT_CHARS),
            published: date_string(record.publish_date),
            read_minutes: read_time(&record.raw_markdown),
            badges: build_tag_badges(&record.tags),
        }
    }
}

pub struct ListingContext {
    /// Tag the listing is filtered by, if any.
    pub tag: Option<String>,
    pub posts: Vec<PostCard>,
    pub has_results: bool,
}

impl ListingContext {
    pub fn new(tag: Option<String>, records: &[ArticleRecord]) -> Self {
        let posts: Vec<PostCard> = records.iter().map(PostCard::from).collect();
        Self {
            tag,
            has_results: !posts.is_empty(),
            posts,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<ListingContext>,
}

pub struct PostDetailContext {
    pub slug: String,
    pub title: String,
    pub author: String,
    pub published: String,
    pub iso_date: String,
    pub read_minutes: usize,
    pub tags: Vec<TagBadge>,
    pub image: String,
    pub content_html: String,
    pub is_draft: bool,
    /// Reader link recorded after a successful relay publication.
    pub nostr_url: Option<String>,
}

impl From<&ArticleRecord> for PostDetailContext {
    fn from(record: &ArticleRecord) -> Self {
        let nostr_url = match record.publish_marker() {
            PublishMarker::Published(url) => Some(url.to_string()),
            PublishMarker::Pending | PublishMarker::Suppressed => None,
        };
        Self {
            slug: record.slug.clone(),
            title: record.title.clone(),
            author: record.author.clone(),
            published: date_string(record.publish_date),
            iso_date: iso_date(record.publish_date),
            read_minutes: read_time(&record.raw_markdown),
            tags: build_tag_badges(&record.tags),
            image: record.image.clone(),
            content_html: record.rendered_html.clone(),
            is_draft: record.is_draft,
            nostr_url,
        }
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

impl PostTemplate {
    /// Full page for one article, also used for the static artifact.
    pub fn for_record(site: SiteView, record: &ArticleRecord) -> Self {
        let meta = PageMetaView {
            title: format!("{} | {}", record.title, site.title),
            description: record.summary.clone(),
            image: record.image.clone(),
            canonical: format!("{}/p/{}", site.url, record.slug),
        };
        Self {
            view: LayoutContext::new(site, meta, PostDetailContext::from(record)),
        }
    }
}

pub struct AboutView {
    pub content_html: String,
}

#[derive(Template)]
#[template(path = "about.html")]
pub struct AboutTemplate {
    pub view: LayoutContext<AboutView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn build_tag_badges(tags: &[String]) -> Vec<TagBadge> {
    tags.iter()
        .map(|tag| TagBadge {
            value: tag.clone(),
            label: format!("#{tag}"),
            href: format!("/t/{tag}"),
        })
        .collect()
}

/// Whole minutes needed to read `text`, rounded up.
pub fn read_time(text: &str) -> usize {
    text.split_whitespace().count().div_ceil(WORDS_PER_MINUTE)
}

pub fn date_string(moment: OffsetDateTime) -> String {
    moment
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

fn iso_date(moment: OffsetDateTime) -> String {
    moment
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Cut `text` to at most `limit` characters.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn site() -> SiteView {
        SiteView {
            title: "Lantern".to_string(),
            description: "Notes".to_string(),
            url: "https://blog.example".to_string(),
            keywords: "blog".to_string(),
            analytics: None,
        }
    }

    fn record() -> ArticleRecord {
        ArticleRecord {
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            author: "Ana".to_string(),
            summary: "First post".to_string(),
            layout: String::new(),
            tags: vec!["rust".to_string()],
            image: String::new(),
            publish_date: datetime!(2024-01-01 0:00 UTC),
            is_draft: false,
            rendered_html: "<p>Body</p>".to_string(),
            raw_markdown: "Body".to_string(),
            external_publish_marker: String::new(),
        }
    }

    #[test]
    fn read_time_rounds_up() {
        assert_eq!(read_time(""), 0);
        assert_eq!(read_time("one"), 1);
        let words = vec!["w"; 226].join(" ");
        assert_eq!(read_time(&words), 2);
    }

    #[test]
    fn dates_render_as_calendar_days() {
        assert_eq!(date_string(datetime!(2024-03-09 17:45 UTC)), "2024-03-09");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 250), "short");
    }

    #[test]
    fn post_page_embeds_the_rendered_body() {
        let html = PostTemplate::for_record(site(), &record())
            .render()
            .expect("render");
        assert!(html.contains("<p>Body</p>"));
        assert!(html.contains("https://blog.example/p/hello"));
        assert!(html.contains("/t/rust"));
    }

    #[test]
    fn published_marker_links_to_the_reader() {
        let mut published = record();
        published.external_publish_marker = "https://habla.news/a/naddr1xyz".to_string();
        let html = PostTemplate::for_record(site(), &published)
            .render()
            .expect("render");
        assert!(html.contains("https://habla.news/a/naddr1xyz"));
    }
}
