//! The article record and the rules that hang off it.
//!
//! A record is derived entirely from one markdown source file. Its slug is the
//! file stem and never changes; renaming a file removes one record and creates
//! another.

use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{error::DomainError, metadata::parse_bool};

/// Slug of the singleton page that lives only in memory.
pub const ABOUT_SLUG: &str = "about";

/// File extension of article sources.
pub const SOURCE_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub slug: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub layout: String,
    pub tags: Vec<String>,
    pub image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub publish_date: OffsetDateTime,
    pub is_draft: bool,
    pub rendered_html: String,
    pub raw_markdown: String,
    pub external_publish_marker: String,
}

impl ArticleRecord {
    /// Build the about page record, which carries no metadata.
    pub fn about(rendered_html: String, raw_markdown: String) -> Self {
        Self {
            slug: ABOUT_SLUG.to_string(),
            title: String::new(),
            author: String::new(),
            summary: String::new(),
            layout: String::new(),
            tags: Vec::new(),
            image: String::new(),
            publish_date: OffsetDateTime::UNIX_EPOCH,
            is_draft: false,
            rendered_html,
            raw_markdown,
            external_publish_marker: String::new(),
        }
    }

    pub fn is_about(&self) -> bool {
        self.slug == ABOUT_SLUG
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    pub fn publish_marker(&self) -> PublishMarker<'_> {
        PublishMarker::parse(&self.external_publish_marker)
    }
}

/// State of the external publication marker stored in the article metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMarker<'a> {
    /// Empty, or an explicit `true`: the article wants to be published.
    Pending,
    /// An explicit boolean false.
    Suppressed,
    /// Any other text, normally the reader URL returned by a previous publish.
    Published(&'a str),
}

impl<'a> PublishMarker<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Pending;
        }
        match parse_bool(trimmed) {
            Some(true) => Self::Pending,
            Some(false) => Self::Suppressed,
            None => Self::Published(trimmed),
        }
    }
}

/// Listing filter applied on the read path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub tag: Option<String>,
    pub include_drafts: bool,
}

impl RecordFilter {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            include_drafts: false,
        }
    }

    pub fn matches(&self, record: &ArticleRecord) -> bool {
        if record.is_draft && !self.include_drafts {
            return false;
        }
        match self.tag.as_deref() {
            Some(tag) => record.has_tag(tag),
            None => true,
        }
    }
}

/// Returns true when the path names a markdown article source.
pub fn is_article_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Whether `<slug>.md` inside the articles directory names the file `slug` came from.
///
/// Hidden names and names with surrounding whitespace are refused.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.trim() == slug
        && !slug.starts_with('.')
        && !slug.contains(['/', '\\'])
}

/// Derive the immutable slug of an article from its source path.
pub fn slug_from_path(path: &Path) -> Result<String, DomainError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| is_valid_slug(stem))
        .map(str::to_string)
        .ok_or_else(|| DomainError::invalid_source_name(path.display().to_string()))
}

/// Sort records newest first. Ties fall back to slug so listings stay stable.
pub fn sort_newest_first(records: &mut [ArticleRecord]) {
    records.sort_by(|a, b| {
        b.publish_date
            .cmp(&a.publish_date)
            .then_with(|| a.slug.cmp(&b.slug))
    });
}
