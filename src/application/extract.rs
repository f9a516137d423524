//! Turning one markdown source file into an [`ArticleRecord`].

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    application::render::{RenderError, RenderRequest, RenderService},
    domain::{
        article::{ABOUT_SLUG, ArticleRecord, slug_from_path},
        error::DomainError,
        front_matter,
        metadata::{
            KEY_AUTHOR, KEY_LAYOUT, KEY_NOSTR_URL, KEY_SUMMARY, KEY_TITLE, Metadata,
            MetadataError, Resolved,
        },
    },
};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Source(#[from] DomainError),
    #[error("article `{slug}` has no metadata block")]
    MissingMetadata { slug: String },
    #[error("article `{slug}` does not declare `Draft`")]
    MissingDraft { slug: String },
    #[error("invalid metadata in `{slug}`: {source}")]
    Metadata {
        slug: String,
        #[source]
        source: MetadataError,
    },
    #[error("failed to render `{slug}`: {source}")]
    Render {
        slug: String,
        #[source]
        source: RenderError,
    },
}

/// Reads source files and resolves their metadata into records.
#[derive(Clone)]
pub struct Extractor {
    renderer: Arc<dyn RenderService>,
    site_url: String,
}

impl Extractor {
    pub fn new(renderer: Arc<dyn RenderService>, site_url: impl Into<String>) -> Self {
        Self {
            renderer,
            site_url: site_url.into(),
        }
    }

    /// Read and extract the article stored at `path`.
    pub async fn extract(&self, path: &Path) -> Result<ArticleRecord, ExtractError> {
        let slug = slug_from_path(path)?;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ExtractError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.extract_source(&slug, raw, OffsetDateTime::now_utc())
    }

    /// Extract a record from already loaded source text.
    ///
    /// `now` is the fallback publication date for articles without a usable `Date`.
    pub fn extract_source(
        &self,
        slug: &str,
        raw: String,
        now: OffsetDateTime,
    ) -> Result<ArticleRecord, ExtractError> {
        let source = front_matter::split(&raw);

        if slug == ABOUT_SLUG {
            let html = self.render(slug, source.body)?;
            return Ok(ArticleRecord::about(html, raw));
        }

        let yaml = source.metadata.ok_or_else(|| ExtractError::MissingMetadata {
            slug: slug.to_string(),
        })?;
        let metadata = Metadata::parse(yaml).map_err(|source| ExtractError::Metadata {
            slug: slug.to_string(),
            source,
        })?;

        let is_draft = match metadata.draft() {
            Ok(resolved) => report(slug, resolved),
            Err(MetadataError::MissingDraft) => {
                return Err(ExtractError::MissingDraft {
                    slug: slug.to_string(),
                });
            }
            Err(source) => {
                return Err(ExtractError::Metadata {
                    slug: slug.to_string(),
                    source,
                });
            }
        };
        let publish_date = report(slug, metadata.publish_date(now));
        let tags = report(slug, metadata.tags());
        let rendered_html = self.render(slug, source.body)?;

        Ok(ArticleRecord {
            slug: slug.to_string(),
            title: metadata.text(KEY_TITLE),
            author: metadata.text(KEY_AUTHOR),
            summary: metadata.text(KEY_SUMMARY),
            layout: metadata.text(KEY_LAYOUT),
            tags,
            image: metadata.image(&self.site_url),
            publish_date,
            is_draft,
            rendered_html,
            external_publish_marker: metadata.text(KEY_NOSTR_URL),
            raw_markdown: raw,
        })
    }

    fn render(&self, slug: &str, body: &str) -> Result<String, ExtractError> {
        self.renderer
            .render(&RenderRequest::new(slug, body))
            .map(|output| output.html)
            .map_err(|source| ExtractError::Render {
                slug: slug.to_string(),
                source,
            })
    }
}

fn report<T>(slug: &str, resolved: Resolved<T>) -> T {
    if let Some(warning) = resolved.warning {
        warn!(target = "lantern::extract", slug = slug, "{warning}");
    }
    resolved.value
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use tracing_test::traced_test;

    use super::*;
    use crate::application::render::render_service;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    fn extractor() -> Extractor {
        Extractor::new(render_service(), "https://blog.example")
    }

    #[test]
    fn resolves_every_field() {
        let raw = "---\nTitle: Hello\nAuthor: Ana\nSummary: First\nLayout: post\nTags: [a, b]\nDate: 2024-01-01\nImage: /img/cover.png\nDraft: false\n---\n# Hi\n";
        let record = extractor()
            .extract_source("hello", raw.to_string(), NOW)
            .expect("extract");

        assert_eq!(record.slug, "hello");
        assert_eq!(record.title, "Hello");
        assert_eq!(record.author, "Ana");
        assert_eq!(record.summary, "First");
        assert_eq!(record.layout, "post");
        assert_eq!(record.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(record.image, "https://blog.example/img/cover.png");
        assert_eq!(record.publish_date, datetime!(2024-01-01 0:00 UTC));
        assert!(!record.is_draft);
        assert!(record.rendered_html.contains("Hi</h1>"));
        assert!(!record.rendered_html.contains("Title:"));
        assert_eq!(record.raw_markdown, raw);
        assert!(record.external_publish_marker.is_empty());
    }

    #[test]
    fn missing_draft_aborts_extraction() {
        let raw = "---\nTitle: Hello\n---\nbody\n";
        let err = extractor()
            .extract_source("hello", raw.to_string(), NOW)
            .expect_err("missing draft");
        assert!(matches!(err, ExtractError::MissingDraft { .. }));
    }

    #[test]
    fn unparsable_draft_is_treated_as_draft() {
        let raw = "---\nDraft: maybe\n---\nbody\n";
        let record = extractor()
            .extract_source("hello", raw.to_string(), NOW)
            .expect("extract");
        assert!(record.is_draft);
    }

    #[test]
    #[traced_test]
    fn missing_date_falls_back_to_now() {
        let raw = "---\nDraft: true\nDate: yesterday\n---\nbody\n";
        let record = extractor()
            .extract_source("hello", raw.to_string(), NOW)
            .expect("extract");
        assert_eq!(record.publish_date, NOW);
        assert!(logs_contain("publication date `yesterday`"));
    }

    #[test]
    fn about_bypasses_metadata() {
        let raw = "# About me\n";
        let record = extractor()
            .extract_source(ABOUT_SLUG, raw.to_string(), NOW)
            .expect("extract");
        assert!(record.is_about());
        assert!(record.title.is_empty());
        assert!(record.rendered_html.contains("About me"));
        assert_eq!(record.raw_markdown, raw);
    }

    #[test]
    fn articles_without_a_block_are_rejected() {
        let err = extractor()
            .extract_source("hello", "just text".to_string(), NOW)
            .expect_err("no metadata");
        assert!(matches!(err, ExtractError::MissingMetadata { .. }));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let raw = "---\nDraft: [unclosed\n---\nbody\n";
        let err = extractor()
            .extract_source("hello", raw.to_string(), NOW)
            .expect_err("bad yaml");
        assert!(matches!(err, ExtractError::Metadata { .. }));
    }

    #[tokio::test]
    async fn extract_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.md");
        tokio::fs::write(&path, "---\nDraft: false\nTitle: From disk\n---\nbody\n")
            .await
            .expect("write");

        let record = extractor().extract(&path).await.expect("extract");
        assert_eq!(record.slug, "hello");
        assert_eq!(record.title, "From disk");
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = extractor()
            .extract(&dir.path().join("gone.md"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, ExtractError::Read { .. }));
    }
}
