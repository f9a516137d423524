//! Keeping the content index, static pages and feed in agreement with the
//! articles directory.

use std::{
    collections::BTreeSet,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use metrics::{counter, gauge};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    application::{
        artifacts::ArtifactGenerator,
        extract::{ExtractError, Extractor},
        feed::{FeedBuilder, FeedError},
        publish::PublishDispatcher,
    },
    domain::{
        article::{
            ABOUT_SLUG, ArticleRecord, SOURCE_EXTENSION, is_article_source, is_valid_slug,
            slug_from_path,
        },
        error::DomainError,
        front_matter,
        metadata::{KEY_NOSTR_URL, render_scalar},
    },
    infra::{
        index::{ContentIndex, IndexError},
        telemetry::{
            ARTICLES_LOADED_TOTAL, ARTICLES_REMOVED_TOTAL, ARTICLES_SKIPPED_TOTAL,
            INDEXED_ARTICLES,
        },
    },
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list `{path}`: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

#[derive(Debug, Error)]
pub enum MetadataWriteError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("no article source at `{path}`")]
    NotFound { path: PathBuf },
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("article rewritten but not reconciled: {0}")]
    Reconcile(#[from] ReconcileError),
}

/// Outcome of a bulk pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub loaded: usize,
    pub skipped: usize,
    pub removed: usize,
    pub publications_queued: usize,
}

/// The about page, held in memory and shared with readers.
#[derive(Debug, Clone, Default)]
pub struct AboutSlot {
    inner: Arc<RwLock<Option<ArticleRecord>>>,
}

impl AboutSlot {
    pub fn get(&self) -> Option<ArticleRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, record: Option<ArticleRecord>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = record;
    }
}

enum FileOutcome {
    Loaded { queued: bool },
    About,
    Skipped,
}

/// The only writer of the content index.
pub struct Reconciler {
    articles_dir: PathBuf,
    extractor: Extractor,
    index: Arc<ContentIndex>,
    artifacts: ArtifactGenerator,
    feed: FeedBuilder,
    about: AboutSlot,
    publisher: Option<PublishDispatcher>,
}

impl Reconciler {
    pub fn new(
        articles_dir: impl Into<PathBuf>,
        extractor: Extractor,
        index: Arc<ContentIndex>,
        artifacts: ArtifactGenerator,
        feed: FeedBuilder,
        about: AboutSlot,
    ) -> Self {
        Self {
            articles_dir: articles_dir.into(),
            extractor,
            index,
            artifacts,
            feed,
            about,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: PublishDispatcher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Reconcile every source in the articles directory, then drop index
    /// entries whose source is gone and rebuild the feed.
    pub async fn bulk_sync(&mut self) -> Result<SyncReport, ReconcileError> {
        let sources = self.list_sources().await?;
        info!(
            target = "lantern::reconcile",
            path = %self.articles_dir.display(),
            sources = sources.len(),
            "Starting full reconciliation"
        );

        let mut report = SyncReport::default();
        let mut seen = BTreeSet::new();
        let mut about_seen = false;

        for path in &sources {
            let Ok(slug) = slug_from_path(path) else {
                report.skipped += 1;
                continue;
            };
            match self.load_file(path).await? {
                FileOutcome::Loaded { queued } => {
                    report.loaded += 1;
                    report.publications_queued += usize::from(queued);
                    seen.insert(slug);
                }
                FileOutcome::About => about_seen = true,
                // A file that fails extraction keeps its previous index entry
                // until it is fixed or deleted.
                FileOutcome::Skipped => {
                    report.skipped += 1;
                    seen.insert(slug);
                }
            }
        }

        for stale in self.index.list_slugs()?.difference(&seen) {
            if self.remove_slug(stale).await {
                report.removed += 1;
            }
        }
        if !about_seen {
            self.about.set(None);
        }

        self.refresh_feed()?;
        info!(
            target = "lantern::reconcile",
            loaded = report.loaded,
            skipped = report.skipped,
            removed = report.removed,
            publications_queued = report.publications_queued,
            "Full reconciliation finished"
        );
        Ok(report)
    }

    /// Reconcile one created or modified source.
    pub async fn upsert_path(&mut self, path: &Path) -> Result<(), ReconcileError> {
        if !is_article_source(path) {
            return Ok(());
        }
        match self.load_file(path).await? {
            FileOutcome::Loaded { .. } => self.refresh_feed(),
            FileOutcome::About | FileOutcome::Skipped => Ok(()),
        }
    }

    /// Reconcile one removed source.
    pub async fn remove_path(&mut self, path: &Path) -> Result<(), ReconcileError> {
        if !is_article_source(path) {
            return Ok(());
        }
        let Ok(slug) = slug_from_path(path) else {
            return Ok(());
        };
        if slug == ABOUT_SLUG {
            self.about.set(None);
            info!(target = "lantern::reconcile", "About page removed");
            return Ok(());
        }
        self.remove_slug(&slug).await;
        self.refresh_feed()
    }

    /// Rewrite one metadata field of an article and reconcile the result.
    pub async fn set_metadata(
        &mut self,
        slug: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataWriteError> {
        let path = article_source_path(&self.articles_dir, slug)?;
        write_metadata_field(&path, key, value).await?;
        self.upsert_path(&path).await?;
        Ok(())
    }

    /// Store the marker returned by a successful relay publication in the
    /// source file the record was extracted from.
    pub async fn record_publication(
        &mut self,
        source: &Path,
        marker: &str,
    ) -> Result<(), MetadataWriteError> {
        write_metadata_field(source, KEY_NOSTR_URL, marker).await?;
        self.upsert_path(source).await?;
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<PathBuf>, ReconcileError> {
        let read_dir_error = |source: io::Error| ReconcileError::ReadDir {
            path: self.articles_dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.articles_dir)
            .await
            .map_err(read_dir_error)?;

        let mut sources = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if is_file && is_article_source(&path) {
                sources.push(path);
            }
        }
        sources.sort();
        Ok(sources)
    }

    async fn load_file(&self, path: &Path) -> Result<FileOutcome, ReconcileError> {
        let record = match self.extractor.extract(path).await {
            Ok(record) => record,
            Err(err) => {
                counter!(ARTICLES_SKIPPED_TOTAL).increment(1);
                log_skipped(path, &err);
                return Ok(FileOutcome::Skipped);
            }
        };

        if record.is_about() {
            self.about.set(Some(record));
            info!(target = "lantern::reconcile", "About page loaded");
            return Ok(FileOutcome::About);
        }

        self.index.put(&record)?;
        counter!(ARTICLES_LOADED_TOTAL).increment(1);

        if let Err(err) = self.artifacts.write(&record).await {
            warn!(
                target = "lantern::reconcile",
                slug = %record.slug,
                error = %err,
                "Failed to write static page"
            );
        }

        info!(
            target = "lantern::reconcile",
            slug = %record.slug,
            draft = record.is_draft,
            "Article loaded"
        );

        let queued = self
            .publisher
            .as_ref()
            .is_some_and(|publisher| publisher.dispatch(&record, path));
        Ok(FileOutcome::Loaded { queued })
    }

    /// Drop a slug from the index and its static page. Returns whether an index entry existed.
    async fn remove_slug(&self, slug: &str) -> bool {
        let removed = match self.index.delete(slug) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(
                    target = "lantern::reconcile",
                    slug = %slug,
                    error = %err,
                    "Failed to delete index entry; it stays until the next pass"
                );
                return false;
            }
        };

        if let Err(err) = self.artifacts.remove(slug).await {
            warn!(
                target = "lantern::reconcile",
                slug = %slug,
                error = %err,
                "Failed to delete static page"
            );
        }

        if removed {
            counter!(ARTICLES_REMOVED_TOTAL).increment(1);
            info!(target = "lantern::reconcile", slug = %slug, "Article removed");
        }
        removed
    }

    fn refresh_feed(&self) -> Result<(), ReconcileError> {
        let feed = self.feed.rebuild(&self.index)?;
        gauge!(INDEXED_ARTICLES).set(self.index.list_slugs()?.len() as f64);
        debug!(
            target = "lantern::reconcile",
            items = feed.items.len(),
            "Feed refreshed"
        );
        Ok(())
    }
}

fn log_skipped(path: &Path, err: &ExtractError) {
    warn!(
        target = "lantern::reconcile",
        path = %path.display(),
        error = %err,
        "Skipping article"
    );
}

/// Source file of `slug` inside `articles_dir`. Slugs that would escape the directory are rejected.
pub fn article_source_path(articles_dir: &Path, slug: &str) -> Result<PathBuf, DomainError> {
    if !is_valid_slug(slug) {
        return Err(DomainError::invalid_source_name(slug));
    }
    Ok(articles_dir.join(format!("{slug}.{SOURCE_EXTENSION}")))
}

/// Set `key` to `value` in the metadata block of the source at `path`.
///
/// Every other line of the file is preserved. The new contents replace the
/// file atomically.
pub async fn write_metadata_field(
    path: &Path,
    key: &str,
    value: &str,
) -> Result<(), MetadataWriteError> {
    validate_key(key)?;

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(MetadataWriteError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(MetadataWriteError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let updated = front_matter::set_field(&raw, key, &render_scalar(value));
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&target, updated.as_bytes()))
        .await
        .map_err(io::Error::other)
        .and_then(|result| result)
        .map_err(|source| MetadataWriteError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(
        target = "lantern::reconcile",
        path = %path.display(),
        key = key,
        "Metadata field written"
    );
    Ok(())
}

fn validate_key(key: &str) -> Result<(), DomainError> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.trim() != key {
        Some("key has surrounding whitespace")
    } else if key.contains([':', '\n', '\r', '#']) {
        Some("key contains a reserved character")
    } else if key.starts_with(['-', '[', '{', '\'', '"']) {
        Some("key starts with a YAML indicator")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DomainError::invalid_metadata_key(key, reason)),
        None => Ok(()),
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".lantern-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
