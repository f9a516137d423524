//! Static HTML pages written next to the article sources.

use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};

use askama::Template;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::SiteSettings,
    domain::article::ArticleRecord,
    presentation::views::{PostTemplate, SiteView},
};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to render artifact for `{slug}`: {source}")]
    Render {
        slug: String,
        #[source]
        source: askama::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove `{path}`: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ArtifactGenerator {
    dir: PathBuf,
    site: SiteSettings,
}

impl ArtifactGenerator {
    pub fn new(dir: impl Into<PathBuf>, site: SiteSettings) -> Self {
        Self {
            dir: dir.into(),
            site,
        }
    }

    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.html"))
    }

    /// Render the record through the post template and overwrite its page.
    pub async fn write(&self, record: &ArticleRecord) -> Result<PathBuf, ArtifactError> {
        let html = PostTemplate::for_record(SiteView::from(&self.site), record)
            .render()
            .map_err(|source| ArtifactError::Render {
                slug: record.slug.clone(),
                source,
            })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ArtifactError::Write {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path_for(&record.slug);
        tokio::fs::write(&path, html)
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(
            target = "lantern::artifacts",
            slug = %record.slug,
            path = %path.display(),
            "Static page written"
        );
        Ok(path)
    }

    /// Delete a page. Returns `false` when there was nothing to delete.
    pub async fn remove(&self, slug: &str) -> Result<bool, ArtifactError> {
        let path = self.path_for(slug);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ArtifactError::Remove { path, source }),
        }
    }
}
