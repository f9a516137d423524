//! Read-side facade over the synchronized content, shared with request handlers.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::oneshot;

use crate::{
    application::{
        feed::{FeedBuilder, FeedDocument},
        reconcile::{AboutSlot, MetadataWriteError},
        watch::{ChangeEvent, ChangeSender},
    },
    config::SiteSettings,
    domain::{
        article::{ArticleRecord, RecordFilter, sort_newest_first},
        error::DomainError,
    },
    infra::index::{ContentIndex, IndexError},
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    MetadataWrite(#[from] MetadataWriteError),
    #[error("the change loop is not running")]
    LoopStopped,
}

#[derive(Clone)]
pub struct Engine {
    index: Arc<ContentIndex>,
    about: AboutSlot,
    site: SiteSettings,
    changes: ChangeSender,
}

impl Engine {
    pub fn new(
        index: Arc<ContentIndex>,
        about: AboutSlot,
        site: SiteSettings,
        changes: ChangeSender,
    ) -> Self {
        Self {
            index,
            about,
            site,
            changes,
        }
    }

    pub fn site(&self) -> &SiteSettings {
        &self.site
    }

    /// Any indexed record, drafts included.
    pub fn get_record(&self, slug: &str) -> Result<ArticleRecord, EngineError> {
        self.index
            .get(slug)?
            .ok_or_else(|| DomainError::article_not_found(slug).into())
    }

    /// Records matching `filter`, newest first.
    pub fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ArticleRecord>, EngineError> {
        let mut records: Vec<_> = self
            .index
            .list_all()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// The persisted feed, or an empty one before the first reconciliation.
    pub fn get_feed_document(&self) -> Result<FeedDocument, EngineError> {
        match self.index.get_feed()? {
            Some(feed) => Ok(feed),
            None => {
                let builder = FeedBuilder::new(self.site.clone());
                Ok(builder.build(Vec::new(), OffsetDateTime::now_utc()))
            }
        }
    }

    pub fn about(&self) -> Option<ArticleRecord> {
        self.about.get()
    }

    /// Rewrite one metadata field of an article through the change loop and
    /// wait until the article has been reconciled.
    pub async fn add_metadata_field(
        &self,
        slug: &str,
        key: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        let (reply, outcome) = oneshot::channel();
        self.changes
            .send(ChangeEvent::SetMetadata {
                slug: slug.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                reply: Some(reply),
            })
            .await
            .map_err(|_| EngineError::LoopStopped)?;
        outcome.await.map_err(|_| EngineError::LoopStopped)??;
        Ok(())
    }
}
