//! Aggregated syndication feed.
//!
//! The feed is rebuilt wholesale from the content index after every change
//! and persisted under its own key, so request handlers only ever load one
//! finished document.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    config::SiteSettings,
    domain::article::{ArticleRecord, sort_newest_first},
    infra::index::{ContentIndex, IndexError},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub items: Vec<FeedItem>,
}

impl Default for FeedDocument {
    fn default() -> Self {
        Self {
            title: String::new(),
            link: String::new(),
            description: String::new(),
            author: String::new(),
            created: OffsetDateTime::UNIX_EPOCH,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub slug: String,
    pub title: String,
    pub link: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read articles for the feed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone)]
pub struct FeedBuilder {
    site: SiteSettings,
}

impl FeedBuilder {
    pub fn new(site: SiteSettings) -> Self {
        Self { site }
    }

    /// Build a feed from arbitrary records. Drafts and the about page are dropped.
    ///
    /// `created` is the newest item's date so that an unchanged article set
    /// produces an identical document; an empty feed uses `now`.
    pub fn build(&self, records: Vec<ArticleRecord>, now: OffsetDateTime) -> FeedDocument {
        let mut public: Vec<_> = records
            .into_iter()
            .filter(|record| !record.is_draft && !record.is_about())
            .collect();
        sort_newest_first(&mut public);

        let base = self.site.url.as_str();
        let items: Vec<FeedItem> = public
            .into_iter()
            .map(|record| FeedItem {
                link: format!("{base}/p/{}", record.slug),
                slug: record.slug,
                title: record.title,
                description: record.summary,
                created: record.publish_date,
            })
            .collect();

        FeedDocument {
            title: self.site.title.clone(),
            link: format!("{base}/rss"),
            description: self.site.description.clone().unwrap_or_default(),
            author: self.site.title.clone(),
            created: items.first().map(|item| item.created).unwrap_or(now),
            items,
        }
    }

    /// Rebuild the feed from the index and persist it.
    pub fn rebuild(&self, index: &ContentIndex) -> Result<FeedDocument, FeedError> {
        let feed = self.build(index.list_all()?, OffsetDateTime::now_utc());
        index.put_feed(&feed)?;
        tracing::debug!(
            target = "lantern::feed",
            items = feed.items.len(),
            "Feed rebuilt"
        );
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn site() -> SiteSettings {
        SiteSettings {
            title: "Lantern".to_string(),
            description: Some("Notes".to_string()),
            url: "https://blog.example".to_string(),
            keywords: String::new(),
            analytics: None,
        }
    }

    fn record(slug: &str, date: OffsetDateTime, is_draft: bool) -> ArticleRecord {
        ArticleRecord {
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            author: "ana".to_string(),
            summary: format!("about {slug}"),
            layout: String::new(),
            tags: Vec::new(),
            image: String::new(),
            publish_date: date,
            is_draft,
            rendered_html: String::new(),
            raw_markdown: String::new(),
            external_publish_marker: String::new(),
        }
    }

    #[test]
    fn drops_drafts_and_sorts_newest_first() {
        let builder = FeedBuilder::new(site());
        let feed = builder.build(
            vec![
                record("old", datetime!(2023-01-01 0:00 UTC), false),
                record("secret", datetime!(2025-01-01 0:00 UTC), true),
                record("new", datetime!(2024-06-01 0:00 UTC), false),
            ],
            datetime!(2026-01-01 0:00 UTC),
        );

        let slugs: Vec<_> = feed.items.iter().map(|item| item.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "old"]);
        assert_eq!(feed.created, datetime!(2024-06-01 0:00 UTC));
    }

    #[test]
    fn links_hang_off_the_site_url() {
        let builder = FeedBuilder::new(site());
        let feed = builder.build(
            vec![record("hello", datetime!(2024-01-01 0:00 UTC), false)],
            datetime!(2026-01-01 0:00 UTC),
        );

        assert_eq!(feed.link, "https://blog.example/rss");
        assert_eq!(feed.items[0].link, "https://blog.example/p/hello");
        assert_eq!(feed.items[0].description, "about hello");
        assert_eq!(feed.description, "Notes");
    }

    #[test]
    fn empty_feed_is_stamped_with_now() {
        let builder = FeedBuilder::new(site());
        let now = datetime!(2026-01-01 0:00 UTC);
        let feed = builder.build(Vec::new(), now);
        assert!(feed.items.is_empty());
        assert_eq!(feed.created, now);
    }

    #[test]
    fn rebuild_persists_the_document() {
        let index = ContentIndex::in_memory().expect("index");
        index
            .put(&record("hello", datetime!(2024-01-01 0:00 UTC), false))
            .expect("put");

        let builder = FeedBuilder::new(site());
        let feed = builder.rebuild(&index).expect("rebuild");

        assert_eq!(index.get_feed().expect("get feed"), Some(feed));
    }
}
