//! Idempotent publication of articles to Nostr relays.
//!
//! The external publish marker stored in each article decides whether a
//! publication is attempted. A successful publication produces a reader URL
//! that is written back into the source file, which is what keeps the next
//! reconciliation from publishing again.

use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use metrics::counter;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc::WeakSender;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    application::watch::{ChangeEvent, ChangeSender},
    config::NostrSettings,
    domain::{
        article::{ArticleRecord, PublishMarker},
        front_matter,
    },
    infra::{
        nostr::{
            DryRunTransport, KIND_LONG_FORM, KeyError, LongFormArticle, NostrKeys,
            RelayTransport, WebSocketTransport, broadcast, encode_naddr,
        },
        telemetry::{PUBLISH_ATTEMPTS_TOTAL, PUBLISH_FAILURES_TOTAL},
    },
};

const CLIENT_TAG: &str = "lantern";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no relay accepted `{slug}` ({failures} failed)")]
    NoRelayAccepted { slug: String, failures: usize },
    #[error("failed to encode the article address: {0}")]
    Address(#[from] KeyError),
}

/// Why a record is not sent to relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    About,
    Disabled,
    Draft,
    Suppressed,
    AlreadyPublished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    Attempt,
    Skip(SkipReason),
}

pub struct PublicationGateway {
    enabled: bool,
    keys: NostrKeys,
    transport: Arc<dyn RelayTransport>,
    relays: Vec<Url>,
    timeout: Duration,
    reader_url: String,
    site_url: String,
}

impl PublicationGateway {
    pub fn new(
        settings: &NostrSettings,
        site_url: impl Into<String>,
        keys: NostrKeys,
        transport: Arc<dyn RelayTransport>,
    ) -> Self {
        Self {
            enabled: settings.enabled,
            keys,
            transport,
            relays: settings.relays.clone(),
            timeout: settings.timeout,
            reader_url: settings.reader_url.clone(),
            site_url: site_url.into(),
        }
    }

    /// Gateway using the network transport, or the dry-run one when configured.
    pub fn with_default_transport(
        settings: &NostrSettings,
        site_url: impl Into<String>,
        keys: NostrKeys,
    ) -> Self {
        let transport: Arc<dyn RelayTransport> = if settings.dry_run {
            Arc::new(DryRunTransport)
        } else {
            Arc::new(WebSocketTransport)
        };
        Self::new(settings, site_url, keys, transport)
    }

    pub fn decide(&self, record: &ArticleRecord) -> PublishDecision {
        if record.is_about() {
            return PublishDecision::Skip(SkipReason::About);
        }
        if !self.enabled {
            return PublishDecision::Skip(SkipReason::Disabled);
        }
        if record.is_draft {
            return PublishDecision::Skip(SkipReason::Draft);
        }
        match record.publish_marker() {
            PublishMarker::Pending => PublishDecision::Attempt,
            PublishMarker::Suppressed => PublishDecision::Skip(SkipReason::Suppressed),
            PublishMarker::Published(_) => PublishDecision::Skip(SkipReason::AlreadyPublished),
        }
    }

    /// Broadcast the record and return the marker to store in its metadata.
    pub async fn publish(&self, record: &ArticleRecord) -> Result<String, PublishError> {
        counter!(PUBLISH_ATTEMPTS_TOTAL).increment(1);

        let identifier = article_identifier(record);
        let content = self.event_content(record);
        let event = LongFormArticle {
            identifier: &identifier,
            title: &record.title,
            client: CLIENT_TAG,
            topics: &record.tags,
            content,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
        .into_event(&self.keys);
        debug!(
            target = "lantern::publish",
            slug = %record.slug,
            event_id = %event.id,
            "Broadcasting article"
        );

        let report = broadcast(self.transport.as_ref(), &self.relays, &event, self.timeout).await;
        if !report.any_accepted() {
            counter!(PUBLISH_FAILURES_TOTAL).increment(1);
            return Err(PublishError::NoRelayAccepted {
                slug: record.slug.clone(),
                failures: report.failed.len(),
            });
        }

        let naddr = encode_naddr(&identifier, self.keys.public_key(), KIND_LONG_FORM)?;
        Ok(format!("{}{naddr}", self.reader_url))
    }

    /// Article body without its metadata block, led by a link to the original.
    pub fn event_content(&self, record: &ArticleRecord) -> String {
        let body = front_matter::split(&record.raw_markdown).body;
        format!(
            "> [Read the original blog post]({}/p/{})\n\n{}",
            self.site_url, record.slug, body
        )
    }
}

/// Stable `d` tag value: the same title and author always address the same event.
pub fn article_identifier(record: &ArticleRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.title.as_bytes());
    hasher.update(record.author.as_bytes());
    hex::encode(hasher.finalize())
}

/// Slugs that currently have a publication running.
#[derive(Default, Clone)]
pub struct InFlightPublications {
    slugs: Arc<DashMap<String, ()>>,
}

impl InFlightPublications {
    pub fn new() -> Self {
        Self {
            slugs: Arc::new(DashMap::new()),
        }
    }

    /// Claim a slug. `None` while another publication of it is running.
    pub fn acquire(&self, slug: &str) -> Option<PublishGuard> {
        match self.slugs.entry(slug.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(PublishGuard {
                    slug: slug.to_string(),
                    slugs: Arc::clone(&self.slugs),
                })
            }
            Entry::Occupied(_) => None,
        }
    }

    pub fn is_running(&self, slug: &str) -> bool {
        self.slugs.contains_key(slug)
    }
}

/// Releases the slug when dropped.
pub struct PublishGuard {
    slug: String,
    slugs: Arc<DashMap<String, ()>>,
}

impl PublishGuard {
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl std::fmt::Debug for PublishGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublishGuard").field(&self.slug).finish()
    }
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        self.slugs.remove(&self.slug);
    }
}

/// Runs publications off the writer task and routes their results back to it.
///
/// The dispatcher lives inside the reconciler that drains the change channel,
/// so it only holds a weak sender: the loop still ends once every other
/// sender is gone.
#[derive(Clone)]
pub struct PublishDispatcher {
    gateway: Arc<PublicationGateway>,
    in_flight: InFlightPublications,
    events: WeakSender<ChangeEvent>,
}

impl PublishDispatcher {
    pub fn new(gateway: Arc<PublicationGateway>, events: &ChangeSender) -> Self {
        Self {
            gateway,
            in_flight: InFlightPublications::new(),
            events: events.downgrade(),
        }
    }

    pub fn in_flight(&self) -> &InFlightPublications {
        &self.in_flight
    }

    /// Start a publication when the record calls for one. Returns whether a task was spawned.
    ///
    /// On success the marker is routed back with `source`, the file the record was read from.
    pub fn dispatch(&self, record: &ArticleRecord, source: &Path) -> bool {
        match self.gateway.decide(record) {
            PublishDecision::Attempt => {}
            PublishDecision::Skip(reason) => {
                debug!(
                    target = "lantern::publish",
                    slug = %record.slug,
                    reason = ?reason,
                    "Not publishing"
                );
                return false;
            }
        }

        let Some(guard) = self.in_flight.acquire(&record.slug) else {
            debug!(
                target = "lantern::publish",
                slug = %record.slug,
                "Publication already in flight"
            );
            return false;
        };

        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        let record = record.clone();
        let source = source.to_path_buf();
        tokio::spawn(async move {
            match gateway.publish(&record).await {
                Ok(marker) => {
                    info!(
                        target = "lantern::publish",
                        slug = %record.slug,
                        marker = %marker,
                        "Article published"
                    );
                    let event = ChangeEvent::Published {
                        source,
                        marker,
                        guard,
                    };
                    let delivered = match events.upgrade() {
                        Some(sender) => sender.send(event).await.is_ok(),
                        None => false,
                    };
                    if !delivered {
                        warn!(
                            target = "lantern::publish",
                            slug = %record.slug,
                            "Change channel closed; publish marker not recorded"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        target = "lantern::publish",
                        slug = %record.slug,
                        error = %err,
                        "Publication failed; will retry on the next reconciliation"
                    );
                    drop(guard);
                }
            }
        });
        true
    }
}
