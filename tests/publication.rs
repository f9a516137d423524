mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use common::{Harness, SITE_URL, article, eventually};
use lantern::{
    application::{
        publish::{PublicationGateway, PublishDispatcher},
        watch::{ChangeEvent, run_loop},
    },
    config::NostrSettings,
    infra::nostr::{Event, KIND_LONG_FORM, NostrKeys, RelayError, RelayTransport},
};
use tokio::sync::Mutex;
use url::Url;

const READER_URL: &str = "https://reader.example/a/";

/// Records every event it is asked to send.
#[derive(Default)]
struct RecordingTransport {
    sends: AtomicUsize,
    reject: bool,
    events: Mutex<Vec<Event>>,
}

impl RecordingTransport {
    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayTransport for RecordingTransport {
    async fn send(&self, _relay: &Url, event: &Event) -> Result<(), RelayError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.events.lock().await.push(event.clone());
        if self.reject {
            Err(RelayError::Rejected("blocked: test relay".to_string()))
        } else {
            Ok(())
        }
    }
}

fn nostr_settings() -> NostrSettings {
    NostrSettings {
        enabled: true,
        nsec: None,
        relays: vec![Url::parse("wss://relay.example").expect("relay url")],
        timeout: Duration::from_secs(2),
        reader_url: READER_URL.to_string(),
        dry_run: false,
    }
}

fn dispatcher(harness: &Harness, transport: Arc<RecordingTransport>) -> PublishDispatcher {
    let gateway = PublicationGateway::new(
        &nostr_settings(),
        SITE_URL,
        NostrKeys::generate(),
        transport,
    );
    PublishDispatcher::new(Arc::new(gateway), &harness.sender)
}

fn marker(harness: &Harness, slug: &str) -> String {
    harness
        .index
        .get(slug)
        .expect("get")
        .map(|record| record.external_publish_marker)
        .unwrap_or_default()
}

#[tokio::test]
async fn published_articles_are_broadcast_once() {
    let mut harness = Harness::new();
    let path = harness.write("hello.md", &article("Hello", "false", "2024-01-01", "[a, b]"));
    let transport = Arc::new(RecordingTransport::default());
    let mut reconciler = harness
        .reconciler()
        .with_publisher(dispatcher(&harness, transport.clone()));

    let report = reconciler.bulk_sync().await.expect("sync");
    assert_eq!(report.publications_queued, 1);

    let receiver = harness.take_receiver();
    let loop_handle = tokio::spawn(run_loop(receiver, reconciler));

    assert!(eventually(|| marker(&harness, "hello").starts_with(READER_URL)).await);
    let raw = std::fs::read_to_string(&path).expect("read source");
    assert!(raw.contains(&format!("NostrUrl: {}", marker(&harness, "hello"))));

    // Re-reconciling the marked file must not broadcast again.
    harness
        .sender
        .send(ChangeEvent::Upsert(path.clone()))
        .await
        .expect("queue upsert");
    harness
        .engine()
        .add_metadata_field("hello", "Summary", "Edited")
        .await
        .expect("edit summary");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.sends(), 1);
    let events = transport.events.lock().await;
    let event = &events[0];
    assert_eq!(event.kind, KIND_LONG_FORM);
    assert!(event.tags.contains(&vec!["title".to_string(), "Hello".to_string()]));
    assert!(event.tags.contains(&vec!["t".to_string(), "a".to_string()]));
    assert!(event.content.contains(&format!("{SITE_URL}/p/hello")));
    assert!(!event.content.contains("Draft:"));

    loop_handle.abort();
}

#[tokio::test]
async fn sources_whose_names_do_not_map_to_a_slug_are_never_broadcast() {
    let mut harness = Harness::new();
    let hidden = harness.write(".notes.md", &article("Notes", "false", "2024-01-01", "[]"));
    let padded = harness.write(" hello .md", &article("Hello", "false", "2024-01-01", "[]"));
    let transport = Arc::new(RecordingTransport::default());
    let mut reconciler = harness
        .reconciler()
        .with_publisher(dispatcher(&harness, transport.clone()));

    let report = reconciler.bulk_sync().await.expect("sync");
    assert_eq!(report.skipped, 2);
    assert_eq!(report.publications_queued, 0);

    let receiver = harness.take_receiver();
    let loop_handle = tokio::spawn(run_loop(receiver, reconciler));
    for path in [&hidden, &padded] {
        harness
            .sender
            .send(ChangeEvent::Upsert(path.clone()))
            .await
            .expect("queue upsert");
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.sends(), 0);
    assert!(harness.index.list_slugs().expect("slugs").is_empty());
    assert!(!harness.artifact("hello").exists());

    loop_handle.abort();
}

#[tokio::test]
async fn drafts_and_suppressed_articles_are_not_broadcast() {
    let harness = Harness::new();
    harness.write("draft.md", &article("Draft", "true", "2024-01-01", "[]"));
    harness.write(
        "quiet.md",
        "---\nTitle: Quiet\nDate: 2024-01-01\nDraft: false\nNostrUrl: false\n---\nBody\n",
    );
    harness.write("about.md", "# About\n");
    let transport = Arc::new(RecordingTransport::default());
    let mut reconciler = harness
        .reconciler()
        .with_publisher(dispatcher(&harness, transport.clone()));

    let report = reconciler.bulk_sync().await.expect("sync");

    assert_eq!(report.publications_queued, 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.sends(), 0);
}

#[tokio::test]
async fn failed_publications_retry_on_the_next_reconciliation() {
    let harness = Harness::new();
    let path = harness.write("hello.md", &article("Hello", "false", "2024-01-01", "[]"));
    let transport = Arc::new(RecordingTransport::rejecting());
    let publisher = dispatcher(&harness, transport.clone());
    let in_flight = publisher.in_flight().clone();
    let mut reconciler = harness.reconciler().with_publisher(publisher);

    reconciler.bulk_sync().await.expect("sync");
    assert!(eventually(|| transport.sends() == 1 && !in_flight.is_running("hello")).await);
    assert!(marker(&harness, "hello").is_empty());

    reconciler.upsert_path(&path).await.expect("reconcile again");
    assert!(eventually(|| transport.sends() == 2 && !in_flight.is_running("hello")).await);
    assert!(marker(&harness, "hello").is_empty());
    let raw = std::fs::read_to_string(&path).expect("read source");
    assert!(!raw.contains("NostrUrl"));
}

#[tokio::test]
async fn running_publications_are_not_started_twice() {
    let harness = Harness::new();
    let path = harness.write("hello.md", &article("Hello", "false", "2024-01-01", "[]"));
    let transport = Arc::new(RecordingTransport::default());
    let publisher = dispatcher(&harness, transport.clone());
    let in_flight = publisher.in_flight().clone();
    let mut reconciler = harness.reconciler().with_publisher(publisher);

    // Nothing drains the channel, so the first publication keeps its claim.
    reconciler.bulk_sync().await.expect("sync");
    assert!(eventually(|| transport.sends() == 1).await);
    assert!(in_flight.is_running("hello"));

    reconciler.upsert_path(&path).await.expect("reconcile again");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.sends(), 1);
}
