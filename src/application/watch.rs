//! Filesystem watching and the single-writer change loop.
//!
//! Every mutation of the articles directory and of the index flows through one
//! bounded channel: notify events, metadata edits and publication write-backs.
//! A single task drains it, so the reconciler never runs concurrently with itself.

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use notify::{
    Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        publish::PublishGuard,
        reconcile::{MetadataWriteError, Reconciler},
    },
    domain::article::is_article_source,
};

pub type ChangeSender = mpsc::Sender<ChangeEvent>;
pub type ChangeReceiver = mpsc::Receiver<ChangeEvent>;

#[derive(Debug)]
pub enum ChangeEvent {
    /// A source file was created or its contents changed.
    Upsert(PathBuf),
    /// A source file disappeared or was renamed away.
    Remove(PathBuf),
    /// Rewrite one metadata field of an article, then reconcile it.
    SetMetadata {
        slug: String,
        key: String,
        value: String,
        reply: Option<oneshot::Sender<Result<(), MetadataWriteError>>>,
    },
    /// A relay publication finished; the guard keeps the slug claimed until
    /// the marker has been written back to `source`.
    Published {
        source: PathBuf,
        marker: String,
        guard: PublishGuard,
    },
}

pub fn change_channel(capacity: NonZeroUsize) -> (ChangeSender, ChangeReceiver) {
    mpsc::channel(capacity.get())
}

/// Translate one notify event into change events for markdown sources.
pub fn classify(event: &notify::Event) -> Vec<ChangeEvent> {
    let sources = || {
        event
            .paths
            .iter()
            .filter(|path| is_article_source(path))
            .cloned()
    };

    match event.kind {
        EventKind::Create(_) => sources().map(ChangeEvent::Upsert).collect(),
        EventKind::Remove(_) => sources().map(ChangeEvent::Remove).collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            sources().map(ChangeEvent::Remove).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            sources().map(ChangeEvent::Upsert).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = event.paths.first().filter(|path| is_article_source(path)) {
                changes.push(ChangeEvent::Remove(from.clone()));
            }
            if let Some(to) = event.paths.get(1).filter(|path| is_article_source(path)) {
                changes.push(ChangeEvent::Upsert(to.clone()));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(_)) => sources()
            .map(|path| {
                if path.exists() {
                    ChangeEvent::Upsert(path)
                } else {
                    ChangeEvent::Remove(path)
                }
            })
            .collect(),
        EventKind::Modify(_) => sources().map(ChangeEvent::Upsert).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Watch `dir` (non-recursively) and forward classified events into `sender`.
///
/// The returned watcher must be kept alive for events to keep flowing.
pub fn spawn_watcher(
    dir: &Path,
    sender: ChangeSender,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                for change in classify(&event) {
                    if sender.blocking_send(change).is_err() {
                        debug!(
                            target = "lantern::watch",
                            "Change channel closed; dropping filesystem event"
                        );
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(
                    target = "lantern::watch",
                    error = %err,
                    "Filesystem watcher reported an error"
                );
            }
        },
        Config::default(),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(
        target = "lantern::watch",
        path = %dir.display(),
        "Watching articles directory"
    );
    Ok(watcher)
}

/// Drain the change channel until every sender is gone.
pub async fn run_loop(mut receiver: ChangeReceiver, mut reconciler: Reconciler) {
    while let Some(change) = receiver.recv().await {
        apply(&mut reconciler, change).await;
    }
    debug!(target = "lantern::watch", "Change channel closed; stopping loop");
}

async fn apply(reconciler: &mut Reconciler, change: ChangeEvent) {
    match change {
        ChangeEvent::Upsert(path) => {
            if let Err(err) = reconciler.upsert_path(&path).await {
                error!(
                    target = "lantern::watch",
                    path = %path.display(),
                    error = %err,
                    "Failed to reconcile changed article"
                );
            }
        }
        ChangeEvent::Remove(path) => {
            if let Err(err) = reconciler.remove_path(&path).await {
                error!(
                    target = "lantern::watch",
                    path = %path.display(),
                    error = %err,
                    "Failed to reconcile removed article"
                );
            }
        }
        ChangeEvent::SetMetadata {
            slug,
            key,
            value,
            reply,
        } => {
            let result = reconciler.set_metadata(&slug, &key, &value).await;
            if let Err(err) = &result {
                warn!(
                    target = "lantern::watch",
                    slug = %slug,
                    key = %key,
                    error = %err,
                    "Failed to update article metadata"
                );
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }
        ChangeEvent::Published {
            source,
            marker,
            guard,
        } => {
            if let Err(err) = reconciler.record_publication(&source, &marker).await {
                error!(
                    target = "lantern::watch",
                    slug = %guard.slug(),
                    path = %source.display(),
                    marker = %marker,
                    error = %err,
                    "Failed to record publish marker"
                );
            }
            drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    fn describe(changes: Vec<ChangeEvent>) -> Vec<String> {
        changes
            .into_iter()
            .map(|change| match change {
                ChangeEvent::Upsert(path) => format!("upsert {}", path.display()),
                ChangeEvent::Remove(path) => format!("remove {}", path.display()),
                other => format!("{other:?}"),
            })
            .collect()
    }

    #[test]
    fn creates_and_writes_upsert() {
        let created = classify(&event(EventKind::Create(CreateKind::File), &["/a/hello.md"]));
        assert_eq!(describe(created), vec!["upsert /a/hello.md"]);

        let written = classify(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/a/hello.md"],
        ));
        assert_eq!(describe(written), vec!["upsert /a/hello.md"]);
    }

    #[test]
    fn removals_and_renames_away_remove() {
        let removed = classify(&event(EventKind::Remove(RemoveKind::File), &["/a/hello.md"]));
        assert_eq!(describe(removed), vec!["remove /a/hello.md"]);

        let renamed = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/a/hello.md"],
        ));
        assert_eq!(describe(renamed), vec!["remove /a/hello.md"]);
    }

    #[test]
    fn rename_with_both_paths_moves_the_slug() {
        let changes = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/a/old.md", "/a/new.md"],
        ));
        assert_eq!(describe(changes), vec!["remove /a/old.md", "upsert /a/new.md"]);
    }

    #[test]
    fn non_markdown_and_metadata_events_are_ignored() {
        let swap = event(EventKind::Create(CreateKind::File), &["/a/.hello.md.swp"]);
        assert!(classify(&swap).is_empty());
        assert!(classify(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/a/hello.md"],
        ))
        .is_empty());
    }

    #[test]
    fn ambiguous_rename_checks_the_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("here.md");
        std::fs::write(&present, "x").expect("write");
        let absent = dir.path().join("gone.md");

        let changes = classify(
            &notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
                .add_path(present.clone())
                .add_path(absent.clone()),
        );
        assert_eq!(
            describe(changes),
            vec![
                format!("upsert {}", present.display()),
                format!("remove {}", absent.display()),
            ]
        );
    }
}
