#![allow(dead_code)]

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use lantern::{
    application::{
        artifacts::ArtifactGenerator,
        engine::Engine,
        extract::Extractor,
        feed::FeedBuilder,
        reconcile::{AboutSlot, Reconciler},
        render::render_service,
        watch::{ChangeReceiver, ChangeSender, change_channel},
    },
    config::SiteSettings,
    infra::index::ContentIndex,
};
use tempfile::TempDir;

pub const SITE_URL: &str = "https://blog.example";

pub fn site() -> SiteSettings {
    SiteSettings {
        title: "Lantern".to_string(),
        description: Some("Notes from the workshop".to_string()),
        url: SITE_URL.to_string(),
        keywords: "blog".to_string(),
        analytics: None,
    }
}

/// A throwaway content root with an index, an about slot and a change channel.
pub struct Harness {
    pub dir: TempDir,
    pub index: Arc<ContentIndex>,
    pub about: AboutSlot,
    pub sender: ChangeSender,
    pub receiver: Option<ChangeReceiver>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create content root");
        std::fs::create_dir_all(dir.path().join("articles")).expect("create articles dir");
        let (sender, receiver) = change_channel(NonZeroUsize::new(64).expect("capacity"));
        Self {
            dir,
            index: Arc::new(ContentIndex::in_memory().expect("open index")),
            about: AboutSlot::default(),
            sender,
            receiver: Some(receiver),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.root().join("articles")
    }

    pub fn artifact(&self, slug: &str) -> PathBuf {
        self.root().join("content").join(format!("{slug}.html"))
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.articles_dir().join(name);
        std::fs::write(&path, contents).expect("write article source");
        path
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.articles_dir().join(name)).expect("remove article source");
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.articles_dir(),
            Extractor::new(render_service(), SITE_URL),
            Arc::clone(&self.index),
            ArtifactGenerator::new(self.root().join("content"), site()),
            FeedBuilder::new(site()),
            self.about.clone(),
        )
    }

    pub fn engine(&self) -> Engine {
        Engine::new(
            Arc::clone(&self.index),
            self.about.clone(),
            site(),
            self.sender.clone(),
        )
    }

    pub fn take_receiver(&mut self) -> ChangeReceiver {
        self.receiver.take().expect("receiver already taken")
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub fn article(title: &str, draft: &str, date: &str, tags: &str) -> String {
    format!(
        "---\nTitle: {title}\nAuthor: Ana\nSummary: About {title}\nDate: {date}\nTags: {tags}\nDraft: {draft}\n---\n# {title}\n\nSome words here.\n"
    )
}
