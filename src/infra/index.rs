//! Durable content index backed by redb.
//!
//! One table maps string keys to JSON documents. Article records live under
//! `post_<slug>` and the syndication feed under the reserved key `feed`.
//! Every call runs in its own transaction, so readers always observe a
//! committed snapshot while the single writer applies changes.

use std::{collections::BTreeSet, path::Path};

use redb::{Database, TableDefinition, backends::InMemoryBackend};
use thiserror::Error;
use tracing::info;

use crate::{application::feed::FeedDocument, domain::article::ArticleRecord};

const CONTENT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("content-1");
const RECORD_PREFIX: &str = "post_";
// First key after every `post_` key: '`' follows '_' in ASCII.
const RECORD_PREFIX_END: &str = "post`";
const FEED_KEY: &str = "feed";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open index database: {0}")]
    Open(#[from] redb::DatabaseError),
    #[error("index transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("index table unavailable: {0}")]
    Table(#[from] redb::TableError),
    #[error("index storage failure: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("index commit failed: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("failed to encode or decode `{key}`: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to prepare index directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct ContentIndex {
    db: Database,
}

impl ContentIndex {
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        info!(
            target = "lantern::index",
            path = %path.display(),
            "Opening persistent content index"
        );
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::builder().create(path)?;
        Self::open(db)
    }

    pub fn in_memory() -> Result<Self, IndexError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::open(db)
    }

    fn open(db: Database) -> Result<Self, IndexError> {
        let write_tx = db.begin_write()?;
        {
            let _table = write_tx.open_table(CONTENT_TABLE)?;
        }
        write_tx.commit()?;
        Ok(Self { db })
    }

    /// Insert or replace the record stored under its slug.
    pub fn put(&self, record: &ArticleRecord) -> Result<(), IndexError> {
        let key = record_key(&record.slug);
        let bytes = encode(&key, record)?;
        self.write(&key, &bytes)
    }

    pub fn get(&self, slug: &str) -> Result<Option<ArticleRecord>, IndexError> {
        self.read(&record_key(slug))
    }

    /// Remove a record. Returns whether anything was stored under the slug.
    pub fn delete(&self, slug: &str) -> Result<bool, IndexError> {
        let key = record_key(slug);
        let tx = self.db.begin_write()?;
        let removed = {
            let mut table = tx.open_table(CONTENT_TABLE)?;
            table.remove(key.as_str())?.is_some()
        };
        tx.commit()?;
        Ok(removed)
    }

    /// Every record in the index, in key order.
    pub fn list_all(&self) -> Result<Vec<ArticleRecord>, IndexError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(CONTENT_TABLE)?;
        let mut records = Vec::new();
        for entry in table.range(RECORD_PREFIX..RECORD_PREFIX_END)? {
            let (key, value) = entry?;
            records.push(decode(key.value(), value.value())?);
        }
        Ok(records)
    }

    pub fn list_slugs(&self) -> Result<BTreeSet<String>, IndexError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(CONTENT_TABLE)?;
        let mut slugs = BTreeSet::new();
        for entry in table.range(RECORD_PREFIX..RECORD_PREFIX_END)? {
            let (key, _) = entry?;
            if let Some(slug) = key.value().strip_prefix(RECORD_PREFIX) {
                slugs.insert(slug.to_string());
            }
        }
        Ok(slugs)
    }

    pub fn put_feed(&self, feed: &FeedDocument) -> Result<(), IndexError> {
        let bytes = encode(FEED_KEY, feed)?;
        self.write(FEED_KEY, &bytes)
    }

    pub fn get_feed(&self) -> Result<Option<FeedDocument>, IndexError> {
        self.read(FEED_KEY)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), IndexError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(CONTENT_TABLE)?;
            table.insert(key, bytes)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, IndexError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(CONTENT_TABLE)?;
        let Some(row) = table.get(key)? else {
            return Ok(None);
        };
        decode(key, row.value()).map(Some)
    }
}

fn record_key(slug: &str) -> String {
    format!("{RECORD_PREFIX}{slug}")
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<Vec<u8>, IndexError> {
    serde_json::to_vec(value).map_err(|source| IndexError::Codec {
        key: key.to_string(),
        source,
    })
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, IndexError> {
    serde_json::from_slice(bytes).map_err(|source| IndexError::Codec {
        key: key.to_string(),
        source,
    })
}
