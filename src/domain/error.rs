use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("article `{slug}` not found")]
    ArticleNotFound { slug: String },
    #[error("article source `{path}` has no usable file name")]
    InvalidSourceName { path: String },
    #[error("metadata key `{key}` is invalid: {reason}")]
    InvalidMetadataKey { key: String, reason: String },
}

impl DomainError {
    pub fn article_not_found(slug: impl Into<String>) -> Self {
        Self::ArticleNotFound { slug: slug.into() }
    }

    pub fn invalid_source_name(path: impl Into<String>) -> Self {
        Self::InvalidSourceName { path: path.into() }
    }

    pub fn invalid_metadata_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetadataKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
