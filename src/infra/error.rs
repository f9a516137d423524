use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

use super::index::IndexError;

/// Failures of the process-level adapters: index storage, sockets, files, logging.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to open the content index ({location}): {source}")]
    Index {
        location: String,
        #[source]
        source: IndexError,
    },
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    /// `path` is `None` for the in-memory index.
    pub fn index(path: Option<&std::path::Path>, source: IndexError) -> Self {
        let location = path.map_or_else(|| "in memory".to_string(), |p| p.display().to_string());
        Self::Index { location, source }
    }

    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
