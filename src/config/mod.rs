//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, ContentOverride, NewArgs, ServeArgs, ServeOverrides, SetMetaArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "lantern";
const DEFAULT_CONTENT_ROOT: &str = ".";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SITE_TITLE: &str = "Lantern";
const DEFAULT_SITE_DESCRIPTION: &str = "Welcome to my Lantern";
const DEFAULT_SITE_URL: &str = "http://localhost:3000";
const DEFAULT_SITE_KEYWORDS: &str = "blog, lantern";
const DEFAULT_WATCH_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_NOSTR_TIMEOUT_SECS: u64 = 10;
const DEFAULT_NOSTR_READER_URL: &str = "https://habla.news/a/";
const DEFAULT_NOSTR_RELAYS: &[&str] = &[
    "wss://nostr-pub.wellorder.net",
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub content: ContentSettings,
    pub site: SiteSettings,
    pub index: IndexSettings,
    pub watch: WatchSettings,
    pub nostr: NostrSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Filesystem layout under the content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSettings {
    pub root: PathBuf,
}

impl ContentSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Markdown sources, the single source of truth.
    pub fn articles_dir(&self) -> PathBuf {
        self.root.join("articles")
    }

    /// Generated static pages, one per published slug.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    /// Files served verbatim under `/static`.
    pub fn static_dir(&self) -> PathBuf {
        self.root.join("static")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSettings {
    pub title: String,
    /// `None` when the description has been switched off.
    pub description: Option<String>,
    /// Base URL without a trailing slash.
    pub url: String,
    pub keywords: String,
    pub analytics: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// On-disk database file; `None` keeps the index in memory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub enabled: bool,
    pub channel_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct NostrSettings {
    pub enabled: bool,
    pub nsec: Option<String>,
    pub relays: Vec<Url>,
    pub timeout: Duration,
    pub reader_url: String,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("LANTERN")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("nostr.relays")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::New(args)) => raw.apply_content_override(&args.content),
        Some(Command::SetMeta(args)) => raw.apply_content_override(&args.content),
        Some(Command::Keygen) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    content: RawContentSettings,
    site: RawSiteSettings,
    index: RawIndexSettings,
    watch: RawWatchSettings,
    nostr: RawNostrSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_content_override(&overrides.content);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.index_path.as_ref() {
            self.index.path = Some(path.clone());
        }
        if let Some(enabled) = overrides.watch {
            self.watch.enabled = Some(enabled);
        }
        if let Some(enabled) = overrides.nostr_enabled {
            self.nostr.enabled = Some(enabled);
        }
        if let Some(dry_run) = overrides.nostr_dry_run {
            self.nostr.dry_run = Some(dry_run);
        }
    }

    fn apply_content_override(&mut self, overrides: &ContentOverride) {
        if let Some(root) = overrides.content_root.as_ref() {
            self.content.root = Some(root.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            content,
            site,
            index,
            watch,
            nostr,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            content: build_content_settings(content)?,
            site: build_site_settings(site)?,
            index: build_index_settings(index),
            watch: build_watch_settings(watch)?,
            nostr: build_nostr_settings(nostr)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let root = content
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("content.root", "path must not be empty"));
    }
    Ok(ContentSettings { root })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let url = site
        .url
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let parsed = Url::parse(url.trim())
        .map_err(|err| LoadError::invalid("site.url", format!("failed to parse: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid("site.url", "scheme must be http or https"));
    }

    let description = match site.description {
        None => Some(DEFAULT_SITE_DESCRIPTION.to_string()),
        Some(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("false"))
                .then(|| trimmed.to_string())
        }
    };

    let analytics = site.analytics.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(SiteSettings {
        title: site.title.unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string()),
        description,
        url: url.trim().trim_end_matches('/').to_string(),
        keywords: site
            .keywords
            .unwrap_or_else(|| DEFAULT_SITE_KEYWORDS.to_string()),
        analytics,
    })
}

fn build_index_settings(index: RawIndexSettings) -> IndexSettings {
    IndexSettings {
        path: index.path.filter(|path| !path.as_os_str().is_empty()),
    }
}

fn build_watch_settings(watch: RawWatchSettings) -> Result<WatchSettings, LoadError> {
    let capacity = watch
        .channel_capacity
        .unwrap_or(DEFAULT_WATCH_CHANNEL_CAPACITY);
    let channel_capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
        LoadError::invalid("watch.channel_capacity", "must be greater than zero")
    })?;

    Ok(WatchSettings {
        enabled: watch.enabled.unwrap_or(true),
        channel_capacity,
    })
}

fn build_nostr_settings(nostr: RawNostrSettings) -> Result<NostrSettings, LoadError> {
    let raw_relays = nostr.relays.unwrap_or_else(|| {
        DEFAULT_NOSTR_RELAYS
            .iter()
            .map(|relay| relay.to_string())
            .collect()
    });
    let mut relays = Vec::with_capacity(raw_relays.len());
    for relay in raw_relays {
        let trimmed = relay.trim();
        if trimmed.is_empty() {
            continue;
        }
        let url = Url::parse(trimmed).map_err(|err| {
            LoadError::invalid("nostr.relays", format!("`{trimmed}` is not a URL: {err}"))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LoadError::invalid(
                "nostr.relays",
                format!("`{trimmed}` must use ws:// or wss://"),
            ));
        }
        relays.push(url);
    }

    let enabled = nostr.enabled.unwrap_or(false);
    let dry_run = nostr.dry_run.unwrap_or(false);
    if enabled && !dry_run && relays.is_empty() {
        return Err(LoadError::invalid(
            "nostr.relays",
            "at least one relay is required when publishing is enabled",
        ));
    }

    let timeout_secs = nostr.timeout_seconds.unwrap_or(DEFAULT_NOSTR_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "nostr.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let nsec = nostr.nsec.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(NostrSettings {
        enabled,
        nsec,
        relays,
        timeout: Duration::from_secs(timeout_secs),
        reader_url: nostr
            .reader_url
            .unwrap_or_else(|| DEFAULT_NOSTR_READER_URL.to_string()),
        dry_run,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    keywords: Option<String>,
    analytics: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIndexSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWatchSettings {
    enabled: Option<bool>,
    channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNostrSettings {
    enabled: Option<bool>,
    nsec: Option<String>,
    relays: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
    reader_url: Option<String>,
    dry_run: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
