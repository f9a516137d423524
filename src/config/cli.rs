use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Lantern binary.
#[derive(Debug, Parser)]
#[command(name = "lantern", version, about = "Lantern publishing server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LANTERN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Synchronise the content directory and serve the site.
    Serve(Box<ServeArgs>),
    /// Create a new draft article from a working title.
    New(NewArgs),
    /// Print a freshly generated Nostr key pair.
    Keygen,
    /// Set one metadata field of an article source file.
    #[command(name = "set-meta")]
    SetMeta(SetMetaArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ContentOverride {
    /// Override the content root holding `articles/`, `static/` and `content/`.
    #[arg(long = "content-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub content_root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub content: ContentOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Persist the content index to this file instead of memory.
    #[arg(long = "index-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub index_path: Option<PathBuf>,

    /// Toggle live reload of the articles directory.
    #[arg(
        long = "watch",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub watch: Option<bool>,

    /// Toggle publication to Nostr relays.
    #[arg(
        long = "nostr",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub nostr_enabled: Option<bool>,

    /// Accept publications without contacting any relay.
    #[arg(
        long = "nostr-dry-run",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub nostr_dry_run: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct NewArgs {
    #[command(flatten)]
    pub content: ContentOverride,

    /// Working title of the article; the file name is derived from it.
    #[arg(value_name = "TITLE")]
    pub title: String,
}

#[derive(Debug, Args, Clone)]
pub struct SetMetaArgs {
    #[command(flatten)]
    pub content: ContentOverride,

    /// Slug of the article (its file name without `.md`).
    #[arg(value_name = "SLUG")]
    pub slug: String,

    /// Metadata key, for example `Draft` or `NostrUrl`.
    #[arg(value_name = "KEY")]
    pub key: String,

    /// New value, written as a YAML scalar.
    #[arg(value_name = "VALUE")]
    pub value: String,
}
