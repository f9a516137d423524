use std::{
    future::IntoFuture,
    io::{ErrorKind, Write},
    path::Path,
    process,
    sync::Arc,
};

use lantern::{
    application::{
        artifacts::ArtifactGenerator,
        engine::Engine,
        error::AppError,
        extract::Extractor,
        feed::FeedBuilder,
        publish::{PublicationGateway, PublishDispatcher},
        reconcile::{AboutSlot, Reconciler, article_source_path, write_metadata_field},
        render::{RenderService, render_service},
        watch::{change_channel, run_loop, spawn_watcher},
    },
    config,
    domain::{
        metadata::{
            KEY_AUTHOR, KEY_DATE, KEY_DRAFT, KEY_SUMMARY, KEY_TAGS, KEY_TITLE, render_scalar,
        },
        slug::derive_slug,
    },
    infra::{
        error::InfraError,
        http::{self, HttpState},
        index::ContentIndex,
        nostr::{NostrKeys, load_or_generate_keys},
        telemetry,
    },
};
use time::{OffsetDateTime, macros::format_description};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::New(args) => run_new(settings, args).await,
        config::Command::Keygen => run_keygen(),
        config::Command::SetMeta(args) => run_set_meta(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let articles_dir = settings.content.articles_dir();
    let index = Arc::new(open_index(&settings.index)?);
    let about = AboutSlot::default();
    let (changes, receiver) = change_channel(settings.watch.channel_capacity);

    let renderer: Arc<dyn RenderService> = render_service();
    let mut reconciler = Reconciler::new(
        articles_dir.clone(),
        Extractor::new(renderer, settings.site.url.clone()),
        index.clone(),
        ArtifactGenerator::new(settings.content.artifacts_dir(), settings.site.clone()),
        FeedBuilder::new(settings.site.clone()),
        about.clone(),
    );

    if settings.nostr.enabled {
        let keys = load_or_generate_keys(settings.nostr.nsec.as_deref())
            .map_err(|err| AppError::validation(format!("invalid nostr.nsec: {err}")))?;
        let gateway = Arc::new(PublicationGateway::with_default_transport(
            &settings.nostr,
            settings.site.url.clone(),
            keys,
        ));
        reconciler = reconciler.with_publisher(PublishDispatcher::new(gateway, &changes));
    }

    let report = reconciler.bulk_sync().await?;
    info!(
        target = "lantern::sync",
        loaded = report.loaded,
        skipped = report.skipped,
        removed = report.removed,
        publications_queued = report.publications_queued,
        "Initial synchronization finished"
    );

    // Dropping the watcher stops filesystem events.
    let watcher = if settings.watch.enabled {
        match spawn_watcher(&articles_dir, changes.clone()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                error!(
                    target = "lantern::watch",
                    path = %articles_dir.display(),
                    error = %err,
                    "Failed to start filesystem watcher; live reload disabled"
                );
                None
            }
        }
    } else {
        None
    };

    let mut loop_handle = tokio::spawn(run_loop(receiver, reconciler));

    let engine = Arc::new(Engine::new(index, about, settings.site.clone(), changes));
    let state = HttpState {
        engine,
        static_dir: settings.content.static_dir(),
    };

    let result = serve_http(&settings, state).await;

    // The loop stops once the router and the watcher have released their senders.
    drop(watcher);
    let budget = settings.server.graceful_shutdown;
    if tokio::time::timeout(budget, &mut loop_handle).await.is_err() {
        warn!(
            target = "lantern::watch",
            seconds = budget.as_secs(),
            "Change loop did not drain in time; aborting"
        );
        loop_handle.abort();
    }

    result
}

fn open_index(settings: &config::IndexSettings) -> Result<ContentIndex, AppError> {
    let index = match settings.path.as_ref() {
        Some(path) => ContentIndex::persistent(path),
        None => ContentIndex::in_memory(),
    };
    index.map_err(|err| AppError::from(InfraError::index(settings.path.as_deref(), err)))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;

    info!(
        target = "lantern::http",
        addr = %settings.server.addr,
        "Serving HTTP"
    );

    let (signalled, on_signal) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        _ = on_signal => {}
    }

    let budget = settings.server.graceful_shutdown;
    match tokio::time::timeout(budget, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "lantern::http",
                seconds = budget.as_secs(),
                "Graceful shutdown budget exhausted; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(target = "lantern::http", "Shutdown signal received");
}

async fn run_new(settings: config::Settings, args: config::NewArgs) -> Result<(), AppError> {
    let slug = derive_slug(&args.title).map_err(|err| AppError::validation(err.to_string()))?;
    let articles_dir = settings.content.articles_dir();
    let path = article_source_path(&articles_dir, &slug)?;

    tokio::fs::create_dir_all(&articles_dir)
        .await
        .map_err(|err| AppError::from(InfraError::filesystem(&articles_dir, err)))?;

    let skeleton = article_skeleton(&args.title, OffsetDateTime::now_utc());
    let target = path.clone();
    tokio::task::spawn_blocking(move || create_new_file(&target, skeleton.as_bytes()))
        .await
        .map_err(|err| AppError::unexpected(format!("file task failed: {err}")))?
        .map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => {
                AppError::validation(format!("`{}` already exists", path.display()))
            }
            _ => AppError::from(InfraError::filesystem(&path, err)),
        })?;

    info!(
        target = "lantern::new",
        slug = %slug,
        path = %path.display(),
        "Created draft article"
    );
    println!("{}", path.display());
    Ok(())
}

fn article_skeleton(title: &str, now: OffsetDateTime) -> String {
    let date = now
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default();
    format!(
        "---\n{KEY_TITLE}: {title}\n{KEY_AUTHOR}: \"\"\n{KEY_SUMMARY}: \"\"\n{KEY_DATE}: {date}\n{KEY_TAGS}: []\n{KEY_DRAFT}: true\n---\n\n",
        title = render_scalar(title),
        date = render_scalar(&date),
    )
}

fn create_new_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn run_keygen() -> Result<(), AppError> {
    let keys = NostrKeys::generate();
    let nsec = keys
        .nsec()
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    let npub = keys
        .npub()
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("nsec: {nsec}");
    println!("npub: {npub}");
    Ok(())
}

async fn run_set_meta(
    settings: config::Settings,
    args: config::SetMetaArgs,
) -> Result<(), AppError> {
    let path = article_source_path(&settings.content.articles_dir(), &args.slug)?;
    write_metadata_field(&path, &args.key, &args.value)
        .await
        .map_err(|err| AppError::validation(err.to_string()))?;
    info!(
        target = "lantern::set_meta",
        slug = %args.slug,
        key = %args.key,
        "Updated article metadata"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use lantern::domain::{front_matter, metadata::Metadata};

    #[test]
    fn skeleton_is_a_parseable_draft() {
        let raw = article_skeleton("Hello: World", datetime!(2024-03-05 10:00 UTC));
        let split = front_matter::split(&raw);
        let meta = Metadata::parse(split.metadata.expect("metadata block")).expect("parse");
        assert!(meta.draft().expect("draft").value);
        assert_eq!(meta.text(KEY_TITLE), "Hello: World");
        assert_eq!(meta.text(KEY_DATE), "2024-03-05");
    }

    #[test]
    fn new_files_are_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.md");
        create_new_file(&path, b"first").expect("create");
        let err = create_new_file(&path, b"second").expect_err("must refuse");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "first");
    }
}
