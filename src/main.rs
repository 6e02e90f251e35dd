//! readsync entry point.

use clap::Parser;
use readsync::{
    api::HttpApi,
    config::{Cli, Command, Config},
    connectivity::Connectivity,
    download::{BookDescriptor, DownloadManager, DownloadPhase},
    drafts::AdminDraftManager,
    store::Database,
    sync::SyncManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::Download {
            book_id,
            title,
            chapters,
        }) => cmd_download(config, book_id, title, chapters).await,
        Some(Command::Status { book_id }) => cmd_status(config, book_id),
        Some(Command::Remove { book_id }) => cmd_remove(config, book_id),
        Some(Command::Sync) => cmd_sync(config).await,
        Some(Command::Run) | None => cmd_run(config).await,
    }
}

/// Initialize config and local store.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized local store: {}", config.database.path.display());

    Ok(())
}

/// Download a book for offline reading.
async fn cmd_download(
    config: Config,
    book_id: String,
    title: Option<String>,
    chapters: u32,
) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let api = Arc::new(HttpApi::new(&config.api.base_url, config.api.token.clone()));
    let manager = DownloadManager::new(db, api);

    let descriptor = BookDescriptor {
        id: book_id.clone(),
        title_en: title.unwrap_or_else(|| book_id.clone()),
        title_si: None,
        authors: Vec::new(),
        cover_url: None,
        total_chapters: chapters,
    };

    // Ctrl-C cancels cooperatively; partial downloads stay valid.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    let mut progress = manager.subscribe();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = progress.borrow_and_update().clone();
            if p.phase == DownloadPhase::Downloading && p.current_chapter > 0 {
                println!(
                    "Chapter {}/{} ({:.0}%)",
                    p.current_chapter, p.total_chapters, p.percent
                );
            }
        }
    });

    let phase = manager.download_book(&descriptor, &cancel).await?;
    printer.abort();

    let counts = manager.check_download_status(&book_id)?;
    match phase {
        DownloadPhase::Cancelled => println!(
            "Cancelled: {}/{} chapters downloaded",
            counts.downloaded, counts.total
        ),
        _ => println!(
            "Done: {}/{} chapters downloaded",
            counts.downloaded, counts.total
        ),
    }

    Ok(())
}

/// Show download status for a book.
fn cmd_status(config: Config, book_id: String) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let api = Arc::new(HttpApi::new(&config.api.base_url, config.api.token.clone()));
    let manager = DownloadManager::new(db, api);

    let counts = manager.check_download_status(&book_id)?;
    if counts.total == 0 {
        println!("No offline copy of: {}", book_id);
    } else {
        println!("{}: {}/{} chapters", book_id, counts.downloaded, counts.total);
    }

    Ok(())
}

/// Remove an offline copy.
fn cmd_remove(config: Config, book_id: String) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let api = Arc::new(HttpApi::new(&config.api.base_url, config.api.token.clone()));
    let manager = DownloadManager::new(db, api);

    if manager.delete_download(&book_id)? {
        println!("Removed offline copy: {}", book_id);
    } else {
        println!("No offline copy of: {}", book_id);
    }

    Ok(())
}

/// Run one sync cycle: progress records, pending queue, drafts.
async fn cmd_sync(config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let api = Arc::new(HttpApi::new(&config.api.base_url, config.api.token.clone()));
    let connectivity = Connectivity::new(true);

    let sync = SyncManager::new(
        db.clone(),
        api.clone(),
        connectivity.clone(),
        config.sync.clone(),
    );
    sync.sync_all().await?;

    let drafts = AdminDraftManager::new(db, api, connectivity);
    let accepted = drafts.sync_pending_drafts().await?;

    let state = sync.state();
    println!(
        "Sync complete: {} pending, {} drafts accepted",
        state.pending_count, accepted
    );

    Ok(())
}

/// Run the background sync loop until interrupted.
async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let api = Arc::new(HttpApi::new(&config.api.base_url, config.api.token.clone()));
    let connectivity = Connectivity::new(true);

    let sync = SyncManager::new(db, api, connectivity, config.sync.clone());
    sync.start_auto_sync();

    tracing::info!(
        interval_seconds = config.sync.interval_seconds,
        "Sync loop running, Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    sync.stop_auto_sync();
    tracing::info!("Sync loop stopped");

    Ok(())
}
