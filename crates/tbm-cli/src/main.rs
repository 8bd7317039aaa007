use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tbm_core::{NewBookmark, Tender};
use tbm_snapshot::{CancelHandle, SnapshotDownloader};
use tbm_storage::{BookmarkStore, SqliteBookmarkStore};
use tbm_web::ServerConfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tbm")]
#[command(about = "Tender bookmark server and snapshot downloader")]
struct Cli {
    /// SQLite database file (overrides TBM_DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Snapshot output directory (overrides TBM_SNAPSHOT_DIR)
    #[arg(long, global = true)]
    snapshot_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the bookmark API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Download detail snapshots for every bookmark and print the report
    Download,
    /// Write all bookmarks, in listing order, to a JSON file
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Bookmark every tender in a JSON array produced by the tender pipeline
    Import {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tbm_cli=info,tbm_web=info,tbm_snapshot=info,tbm_storage=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(dir) = cli.snapshot_dir {
        config.snapshot.output_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            tbm_web::serve(config, CancelHandle::new()).await?;
        }
        Commands::Download => {
            let store = open_store(&config).await?;
            let downloader = SnapshotDownloader::new(&config.snapshot)?;
            let handle = CancelHandle::new();
            let on_signal = handle.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted; cancelling remaining downloads");
                    on_signal.cancel();
                }
            });

            let report = downloader.run(store.as_ref(), handle.token()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Export { out } => {
            let store = open_store(&config).await?;
            let body = tbm_web::export_json(store.as_ref()).await?;
            tokio::fs::write(&out, &body)
                .await
                .with_context(|| format!("writing export {}", out.display()))?;
            println!("exported bookmarks to {}", out.display());
        }
        Commands::Import { file } => {
            let store = open_store(&config).await?;
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let tenders: Vec<Tender> = serde_json::from_slice(&raw)
                .with_context(|| format!("parsing tenders from {}", file.display()))?;

            let mut imported = 0usize;
            for tender in &tenders {
                if tender.job_number.trim().is_empty() {
                    warn!(title = %tender.title, "skipping tender without job_number");
                    continue;
                }
                store.upsert(NewBookmark::from_tender(tender)?).await?;
                imported += 1;
            }
            info!(imported, total = tenders.len(), "tender import finished");
            println!("imported {imported} of {} tenders", tenders.len());
        }
    }

    Ok(())
}

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn BookmarkStore>> {
    let store = SqliteBookmarkStore::open(&config.database_path)
        .await
        .with_context(|| format!("opening bookmark database {}", config.database_path.display()))?;
    Ok(Arc::new(store))
}
