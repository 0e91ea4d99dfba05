use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use caselib::{ensure_thumbnail_task, sync_blocking_task, Config, Library, ThumbnailCache};

#[derive(Parser, Debug)]
#[command(name = "caselib", about = "Index a folder tree of project images into a catalog")]
struct Cli {
    /// Config file (defaults to ./caselib.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the catalog with the media root
    Sync,
    /// Generate (or verify) the thumbnail for one image
    Thumb {
        image: PathBuf,
        /// Project directory that owns the image
        #[arg(long)]
        project: PathBuf,
    },
    /// Warm thumbnails for every project cover
    Covers,
    /// Print catalog counts
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("caselib=info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("starting async runtime")?;

    match cli.command {
        Command::Sync => {
            let summary = runtime
                .block_on(sync_blocking_task(config.db_path.clone(), config.media_root.clone()))
                .context("sync failed")?;
            println!(
                "projects: +{} ~{} -{}  images: +{} ~{} -{}",
                summary.created_projects,
                summary.updated_projects,
                summary.deleted_projects,
                summary.created_images,
                summary.updated_images,
                summary.deleted_images,
            );
        }
        Command::Thumb { image, project } => {
            let cache = ThumbnailCache::new(config.thumb_long_edge);
            let thumb = cache
                .try_ensure(&image, &project)
                .with_context(|| format!("no thumbnail for {}", image.display()))?;
            println!("{}", thumb.display());
        }
        Command::Covers => {
            let library = Library::open(&config.db_path)?;
            let cache = ThumbnailCache::new(config.thumb_long_edge);
            let (ready, failed) = runtime.block_on(warm_covers(&library, &config, cache))?;
            info!("Cover thumbnails: {} ready, {} failed", ready, failed);
            println!("{ready} cover thumbnails ready, {failed} failed");
        }
        Command::Stats => {
            let library = Library::open(&config.db_path)?;
            println!("media root: {}", config.media_root.display());
            println!("database:   {}", library.path().display());
            println!("projects:   {}", library.project_count()?);
            println!("images:     {}", library.image_count()?);
            println!("tags:       {}", library.tags()?.len());
        }
    }

    Ok(())
}

/// Ensure a thumbnail for every cover, running the work on the blocking pool
async fn warm_covers(library: &Library, config: &Config, cache: ThumbnailCache) -> Result<(usize, usize)> {
    info!("Warming cover thumbnails at {}px", cache.long_edge());
    let mut tasks = JoinSet::new();
    for project in library.projects()? {
        let Some(cover) = project.cover_path else {
            continue;
        };
        let source = config.media_root.join(&cover);
        let project_dir = config.media_root.join(&project.folder_path);
        tasks.spawn(async move { (cover, ensure_thumbnail_task(cache, source, project_dir).await) });
    }

    let (mut ready, mut failed) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Some(_))) => ready += 1,
            Ok((cover, None)) => {
                warn!("No thumbnail for cover {}", cover);
                failed += 1;
            }
            Err(e) => {
                warn!("Cover task failed: {}", e);
                failed += 1;
            }
        }
    }
    Ok((ready, failed))
}
