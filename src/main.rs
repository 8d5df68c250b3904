use clap::{Parser, Subcommand};
use gallery_engine::asset::Album;
use gallery_engine::config::{self, FileSettingsProvider};
use gallery_engine::context::GalleryContext;
use gallery_engine::imaging::RustBackend;
use gallery_engine::output;
use gallery_engine::regenerate::regenerate_album;
use gallery_engine::store::{MemoryRepository, StoreError};
use gallery_engine::sync::Synchronizer;
use gallery_engine::types::{AssetId, GalleryId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gallery-engine")]
#[command(about = "Derivative generation and cache maintenance for media galleries")]
#[command(long_about = "\
Derivative generation and cache maintenance for media galleries

Each gallery has a media root directory. Directories below it become albums,
files become media assets, and every media asset gets a thumbnail and an
optimized copy.

Configuration layout:

  config/
  ├── gallery.toml       # Shared settings (overrides stock defaults)
  └── gallery-2.toml     # Gallery 2 only (overrides shared)

Derivatives are written next to the originals, or below alternate roots when
paths.thumbnail_root / paths.optimized_root are set:

  media/010-Travel/001-rome.jpg
  media/010-Travel/zThumb_001-rome.jpg
  media/010-Travel/zOpt_001-rome.jpg

Video and audio are handled by an external ffmpeg-compatible encoder
(encoder.tool_path). Without one, media get placeholder thumbnails and the
original is served as the optimized file.

Set RUST_LOG to adjust logging, e.g. RUST_LOG=gallery_engine=debug.

Run 'gallery-engine gen-config' to print a documented gallery.toml.")]
#[command(version)]
struct Cli {
    /// Configuration directory holding gallery.toml
    #[arg(long, default_value = "config", global = true)]
    config: PathBuf,

    /// Store snapshot file (JSON)
    #[arg(long, default_value = "gallery-store.json", global = true)]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the store in line with a gallery's media root directory
    Sync {
        /// Gallery to synchronize
        gallery_id: i32,
    },
    /// Regenerate all derivatives below an album
    Regenerate {
        /// Album to start from
        album_id: i64,
    },
    /// Delete an album with all its content
    Delete {
        /// Album to delete
        album_id: i64,
        /// Leave original files on disk; only generated files are removed
        #[arg(long)]
        keep_originals: bool,
    },
    /// Print a stock gallery.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    match &cli.command {
        Command::Sync { gallery_id } => {
            let (store, ctx) = open_gallery(&cli)?;
            let gallery = GalleryId(*gallery_id);
            let settings = ctx.gallery_settings(gallery)?;
            init_thread_pool(&settings.processing);
            let summary = Synchronizer::new(&ctx).run(gallery)?;
            store.save_to(&cli.store)?;
            output::print_sync_output(gallery, &settings.paths.media_root, &summary);
        }
        Command::Regenerate { album_id } => {
            let (store, ctx) = open_gallery(&cli)?;
            let album = Album::load(&ctx, AssetId(*album_id))?;
            let settings = ctx.gallery_settings(album.header.gallery_id)?;
            init_thread_pool(&settings.processing);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_regenerate_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = regenerate_album(&ctx, album.header.id, Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;
            let summary = result?;
            store.save_to(&cli.store)?;
            output::print_regenerate_summary(&summary);
        }
        Command::Delete {
            album_id,
            keep_originals,
        } => {
            let (store, ctx) = open_gallery(&cli)?;
            let mut album = Album::load(&ctx, AssetId(*album_id))?;
            let was_root = album.is_root();
            album.delete(&ctx, !keep_originals)?;
            store.save_to(&cli.store)?;
            output::print_delete_output(album.header.id, &album.title, was_root, *keep_originals);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Open the store snapshot and build the context around it.
fn open_gallery(cli: &Cli) -> Result<(Arc<MemoryRepository>, GalleryContext), StoreError> {
    let store = Arc::new(MemoryRepository::load(&cli.store)?);
    let ctx = GalleryContext::new(
        store.clone(),
        Arc::new(FileSettingsProvider::new(&cli.config)),
        Arc::new(RustBackend::new()),
    )
    .with_user(whoami());
    Ok((store, ctx))
}

/// Log to stderr, `gallery_engine=info` unless `RUST_LOG` says otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gallery_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Name recorded as creator and last modifier.
fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| gallery_engine::context::SYSTEM_USER.to_string())
}
