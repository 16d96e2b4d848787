//! font-gallery binary
//!
//! ```bash
//! font-gallery gallery                      # list published families
//! font-gallery export [--out DIR]           # write the gallery PNG
//! font-gallery upload FILE --family NAME --uid UID
//! font-gallery delete FAMILY...
//! font-gallery size FAMILY PX
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use font_gallery::{
    Config, ExportPipeline, ExportSnapshot, FilePreferenceStorage, FontContext, FontStore,
    FsBlobStore, FsFetcher, GalleryLoader, GridLayout, Identity, JsonFontStore, Publisher,
    RemovalTarget, ResourceFetcher, SizePreferences, UploadService,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "font-gallery", version, about = "Font preview gallery with image export")]
struct Cli {
    /// Config file (overrides FONT_GALLERY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and list the published families in display order
    Gallery,
    /// Render the gallery to a PNG
    Export {
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,
        /// Settle countdown in seconds
        #[arg(long)]
        countdown: Option<u32>,
    },
    /// Publish a font file
    Upload {
        file: PathBuf,
        #[arg(long)]
        family: String,
        #[arg(long)]
        uid: String,
    },
    /// Remove families with their binaries
    Delete {
        #[arg(required = true)]
        families: Vec<String>,
    },
    /// Set the preview size of a family
    Size { family: String, px: u32 },
}

struct App {
    config: Config,
    fetcher: Arc<dyn ResourceFetcher>,
    store: Arc<dyn FontStore>,
}

impl App {
    fn new(config: Config) -> Self {
        let storage = &config.storage;
        let fetcher: Arc<dyn ResourceFetcher> = Arc::new(
            FsFetcher::new().with_public_base(storage.public_base_url.clone(), storage.blob_root.clone()),
        );
        let store: Arc<dyn FontStore> = Arc::new(JsonFontStore::new(storage.store_path.clone()));
        Self { config, fetcher, store }
    }

    fn context(&self) -> Arc<FontContext> {
        if self.config.export.system_fonts {
            Arc::new(FontContext::with_system_fonts(self.fetcher.clone()))
        } else {
            Arc::new(FontContext::new(self.fetcher.clone()))
        }
    }

    fn publisher(&self) -> Publisher {
        let storage = &self.config.storage;
        let blobs = Arc::new(FsBlobStore::new(storage.blob_root.clone(), storage.public_base_url.clone()));
        Publisher::new(UploadService::new(blobs), self.store.clone())
    }

    fn prefs(&self) -> SizePreferences {
        let storage = Arc::new(FilePreferenceStorage::new(self.config.prefs.dir()));
        SizePreferences::load(storage, self.config.gallery.tier, self.config.prefs.debounce())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load(),
    };
    let app = App::new(config);

    match cli.command {
        Command::Gallery => cmd_gallery(&app).await,
        Command::Export { out, countdown } => cmd_export(app, out, countdown).await,
        Command::Upload { file, family, uid } => cmd_upload(&app, file, family, uid).await,
        Command::Delete { families } => cmd_delete(&app, families).await,
        Command::Size { family, px } => cmd_size(&app, &family, px),
    }
}

async fn cmd_gallery(app: &App) -> Result<()> {
    let loader = GalleryLoader::new(app.store.clone(), app.context());
    let gallery = loader.load().await;
    if let Some(error) = &gallery.error {
        bail!("could not read published fonts: {error}");
    }
    if let Some(message) = gallery.empty_state_message() {
        println!("{message}");
        return Ok(());
    }

    let mut prefs = app.prefs();
    prefs.prune_to(gallery.families.as_slice());
    for family in &gallery.families {
        let variants = gallery.metas_for(family).count();
        println!("{family}\t{}px\t{variants} variant(s)", prefs.get_size(family));
    }
    prefs.flush()?;
    Ok(())
}

async fn cmd_export(mut app: App, out: Option<PathBuf>, countdown: Option<u32>) -> Result<()> {
    if let Some(out) = out {
        app.config.export.download_dir = Some(out);
    }
    if let Some(secs) = countdown {
        app.config.export.countdown_secs = secs;
    }

    let context = app.context();
    let loader = GalleryLoader::new(app.store.clone(), context.clone());
    let gallery = loader.load().await;
    if !gallery.can_export() {
        bail!(gallery.error.clone().unwrap_or_else(|| "nothing to export".to_string()));
    }
    let prefs = app.prefs();

    let grid = GridLayout {
        columns: app.config.gallery.columns,
        card_width: app.config.gallery.card_width,
        ..GridLayout::default()
    };
    let export = ExportPipeline::with_resvg(app.config.export.clone(), context, app.fetcher.clone()).with_grid(grid);
    export.open();
    info!(seconds = export.countdown(), "waiting for export to settle");
    export.wait_ready().await?;

    let snapshot = ExportSnapshot::from_gallery(&gallery, &prefs, &app.config.gallery.sample_text);
    let path = export.capture(&snapshot).await?;
    export.close();
    println!("{}", path.display());
    Ok(())
}

async fn cmd_upload(app: &App, file: PathBuf, family: String, uid: String) -> Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?
        .to_string();
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let identity = Identity::new(uid);
    let stored = app
        .publisher()
        .publish_font(Some(&identity), &family, &file_name, bytes)
        .await?;
    println!("{}\t{}", stored.id, stored.record.url.unwrap_or_default());
    Ok(())
}

async fn cmd_delete(app: &App, families: Vec<String>) -> Result<()> {
    let records = app.store.published().await?;
    let mut targets = Vec::new();
    for family in &families {
        let urls: Vec<_> = records
            .iter()
            .filter(|r| r.record.family.as_deref() == Some(family.as_str()))
            .filter_map(|r| r.record.url.clone())
            .collect();
        if urls.is_empty() {
            bail!("no published font named {family}");
        }
        targets.extend(urls.into_iter().map(|url| RemovalTarget {
            family: family.clone(),
            url,
        }));
    }

    let outcomes = app.publisher().remove_fonts(&targets).await?;
    let mut failed = false;
    for outcome in outcomes.iter().filter(|o| o.deleted > 0 || !o.success) {
        match &outcome.error {
            None => println!("removed {} ({} record(s))", outcome.family, outcome.deleted),
            Some(error) => {
                failed = true;
                eprintln!("failed to remove {}: {error}", outcome.family);
            }
        }
    }
    if failed {
        bail!("some families could not be removed");
    }
    Ok(())
}

fn cmd_size(app: &App, family: &str, px: u32) -> Result<()> {
    let mut prefs = app.prefs();
    let stored = prefs.set_size(family, px);
    prefs.flush()?;
    println!("{family}\t{stored}px");
    Ok(())
}
