//! Turning the gallery into one downloadable image.
//!
//! The pipeline runs `Idle → Preparing → Ready → Capturing → Done | Failed`.
//! Opening starts a settle countdown alongside a wait on the shared
//! context's fonts. A capture re-derives `@font-face` rules from the stored
//! metadata, force-loads them into a font set scoped to that capture,
//! measures the composition, and rasterizes it at a bounded scale.

mod compose;
mod css;
mod download;
mod raster;
mod scale;

pub use compose::{Card, EXPORT_STYLE_ATTR, ExportSnapshot, ExportSurface, GridLayout, PlacedCard, layout};
pub use css::{FontFaceRule, build_font_face_css, rules_for};
pub use download::{DirDownloader, Downloader};
pub use raster::{RasterRequest, Rasterizer, ResvgRasterizer, encode_png};
pub use scale::{ScaleLimits, capture_scale, raster_size};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::context::FontContext;
use crate::error::ExportError;
use crate::fetch::ResourceFetcher;

/// One display frame at 60 Hz.
const FRAME: Duration = Duration::from_millis(16);

async fn next_frame() {
    tokio::time::sleep(FRAME).await;
}

// ============================================================================
// ExportState
// ============================================================================

/// Where the export dialog is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Preparing,
    Ready,
    Capturing,
    Done(PathBuf),
    Failed(String),
}

impl ExportState {
    /// Capture may start from here.
    pub fn can_capture(&self) -> bool {
        matches!(self, Self::Ready | Self::Done(_) | Self::Failed(_))
    }
}

// ============================================================================
// ExportPipeline
// ============================================================================

/// Prepares and performs gallery exports.
pub struct ExportPipeline {
    config: ExportConfig,
    grid: GridLayout,
    context: Arc<FontContext>,
    fetcher: Arc<dyn ResourceFetcher>,
    rasterizer: Arc<dyn Rasterizer>,
    downloader: Arc<dyn Downloader>,
    state: Mutex<ExportState>,
    countdown: Arc<watch::Sender<u32>>,
    fonts_ready: Arc<watch::Sender<bool>>,
    session: Mutex<Option<CancellationToken>>,
}

impl ExportPipeline {
    pub fn new(
        config: ExportConfig,
        context: Arc<FontContext>,
        fetcher: Arc<dyn ResourceFetcher>,
        rasterizer: Arc<dyn Rasterizer>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let (countdown, _) = watch::channel(config.countdown_secs);
        let (fonts_ready, _) = watch::channel(false);
        Self {
            config,
            grid: GridLayout::default(),
            context,
            fetcher,
            rasterizer,
            downloader,
            state: Mutex::new(ExportState::Idle),
            countdown: Arc::new(countdown),
            fonts_ready: Arc::new(fonts_ready),
            session: Mutex::new(None),
        }
    }

    /// A pipeline rendering with resvg into the configured download directory.
    pub fn with_resvg(config: ExportConfig, context: Arc<FontContext>, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let downloader = Arc::new(DirDownloader::new(config.download_dir()));
        Self::new(config, context, fetcher, Arc::new(ResvgRasterizer), downloader)
    }

    pub fn with_grid(mut self, grid: GridLayout) -> Self {
        self.grid = grid;
        self
    }

    pub fn limits(&self) -> ScaleLimits {
        ScaleLimits {
            max_scale: self.config.max_scale as f64,
            max_dimension: self.config.max_dimension,
            min_scale: self.config.min_scale as f64,
        }
    }

    /// Current state. Preparing turns into Ready once the countdown has
    /// run out and the shared fonts have settled.
    pub fn state(&self) -> ExportState {
        let mut state = self.state.lock();
        if *state == ExportState::Preparing && self.is_settled() {
            *state = ExportState::Ready;
        }
        state.clone()
    }

    /// Seconds left on the settle countdown.
    pub fn countdown(&self) -> u32 {
        *self.countdown.borrow()
    }

    fn is_settled(&self) -> bool {
        *self.countdown.borrow() == 0 && *self.fonts_ready.borrow()
    }

    /// Opens the export: starts the countdown and the fonts-ready wait.
    ///
    /// Opening an already open pipeline does nothing.
    pub fn open(&self) {
        let mut session = self.session.lock();
        if session.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *session = Some(token.clone());
        *self.state.lock() = ExportState::Preparing;
        self.countdown.send_replace(self.config.countdown_secs);
        self.fonts_ready.send_replace(false);
        info!(countdown = self.config.countdown_secs, "export opened");

        let countdown = self.countdown.clone();
        let ticks_token = token.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately.
            ticks.tick().await;
            while *countdown.borrow() > 0 {
                tokio::select! {
                    biased;
                    _ = ticks_token.cancelled() => break,
                    _ = ticks.tick() => {
                        // A reopened pipeline shares the channel, so a
                        // closed session never writes to it.
                        countdown.send_if_modified(|n| {
                            if ticks_token.is_cancelled() || *n == 0 {
                                return false;
                            }
                            *n -= 1;
                            true
                        });
                    }
                }
            }
        });

        let context = self.context.clone();
        let fonts_ready = self.fonts_ready.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = async {
                    context.ready().await;
                    next_frame().await;
                } => {
                    let settled = fonts_ready.send_if_modified(|ready| {
                        let fresh = !token.is_cancelled() && !*ready;
                        *ready |= fresh;
                        fresh
                    });
                    if settled {
                        debug!("shared fonts settled");
                    }
                }
            }
        });
    }

    /// Resolves once the pipeline is Ready.
    pub async fn wait_ready(&self) -> Result<(), ExportError> {
        let token = self.session.lock().clone().ok_or(ExportError::NotReady)?;
        let mut countdown = self.countdown.subscribe();
        let mut fonts_ready = self.fonts_ready.subscribe();
        tokio::select! {
            _ = token.cancelled() => Err(ExportError::Cancelled),
            _ = async {
                let _ = countdown.wait_for(|n| *n == 0).await;
                let _ = fonts_ready.wait_for(|ready| *ready).await;
            } => {
                self.state();
                Ok(())
            }
        }
    }

    /// Cancels the countdown and any in-flight wait. Idempotent.
    pub fn close(&self) {
        if let Some(token) = self.session.lock().take() {
            token.cancel();
            info!("export closed");
        }
        *self.state.lock() = ExportState::Idle;
    }

    /// The surface a capture of `snapshot` draws.
    pub fn surface(&self, snapshot: &ExportSnapshot) -> ExportSurface {
        ExportSurface::new(snapshot, self.grid, self.config.background_rgb())
    }

    /// Captures `snapshot` and downloads the image.
    pub async fn capture(&self, snapshot: &ExportSnapshot) -> Result<PathBuf, ExportError> {
        let mut surface = self.surface(snapshot);
        self.capture_surface(snapshot, &mut surface).await
    }

    /// Captures onto a caller-owned surface. The injected style block is
    /// gone from `surface` when this returns, whatever the outcome.
    pub async fn capture_surface(
        &self,
        snapshot: &ExportSnapshot,
        surface: &mut ExportSurface,
    ) -> Result<PathBuf, ExportError> {
        let session = self.session.lock().clone();
        let token = {
            let mut state = self.state.lock();
            if *state == ExportState::Preparing && self.is_settled() {
                *state = ExportState::Ready;
            }
            if !state.can_capture() {
                return Err(ExportError::NotReady);
            }
            if snapshot.is_empty() {
                return Err(ExportError::EmptyGallery);
            }
            let token = session.ok_or(ExportError::NotReady)?;
            *state = ExportState::Capturing;
            token
        };

        let result = tokio::select! {
            _ = token.cancelled() => Err(ExportError::Cancelled),
            result = self.render(snapshot, surface) => result,
        };
        if surface.remove_injected_style() {
            debug!("removed export font rules");
        }

        let mut state = self.state.lock();
        match &result {
            Ok(path) => {
                info!(path = %path.display(), "export finished");
                *state = ExportState::Done(path.clone());
            }
            Err(ExportError::Cancelled) => {}
            Err(e) => {
                warn!("export failed: {e}");
                *state = ExportState::Failed(e.to_string());
            }
        }
        result
    }

    async fn render(&self, snapshot: &ExportSnapshot, surface: &mut ExportSurface) -> Result<PathBuf, ExportError> {
        let rules = rules_for(&snapshot.metas, snapshot.families());
        surface.inject_style(build_font_face_css(&rules));

        let scoped = FontContext::with_database(Arc::unwrap_or_clone(self.context.database()), self.fetcher.clone());
        let mut sample = snapshot.text_sample(self.config.probe_px as usize);
        if sample.trim().is_empty() {
            sample = self.config.sample_glyphs.clone();
        }
        self.force_load(&scoped, &rules, &sample).await;

        if timeout(self.config.ready_timeout(), scoped.ready()).await.is_err() {
            warn!(pending = scoped.pending(), "export fonts did not settle, capturing anyway");
        }
        next_frame().await;
        next_frame().await;

        let fonts = scoped.database();
        let layout_size = surface.layout_size();
        let measured = self.rasterizer.measure(&surface.to_svg(layout_size), fonts.clone())?;
        let content = measured.union(layout_size);

        let limits = self.limits();
        let scale = capture_scale(content, self.config.device_pixel_ratio as f64, limits);
        let output = raster_size(content, scale, limits);
        info!(
            width = content.width,
            height = content.height,
            scale,
            out_width = output.width,
            out_height = output.height,
            "capturing export"
        );

        let request = RasterRequest {
            content,
            output,
            scale,
            background: self.config.background_rgb(),
        };
        let svg = surface.to_svg(content);
        let rasterizer = self.rasterizer.clone();
        let image = tokio::task::spawn_blocking(move || rasterizer.rasterize(&svg, fonts, request))
            .await
            .map_err(|e| ExportError::Raster(e.to_string()))??;

        let png = encode_png(&image)?;
        self.downloader.save(&self.config.filename, png).await
    }

    /// Loads every rule into `scoped`, each under its own timeout.
    /// Failures are logged and skipped.
    async fn force_load(&self, scoped: &FontContext, rules: &[FontFaceRule], sample: &str) {
        let font_timeout = self.config.font_timeout();
        let loads = rules.iter().map(|rule| async move {
            let load = scoped.add_face(&rule.family, &rule.url, rule.descriptor);
            match timeout(font_timeout, load).await {
                Ok(Ok(face)) => debug!(
                    family = %rule.family,
                    weight = rule.descriptor.weight,
                    faces = face.ids.len(),
                    probe_px = self.config.probe_px,
                    sample,
                    "export font loaded"
                ),
                Ok(Err(e)) => warn!(family = %rule.family, url = %rule.url, "export font failed: {e}"),
                Err(_) => warn!(family = %rule.family, url = %rule.url, ?font_timeout, "export font timed out"),
            }
        });
        join_all(loads).await;
    }
}

impl Drop for ExportPipeline {
    fn drop(&mut self) {
        if let Some(token) = self.session.get_mut().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::font::FontMetadata;
    use crate::geometry::SizePx;
    use async_trait::async_trait;
    use image::RgbaImage;
    use resvg::usvg::fontdb::Database;

    struct NeverFetcher;

    #[async_trait]
    impl ResourceFetcher for NeverFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            futures::future::pending().await
        }
    }

    struct MissingFetcher;

    #[async_trait]
    impl ResourceFetcher for MissingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Unsupported(url.to_string()))
        }
    }

    #[derive(Default)]
    struct FakeRasterizer {
        measured: SizePx,
        fail: bool,
        requests: Mutex<Vec<RasterRequest>>,
        svgs: Mutex<Vec<String>>,
    }

    impl Rasterizer for FakeRasterizer {
        fn measure(&self, _svg: &str, _fonts: Arc<Database>) -> Result<SizePx, ExportError> {
            Ok(self.measured)
        }

        fn rasterize(&self, svg: &str, _fonts: Arc<Database>, request: RasterRequest) -> Result<RgbaImage, ExportError> {
            self.svgs.lock().push(svg.to_string());
            self.requests.lock().push(request);
            if self.fail {
                return Err(ExportError::Raster("out of memory".into()));
            }
            Ok(RgbaImage::new(request.output.width, request.output.height))
        }
    }

    fn config(dir: &std::path::Path) -> ExportConfig {
        ExportConfig {
            countdown_secs: 0,
            download_dir: Some(dir.to_path_buf()),
            ..ExportConfig::default()
        }
    }

    fn snapshot() -> ExportSnapshot {
        ExportSnapshot::new(
            vec![Card {
                family: "Font-1".into(),
                sample: "The quick brown fox".into(),
                px: 24,
            }],
            vec![FontMetadata::new("Font-1", "https://blob.local/u/1.ttf")],
        )
    }

    fn pipeline(
        config: ExportConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        rasterizer: Arc<FakeRasterizer>,
    ) -> ExportPipeline {
        let context = Arc::new(FontContext::new(fetcher.clone()));
        let downloader = Arc::new(DirDownloader::new(config.download_dir()));
        ExportPipeline::new(config, context, fetcher, rasterizer, downloader)
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_gates_capture() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            countdown_secs: 10,
            ..config(dir.path())
        };
        let p = pipeline(config, Arc::new(MissingFetcher), Arc::new(FakeRasterizer::default()));
        assert_eq!(p.state(), ExportState::Idle);

        p.open();
        assert_eq!(p.state(), ExportState::Preparing);
        assert_eq!(p.countdown(), 10);
        assert!(matches!(p.capture(&snapshot()).await, Err(ExportError::NotReady)));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(p.countdown(), 6);
        assert_eq!(p.state(), ExportState::Preparing);

        p.wait_ready().await.unwrap();
        assert_eq!(p.countdown(), 0);
        assert_eq!(p.state(), ExportState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_scales_content_and_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            device_pixel_ratio: 2.0,
            ..config(dir.path())
        };
        let rasterizer = Arc::new(FakeRasterizer {
            measured: SizePx::new(1201, 333),
            ..Default::default()
        });
        let p = pipeline(config, Arc::new(MissingFetcher), rasterizer.clone());
        p.open();
        p.wait_ready().await.unwrap();

        let path = p.capture(&snapshot()).await.unwrap();
        assert_eq!(path, dir.path().join("font-gallery.png"));
        assert_eq!(p.state(), ExportState::Done(path.clone()));

        let request = rasterizer.requests.lock()[0];
        assert_eq!(request.content.width, 1201);
        assert!(request.content.height >= 333);
        assert_eq!(request.scale, 2.0);
        assert_eq!(request.output.width, 2402);
        assert_eq!(request.output.height, request.content.height * 2);
        assert_eq!(request.background, (255, 255, 255));

        let png = std::fs::read(&path).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 2402);

        // The rasterized document carried the re-derived rules.
        let svg = rasterizer.svgs.lock()[0].clone();
        assert!(svg.contains(r#"<style data-export-fonts="true">"#));
        assert!(svg.contains("src:url('https://blob.local/u/1.ttf') format('truetype')"));

        // Capture may run again after Done.
        p.capture(&snapshot()).await.unwrap();
        assert_eq!(rasterizer.requests.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_raster_leaves_no_file_and_no_style() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = Arc::new(FakeRasterizer {
            measured: SizePx::new(400, 300),
            fail: true,
            ..Default::default()
        });
        let p = pipeline(config(dir.path()), Arc::new(MissingFetcher), rasterizer);
        p.open();
        p.wait_ready().await.unwrap();

        let snap = snapshot();
        let mut surface = p.surface(&snap);
        let result = p.capture_surface(&snap, &mut surface).await;
        assert!(matches!(result, Err(ExportError::Raster(_))));
        assert!(matches!(p.state(), ExportState::Failed(msg) if msg.contains("out of memory")));
        assert!(!surface.has_injected_style());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_font_times_out_and_capture_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = Arc::new(FakeRasterizer {
            measured: SizePx::new(400, 300),
            ..Default::default()
        });
        let p = pipeline(config(dir.path()), Arc::new(NeverFetcher), rasterizer.clone());
        p.open();
        p.wait_ready().await.unwrap();

        let started = tokio::time::Instant::now();
        p.capture(&snapshot()).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(6000));
        assert!(elapsed < Duration::from_millis(12000));
        assert_eq!(rasterizer.requests.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(config(dir.path()), Arc::new(MissingFetcher), Arc::new(FakeRasterizer::default()));
        p.open();
        p.wait_ready().await.unwrap();
        let result = p.capture(&ExportSnapshot::default()).await;
        assert!(matches!(result, Err(ExportError::EmptyGallery)));
        assert_eq!(p.state(), ExportState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent_and_cancels_waits() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            countdown_secs: 10,
            ..config(dir.path())
        };
        let p = Arc::new(pipeline(config, Arc::new(MissingFetcher), Arc::new(FakeRasterizer::default())));
        p.open();

        let waiter = {
            let p = p.clone();
            tokio::spawn(async move { p.wait_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(2500)).await;
        p.close();
        p.close();

        assert!(matches!(waiter.await.unwrap(), Err(ExportError::Cancelled)));
        assert_eq!(p.state(), ExportState::Idle);
        assert!(matches!(p.capture(&snapshot()).await, Err(ExportError::NotReady)));

        // Countdown stopped where it was.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(p.countdown(), 8);

        // Re-opening restarts it.
        p.open();
        assert_eq!(p.countdown(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_on_a_tick_keeps_the_new_countdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            countdown_secs: 3,
            ..config(dir.path())
        };
        let p = pipeline(config, Arc::new(MissingFetcher), Arc::new(FakeRasterizer::default()));
        for _ in 0..8 {
            p.open();
            // Lands on the old session's first tick.
            tokio::time::sleep(Duration::from_secs(1)).await;
            p.close();
            p.open();
            assert_eq!(p.countdown(), 3);
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(p.countdown(), 3);
            p.close();
        }

        p.open();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(p.countdown(), 2);
    }

    const FIXTURE_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/Tuffy.ttf");

    /// Exports one card drawn in `family` from the fixture font and counts
    /// the dark pixels. Nothing but the fixture can paint them: the context
    /// has no system fonts.
    async fn dark_pixels_for(family: &str, url: &str) -> usize {
        let dir = tempfile::tempdir().unwrap();
        let fetcher: Arc<dyn ResourceFetcher> = Arc::new(crate::fetch::FsFetcher::new());
        let context = Arc::new(FontContext::new(fetcher.clone()));
        let p = ExportPipeline::with_resvg(config(dir.path()), context, fetcher);
        p.open();
        p.wait_ready().await.unwrap();

        let snap = ExportSnapshot::new(
            vec![Card {
                family: family.into(),
                sample: "Hamburgefonstiv".into(),
                px: 32,
            }],
            vec![FontMetadata::new(family, url)],
        );
        let path = p.capture(&snap).await.unwrap();
        let decoded = image::load_from_memory(&std::fs::read(path).unwrap()).unwrap().to_rgba8();
        decoded.pixels().filter(|px| px.0[0] < 128 && px.0[1] < 128 && px.0[2] < 128).count()
    }

    #[tokio::test]
    async fn export_paints_the_stored_font() {
        assert!(dark_pixels_for("Font-1", FIXTURE_FONT).await > 100);
        assert_eq!(dark_pixels_for("Font-1", "/nonexistent/font.ttf").await, 0);
    }

    #[tokio::test]
    async fn export_paints_families_named_with_apostrophes() {
        assert!(dark_pixels_for("O'Neil Sans", FIXTURE_FONT).await > 100);
    }

    #[tokio::test]
    async fn resvg_export_matches_layout_size() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher: Arc<dyn ResourceFetcher> = Arc::new(MissingFetcher);
        let context = Arc::new(FontContext::new(fetcher.clone()));
        let p = ExportPipeline::with_resvg(config(dir.path()), context, fetcher);
        p.open();
        p.wait_ready().await.unwrap();

        let snap = snapshot();
        let expected = p.surface(&snap).layout_size();
        let path = p.capture(&snap).await.unwrap();
        let decoded = image::load_from_memory(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (expected.width, expected.height));
    }
}
