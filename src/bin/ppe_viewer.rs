//! ppe_viewer - live PPE compliance viewer
//!
//! This binary:
//! 1. Loads configuration (`PPE_CONFIG` file, `PPE_*` env, then CLI flags)
//! 2. Acquires the frame source and starts the sampling pipeline
//! 3. Logs per-round stats and the headline
//! 4. Optionally writes the latest overlay to a JPEG file
//! 5. Stops cleanly on Ctrl-C or after `--seconds`

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use ppe_overlay::{
    open_source, BackendRegistry, DetectionClient, DetectorKind, IntervalScheduler, Pipeline,
    PipelinePhase, StatsSnapshot, SyntheticBackend, ViewerConfig,
};
#[cfg(feature = "detect-http")]
use ppe_overlay::{HttpBackend, HttpBackendConfig};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const OUTPUT_JPEG_QUALITY: u8 = 90;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame source: stub://<name>, an image file, or a directory of images.
    #[arg(long)]
    source: Option<String>,
    /// Detector backend (http or synthetic).
    #[arg(long)]
    detector: Option<String>,
    /// Detection service endpoint.
    #[arg(long)]
    detect_url: Option<String>,
    /// Per-round detection timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Minimum confidence for a detection to be shown.
    #[arg(long)]
    threshold: Option<f32>,
    /// Redraw rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Synthetic source width.
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,
    /// Synthetic source height.
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,
    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    seconds: Option<u64>,
    /// Write the latest overlay here after every applied round.
    #[arg(long)]
    out: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut ViewerConfig) -> Result<()> {
        if let Some(source) = &self.source {
            cfg.source = source.clone();
        }
        if let Some(detector) = &self.detector {
            cfg.detector.kind = DetectorKind::parse(detector)?;
        }
        if let Some(url) = &self.detect_url {
            cfg.detector.url = url.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            cfg.detector.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(threshold) = self.threshold {
            cfg.confidence_threshold = threshold;
        }
        if let Some(fps) = self.fps {
            cfg.target_fps = fps;
        }
        cfg.validate()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = ViewerConfig::load()?;
    args.apply(&mut cfg)?;

    let registry = build_registry(&cfg)?;
    let backend = registry.resolve(cfg.detector.kind.as_str())?;
    let client = DetectionClient::new(backend, cfg.detector.timeout);

    let source = open_source(&cfg.source, args.width, args.height)?;
    let mut pipeline = Pipeline::new(source, client, cfg.classifier()?, cfg.pipeline_settings());

    let mut scheduler = IntervalScheduler::from_fps(cfg.target_fps);
    let cancel = scheduler.cancel_handle();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    if let Err(err) = pipeline.start() {
        // The notice is the whole user-facing output for a failed source.
        eprintln!("{err}");
        return Err(anyhow!("frame source unavailable"));
    }
    log::info!(
        "ppe_viewer running: {} -> {} ({} fps, threshold {:.2})",
        cfg.source,
        cfg.detector.kind.as_str(),
        cfg.target_fps,
        cfg.confidence_threshold
    );

    let deadline = args.seconds.map(|secs| Instant::now() + Duration::from_secs(secs));
    let stop_at_deadline = scheduler.cancel_handle();
    let mut shown = StatsSnapshot::default();
    let mut shown_error: Option<String> = None;
    let mut write_failed = false;

    ppe_overlay::run(&mut pipeline, &mut scheduler, |pipeline, report| {
        if deadline.is_some_and(|at| Instant::now() >= at) {
            stop_at_deadline.store(true, Ordering::SeqCst);
        }
        if report.applied > 0 {
            let stats = pipeline.stats();
            if stats != shown {
                log::info!(
                    "{} (total {}, violations {}, compliant {})",
                    stats.headline(),
                    stats.total,
                    stats.violations,
                    stats.compliant
                );
                shown = stats;
            }
            if let Some(path) = &args.out {
                if let Err(err) = write_overlay(pipeline.surface(), path) {
                    if !write_failed {
                        log::warn!("cannot write overlay to {}: {err:#}", path.display());
                        write_failed = true;
                    }
                }
            }
        }
        let notice = pipeline.last_error().map(str::to_string);
        if notice != shown_error {
            if let Some(text) = &notice {
                log::warn!("notice: {text}");
            }
            shown_error = notice;
        }
    });

    let counters = pipeline.counters();
    log::info!(
        "ppe_viewer stopped: {} dispatched, {} applied, {} stale, {} errors, {} timeouts",
        counters.dispatched,
        counters.applied,
        counters.stale_discarded,
        counters.detection_errors,
        counters.timeouts
    );
    if pipeline.phase() == PipelinePhase::Failed {
        return Err(anyhow!(
            "pipeline failed: {}",
            pipeline.last_error().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn build_registry(cfg: &ViewerConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(SyntheticBackend::new());
    #[cfg(feature = "detect-http")]
    registry.register(HttpBackend::new(HttpBackendConfig {
        url: cfg.detector.url.clone(),
        timeout: cfg.detector.timeout,
        ..HttpBackendConfig::default()
    })?);
    #[cfg(not(feature = "detect-http"))]
    if cfg.detector.kind == DetectorKind::Http {
        return Err(anyhow!("built without the detect-http feature; use --detector synthetic"));
    }
    Ok(registry)
}

fn write_overlay(surface: &ppe_overlay::ImageSurface, path: &Path) -> Result<()> {
    let jpeg = surface.encode_jpeg(OUTPUT_JPEG_QUALITY)?;
    let tmp = path.with_extension("jpg.tmp");
    std::fs::write(&tmp, jpeg).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}
