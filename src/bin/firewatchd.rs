//! firewatchd - wildfire watch daemon
//!
//! This daemon:
//! 1. Opens the configured camera (or a synthetic/replay source)
//! 2. Drops frames that barely differ from the last one it looked at
//! 3. Classifies the rest for fire and smoke
//! 4. E-mails every subscriber the frame and the camera location on a positive
//!
//! Configuration comes from the file named by `--config` / `FIREWATCH_CONFIG`,
//! environment overrides, then these flags. SMTP credentials are read from
//! `SYSTEM_EMAIL` and `SYSTEM_EMAIL_PASSWORD`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use wildfire_watch::notify::SmtpCredentials;
use wildfire_watch::{
    open_source, DetectionEngine, EmailNotifier, JpegFileSink, Pipeline, PreviewRenderer,
    WatchConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON or TOML configuration file.
    #[arg(long, env = "FIREWATCH_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Source URI (`/dev/videoN`, `stub://name`, `replay://dir`).
    #[arg(long, conflicts_with = "device_index")]
    source: Option<String>,
    /// Capture device index, i.e. `/dev/video<N>`.
    #[arg(long)]
    device_index: Option<u32>,
    /// Write the live view to this JPEG file.
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,
    /// Save every positive frame here.
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut WatchConfig) {
        if let Some(source) = &self.source {
            cfg.source.uri = Some(source.clone());
        }
        if let Some(index) = self.device_index {
            cfg.source.uri = None;
            cfg.source.device_index = index;
        }
        if let Some(path) = &self.preview {
            cfg.preview_path = Some(path.clone());
        }
        if let Some(dir) = &self.snapshot_dir {
            cfg.snapshot_dir = Some(dir.clone());
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = WatchConfig::load_from(args.config.as_deref())?;
    args.apply(&mut cfg);

    let credentials = SmtpCredentials::from_env()?;
    let source = open_source(&cfg.source)?;

    let mut engine = DetectionEngine::from_settings(&cfg.detector)?;
    engine.warm_up().context("model warm-up failed")?;

    let mut notifier = EmailNotifier::connect(cfg.mail.smtp.clone(), credentials)?
        .with_reconnect_attempts(cfg.mail.reconnect_attempts);
    for address in &cfg.mail.recipients {
        notifier.add_recipient(address);
    }
    if notifier.recipients().is_empty() {
        log::warn!("no valid recipients configured; alerts will only be logged");
    }

    let mut pipeline = Pipeline::new(source, engine, notifier, cfg.location);
    if let Some(dir) = &cfg.snapshot_dir {
        pipeline = pipeline.with_snapshot_dir(dir);
    }
    pipeline.start()?;

    let preview = match &cfg.preview_path {
        Some(path) => {
            let handle = PreviewRenderer::new(
                pipeline.shared_source(),
                JpegFileSink::new(path),
                cfg.preview_interval,
            )
            .spawn()?;
            log::info!("live preview written to {}", path.display());
            Some(handle)
        }
        None => None,
    };

    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping pipeline...");
        stop.stop();
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "firewatchd running. location={} recipients={}",
        cfg.location,
        pipeline.notifier().recipients().len()
    );
    let stats = pipeline.run(cfg.tick_interval)?;

    if let Some(preview) = preview {
        let rendered = preview.cancel()?;
        log::info!("live preview stopped after {} frames", rendered);
    }
    log::info!(
        "firewatchd stopped: frames={} admitted={} positives={} alerts={} failures={}",
        stats.frames_read,
        stats.admitted,
        stats.positives,
        stats.alerts_delivered,
        stats.dispatch_failures
    );
    Ok(())
}
