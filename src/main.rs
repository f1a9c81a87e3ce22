//! Headless capture runner.
//!
//! Runs periodic capture against the simulated camera bank described in the
//! configuration, logging every frame and status change.
//!
//! ```bash
//! RUST_LOG=capture_daq=debug capture_daq --config config/capture.toml --interval 0.5
//! ```

use anyhow::{Context, Result};
use capture_daq::camera::{parse_camera_list, MockCameraBank};
use capture_daq::config::Settings;
use capture_daq::display::TracingSurface;
use capture_daq::reporting::TracingReporter;
use capture_daq::CaptureSystem;
use clap::Parser;
use humantime_serde::re::humantime;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "capture_daq", about = "Periodic multi-camera capture", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated camera ids; defaults to every available camera
    #[arg(long)]
    cameras: Option<String>,

    /// Seconds between captures; defaults to the configured interval
    #[arg(short, long)]
    interval: Option<f64>,

    /// Stop after this long (e.g. "30s"); runs until Ctrl-C otherwise
    #[arg(short, long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Preview this camera before periodic capture takes over
    #[arg(long)]
    preview: Option<String>,

    /// How long to preview before starting periodic capture
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2s")]
    preview_for: Duration,

    /// List available cameras and exit
    #[arg(long)]
    list: bool,

    /// Emit logs and the final status as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    init_tracing(&settings.application.log_level, cli.json);

    let bank = if settings.mock.cameras.is_empty() {
        warn!("no cameras configured; using three simulated defaults");
        MockCameraBank::with_cameras(["cam0", "cam1", "cam2"])
    } else {
        MockCameraBank::from_config(&settings.mock)
    };
    let interval = cli
        .interval
        .unwrap_or(settings.scheduler.default_interval_secs);

    let system = CaptureSystem::builder(
        settings,
        bank,
        Arc::new(TracingSurface),
        Arc::new(TracingReporter),
    )
    .build();

    if cli.list {
        for camera in system.available_cameras().await? {
            println!("{camera}");
        }
        system.shutdown().await;
        return Ok(());
    }

    if let Some(camera) = cli.preview {
        system
            .preview()
            .start(camera.into())
            .await
            .context("failed to start live preview")?;
        tokio::time::sleep(cli.preview_for).await;
    }

    let cameras = match cli.cameras.as_deref() {
        Some(list) => parse_camera_list(list)?,
        None => system.available_cameras().await?,
    };
    system
        .scheduler()
        .start(cameras, interval)
        .await
        .context("failed to start periodic capture")?;

    let mut status = system.scheduler().subscribe_status();
    let watcher = tokio::spawn(async move {
        let mut last = String::new();
        while status.changed().await.is_ok() {
            let text = status.borrow_and_update().to_string();
            if text != last {
                info!(status = %text, "scheduler status");
                last = text;
            }
        }
    });

    match cli.duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("run duration elapsed"),
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!("interrupted");
        }
    }

    let final_status = system.scheduler().status().await;
    if cli.json {
        println!("{}", serde_json::to_string(&final_status)?);
    } else {
        info!(status = %final_status, ticks = final_status.ticks, "final status");
    }

    system.shutdown().await;
    watcher.abort();
    Ok(())
}
