mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use depth_vision::{AppConfig, DepthApp, DepthDevice, Key, SyntheticKinect};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Interactive depth-threshold demo on a synthetic depth camera.
#[derive(Parser, Debug)]
#[command(name = "depth_tester", version, about)]
struct Cli {
    /// JSON file with startup configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run this many frames without a terminal and save the last one
    #[arg(long, value_name = "FRAMES")]
    headless: Option<u32>,

    /// Where the headless run writes its final frame
    #[arg(long, default_value = "depth_tester.png")]
    output: PathBuf,

    /// Start in the point cloud view
    #[arg(long)]
    point_cloud: bool,

    /// Drive a second device alongside the primary one
    #[arg(long)]
    second_device: bool,

    /// Log file used while the terminal viewer owns the screen
    #[arg(long, default_value = "depth_tester.log")]
    log_file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Logging ---
    let cli = Cli::parse();
    init_logging(&cli)?;

    // --- 2. Configuration ---
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.second_device |= cli.second_device;

    // --- 3. Run ---
    match cli.headless {
        Some(frames) => run_headless(config, frames, cli.point_cloud, &cli.output),
        None => {
            let mut app = build_app(config, true);
            app.setup();
            if cli.point_cloud {
                app.key_pressed(Key::Char('p'));
            }
            let result = terminal::run(&mut app).await;
            app.exit();
            result
        }
    }
}

/// Logs go to stderr in headless mode and to a file while the terminal viewer runs.
/// Set RUST_LOG to control the level, e.g. RUST_LOG=depth_vision=debug.
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_level(true);

    if cli.headless.is_some() {
        builder.with_writer(std::io::stderr).init();
    } else {
        let file = File::create(&cli.log_file)
            .with_context(|| format!("creating log file {}", cli.log_file.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    Ok(())
}

/// Threaded devices stream frames in the background; inline devices render a
/// frame per update, which keeps headless runs deterministic.
fn build_app(config: AppConfig, threaded: bool) -> DepthApp {
    let make = |name: &str| -> Box<dyn DepthDevice> {
        if threaded {
            Box::new(SyntheticKinect::threaded(name, config.scene.clone()))
        } else {
            Box::new(SyntheticKinect::inline(name, config.scene.clone()))
        }
    };
    let device = make("kinect");
    let secondary = config.second_device.then(|| make("kinect2"));
    DepthApp::new(config, device, secondary)
}

fn run_headless(config: AppConfig, frames: u32, point_cloud: bool, output: &Path) -> Result<()> {
    let mut app = build_app(config, false);
    app.setup();
    if point_cloud {
        app.key_pressed(Key::Char('p'));
    }

    let mut last = None;
    for _ in 0..frames.max(1) {
        app.update();
        last = Some(app.draw());
    }
    app.exit();

    let last = last.context("no frame was drawn")?;
    last.frame
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    for line in &last.status {
        info!("{line}");
    }
    info!(path = %output.display(), frames, "Headless run finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["depth_tester"]).unwrap();
        assert!(cli.headless.is_none());
        assert_eq!(cli.output, PathBuf::from("depth_tester.png"));
        assert!(!cli.point_cloud);
    }

    #[test]
    fn cli_headless_flags() {
        let cli = Cli::try_parse_from([
            "depth_tester",
            "--headless",
            "12",
            "--point-cloud",
            "--second-device",
            "--output",
            "out.png",
        ])
        .unwrap();
        assert_eq!(cli.headless, Some(12));
        assert!(cli.point_cloud);
        assert!(cli.second_device);
        assert_eq!(cli.output, PathBuf::from("out.png"));
    }

    #[test]
    fn headless_run_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frame.png");
        let config = AppConfig {
            second_device: true,
            ..AppConfig::default()
        };
        run_headless(config, 3, false, &output).unwrap();

        let frame = image::open(&output).unwrap();
        assert_eq!((frame.width(), frame.height()), (896, 672));
    }
}
