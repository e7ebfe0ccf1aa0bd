use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facestress_core::{AnalysisOutcome, HttpAnalysisService, SelectedFile, Workbench};
use facestress_hw::{Camera, V4lMediaDevices};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod shell;
mod terminal;

use config::Config;
use terminal::TerminalPresenter;

#[derive(Parser)]
#[command(name = "facestress", about = "Facial stress analysis client")]
struct Cli {
    /// Analysis service base URL (overrides config)
    #[arg(long, global = true)]
    service_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image file
    Analyze {
        /// Path to a face image (max 16MB)
        path: PathBuf,
    },
    /// Take a photo with the camera and analyze it
    Snap {
        /// V4L2 device path (overrides config)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Interactive session: open files, use the camera, analyze
    Shell {
        #[arg(short, long)]
        device: Option<String>,
    },
    /// List camera devices
    Devices,
    /// Check the analysis service
    Health,
}

type Bench = Workbench<V4lMediaDevices, HttpAnalysisService, TerminalPresenter<std::io::Stdout, std::io::Stderr>>;

fn workbench(config: &Config) -> Result<Bench> {
    let service = HttpAnalysisService::new(&config.service_url, config.request_timeout())
        .context("building HTTP client")?;
    let devices = V4lMediaDevices::new(&config.camera_device, config.warmup_frames);
    Ok(Workbench::new(
        devices,
        config.constraints()?,
        service,
        TerminalPresenter::stdio(),
    ))
}

fn exit_for(outcome: Option<AnalysisOutcome>) -> ExitCode {
    match outcome {
        Some(AnalysisOutcome::Success(_)) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }
    tracing::debug!(?config, "configuration");

    match cli.command {
        Commands::Analyze { path } => {
            let mut bench = workbench(&config)?;
            let file = SelectedFile::from_path(&path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            if bench.select_file(file).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            Ok(exit_for(bench.analyze().await))
        }
        Commands::Snap { device } => {
            if let Some(device) = device {
                config.camera_device = device;
            }
            let mut bench = workbench(&config)?;
            if bench.start_camera().await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            let captured = bench.capture_photo().await;
            bench.shutdown();
            if !matches!(captured, Ok(true)) {
                return Ok(ExitCode::FAILURE);
            }
            Ok(exit_for(bench.analyze().await))
        }
        Commands::Shell { device } => {
            if let Some(device) = device {
                config.camera_device = device;
            }
            let mut bench = workbench(&config)?;
            shell::run(&mut bench).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let service = HttpAnalysisService::new(&config.service_url, config.request_timeout())?;
            match service.health().await {
                Ok(health) => {
                    println!(
                        "{}: {} (model loaded: {})",
                        service.health_url(),
                        health.status,
                        health.model_loaded
                    );
                    Ok(if health.model_loaded {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                Err(e) => {
                    eprintln!("Error: {} unreachable: {e}", service.health_url());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
