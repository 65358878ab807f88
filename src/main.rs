//! Posture Capture CLI
//!
//! Main entry point: analyze an image file or a single camera frame with
//! the posture analysis service.

use anyhow::Context;
use clap::{Parser, Subcommand};
use posture_capture::{
    models::{AnalysisMode, AnalysisResult, InputBlob},
    state::{AppConfig, AppState},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "posture_capture=debug";

#[derive(Parser, Debug)]
#[command(name = "posture-capture", version)]
#[command(about = "Capture a frame or pick a file and check posture with the analysis service")]
struct Args {
    /// Analysis service base URL (overrides POSTURE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Request timeout in milliseconds (overrides POSTURE_API_TIMEOUT_MS)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an image or video file
    Analyze {
        file: PathBuf,

        /// squat or sitting
        #[arg(long, default_value = "squat")]
        mode: AnalysisMode,

        /// Write the annotated image returned by the service
        #[arg(long)]
        save_annotated: Option<PathBuf>,
    },
    /// Capture one camera frame and analyze it
    Camera {
        /// Capture device (overrides POSTURE_CAMERA_DEVICE)
        #[arg(long)]
        device: Option<PathBuf>,

        /// Use the built-in test pattern instead of a device
        #[arg(long)]
        synthetic: bool,

        #[arg(long, default_value = "squat")]
        mode: AnalysisMode,

        #[arg(long)]
        save_annotated: Option<PathBuf>,
    },
    /// Check the analysis service is up
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::default();
    if let Some(url) = args.api_url.clone() {
        config.api_url = url;
    }
    if let Some(ms) = args.timeout_ms {
        config.api_timeout_ms = ms;
    }
    let synthetic = match &args.command {
        Command::Camera {
            device, synthetic, ..
        } => {
            if let Some(device) = device {
                config.camera_device = device.clone();
            }
            *synthetic
        }
        _ => false,
    };

    tracing::info!(
        api_url = %config.api_url,
        timeout_ms = config.api_timeout_ms,
        camera_device = %config.camera_device.display(),
        camera_format = %config.camera_input_format,
        "Configuration loaded"
    );

    let devices = config.media_devices(synthetic);
    let state = AppState::new(config, devices)?;

    // Error expiry
    let expiry_session = state.session.clone();
    let expiry_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            expiry_session.check_error_expiration().await;
        }
    });

    // State change log
    let (_, mut updates) = state.session.subscribe("cli").await;
    let log_task = tokio::spawn(async move {
        while let Some(msg) = updates.recv().await {
            tracing::debug!(message_type = %msg.message_type(), "Session update");
        }
    });

    let outcome = run(&state, args.command).await;

    state.session.teardown().await;
    expiry_task.abort();
    log_task.abort();

    outcome
}

async fn run(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Health => {
            if state.ai_client.health_check().await {
                println!("{} is up", state.ai_client.base_url());
                Ok(())
            } else {
                anyhow::bail!("{} is not responding", state.ai_client.base_url())
            }
        }
        Command::Analyze {
            file,
            mode,
            save_annotated,
        } => {
            let blob = InputBlob::from_path(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            state.session.change_mode(mode).await;
            let info = state.session.select_file(Some(blob)).await?;
            tracing::info!(
                file_name = %info.name,
                size = info.size,
                mime_type = %info.mime_type,
                "File selected"
            );

            let result = state
                .session
                .submit_analysis()
                .await?
                .context("Analysis did not run")?;
            report(&result, mode, save_annotated.as_deref()).await
        }
        Command::Camera {
            mode,
            save_annotated,
            ..
        } => {
            state.session.change_mode(mode).await;
            state.session.start_camera().await?;

            let result = state.session.capture_and_analyze().await;
            state.session.stop_camera().await;

            let result = result?.context("Analysis did not run")?;
            report(&result, mode, save_annotated.as_deref()).await
        }
    }
}

async fn report(
    result: &AnalysisResult,
    mode: AnalysisMode,
    save_annotated: Option<&Path>,
) -> anyhow::Result<()> {
    println!("{}", mode.label());
    if result.has_bad_posture {
        println!("Bad posture detected");
        for issue in &result.issues {
            println!("  - {}", issue);
        }
    } else {
        println!("Good posture");
    }

    if let Some(path) = save_annotated {
        match result.annotated_image_bytes()? {
            Some(bytes) => {
                tokio::fs::write(path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Annotated image written to {}", path.display());
            }
            None => tracing::warn!("No inline annotated image in response"),
        }
    }

    Ok(())
}
