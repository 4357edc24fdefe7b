use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use session_recorder::{
    create_router, list_input_devices, list_session_chunks, AppState, AudioFile, RecorderConfig,
    RecorderError, SessionController, SessionState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session-recorder")]
#[command(about = "Record audio sessions to chunked WAV files with time-anchored markers")]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record until Ctrl+C, stdin EOF or the optional duration; each stdin line drops a marker
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// List audio input devices
    Devices,
    /// List the chunk files of a session
    Chunks {
        /// Session ID, e.g. 20250307_090501
        session_id: String,
    },
    /// Serve the HTTP control API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(short, long, default_value = "8731")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match args.command {
        Command::Record { duration } => {
            let config = RecorderConfig::load(&args.config)?;
            record(config, duration.map(Duration::from_secs)).await
        }
        Command::Devices => {
            print_devices();
            Ok(())
        }
        Command::Chunks { session_id } => {
            let config = RecorderConfig::load(&args.config)?;
            print_chunks(&config, &session_id)
        }
        Command::Serve { bind, port } => {
            let config = RecorderConfig::load(&args.config)?;
            serve(config, &bind, port).await
        }
    }
}

async fn record(config: RecorderConfig, duration: Option<Duration>) -> Result<()> {
    let controller = SessionController::new(config)?;

    let session = match controller.start().await {
        Ok(session) => session,
        Err(e) => {
            report_devices(&e);
            return Err(e.into());
        }
    };
    if let Some(warning) = controller.take_warning().await {
        warn!("{}", warning);
    }

    info!("Recording session {}", session.id);
    info!("Type a label and press Enter to drop a marker; Ctrl+C to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut state_rx = controller.subscribe();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("Recording duration reached");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() || *state_rx.borrow() == SessionState::Failed {
                    error!("Recording aborted by a write failure");
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let label = line.trim();
                    if label.is_empty() {
                        continue;
                    }
                    if let Err(e) = controller.mark(label).await {
                        // A failed writer surfaces here and ends the session
                        return Err(e).context("Failed to add marker");
                    }
                }
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    if duration.is_none() {
                        info!("Input closed");
                        break;
                    }
                }
            },
        }
    }

    let (markers_path, chunks) = controller
        .stop_with_chunks()
        .await
        .context("Failed to stop recording")?;

    info!("Recording complete!");
    for chunk in chunks {
        info!(
            "  - Chunk {}: {} ({:.1}s)",
            chunk.sequence_index,
            chunk.path.display(),
            chunk.duration_secs()
        );
    }
    info!("Markers saved to {}", markers_path.display());

    Ok(())
}

async fn serve(config: RecorderConfig, bind: &str, port: u16) -> Result<()> {
    let controller = Arc::new(SessionController::new(config)?);
    let app = create_router(AppState::new(Arc::clone(&controller)));

    let listener = tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;
    info!("HTTP API listening on {}:{}", bind, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    // Do not leave a session half-written on shutdown
    match controller.stop().await {
        Ok(markers_path) => info!("Stopped active session; markers at {}", markers_path.display()),
        Err(RecorderError::NoActiveSession) => {}
        Err(e) => error!("Failed to stop active session on shutdown: {}", e),
    }

    Ok(())
}

fn print_devices() {
    let devices = list_input_devices();
    if devices.is_empty() {
        println!("No audio input devices found");
        return;
    }
    for device in devices {
        println!("{}", device);
    }
}

fn print_chunks(config: &RecorderConfig, session_id: &str) -> Result<()> {
    let chunks = list_session_chunks(&config.audio_dir, session_id)?;
    if chunks.is_empty() {
        println!("No chunks found for session {}", session_id);
        return Ok(());
    }

    let mut total = 0.0;
    for path in &chunks {
        let audio = AudioFile::open(path)?;
        total += audio.duration_seconds;
        println!("{}  {:.1}s", path.display(), audio.duration_seconds);
    }
    println!("{} chunks, {:.1}s total", chunks.len(), total);

    Ok(())
}

fn report_devices(err: &RecorderError) {
    if let RecorderError::DeviceUnavailable { candidates, .. } = err {
        if candidates.is_empty() {
            eprintln!("No audio input devices detected; check the microphone connection.");
        } else {
            eprintln!("Available input devices:");
            for device in candidates {
                eprintln!("  {}", device);
            }
        }
    }
}
