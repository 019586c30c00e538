use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use facelink::artifacts::{ArtifactStore, shapes_csv};
use facelink::cli::{Cli, Commands};
use facelink::config::Config;
use facelink::daemon::run_daemon;
use facelink::defaults::OUTPUT_DIM;
use facelink::frame::{Frame, FrameSequence};
use facelink::inference::build_generator;
use facelink::ipc::client::send_command;
use facelink::ipc::protocol::{Command, Response};
use facelink::ipc::server::IpcServer;
use facelink::pipeline::PostProcessor;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let socket = cli.socket.clone();
    match cli.command {
        Commands::Daemon => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            tracing::info!(version = %facelink::version_string(), "starting daemon");
            run_daemon(config, socket).await?;
        }
        Commands::Submit { file } => {
            let audio = read_audio(&file)?;
            handle_ipc_command(socket, Command::submit(&audio)).await?;
        }
        Commands::Clear => {
            handle_ipc_command(socket, Command::Clear).await?;
        }
        Commands::Status => {
            handle_ipc_command(socket, Command::Status).await?;
        }
        Commands::Shapes { file, output } => {
            let audio = read_audio(&file)?;
            handle_shapes(socket, &audio, output.as_deref()).await?;
        }
        Commands::Regen { dir } => {
            let config = load_config(cli.config.as_deref())?;
            handle_regen(config, dir).await?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Shutdown => {
            handle_ipc_command(socket, Command::Shutdown).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "facelink",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` and `-vv` raise the crate's level.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "facelink=info",
        1 => "facelink=debug",
        _ => "facelink=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/facelink/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

fn read_audio(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = facelink::audio::list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    bail!("facelink was built without audio output support (cpal-audio feature)")
}

/// Rebuild stored shapes with the configured generator.
///
/// Runs on the blocking pool: remote generators use a blocking HTTP client.
async fn handle_regen(config: Config, dir: Option<PathBuf>) -> Result<()> {
    let root = dir.unwrap_or_else(|| config.artifacts.resolved_dir());
    if !root.is_dir() {
        bail!("No artifact directory at {}", root.display());
    }

    let summary = tokio::task::spawn_blocking(move || -> facelink::Result<_> {
        let generator = build_generator(&config.inference)?;
        let post = PostProcessor::new(config.animation.output_dim, config.animation.smoothing)?;
        ArtifactStore::new(root).regenerate(generator.as_ref(), &post)
    })
    .await??;

    println!(
        "{} regenerated, {} skipped, {} failed",
        summary.regenerated.to_string().green(),
        summary.skipped,
        if summary.failed > 0 {
            summary.failed.to_string().red().to_string()
        } else {
            summary.failed.to_string()
        }
    );
    Ok(())
}

async fn handle_shapes(
    socket: Option<PathBuf>,
    audio: &[u8],
    output: Option<&Path>,
) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);
    let response = send_command(&socket_path, Command::shapes(audio))
        .await
        .context("Failed to communicate with daemon")?;

    let rows = match response {
        Response::Blendshapes { frames } => frames,
        Response::Error { message } => bail!("{}", message),
        other => bail!("Unexpected response: {:?}", other),
    };

    if rows.is_empty() {
        eprintln!("{}", "Audio too short to animate".yellow());
        return Ok(());
    }

    match output {
        Some(path) => {
            let frames = rows_to_frames(rows)?;
            std::fs::write(path, shapes_csv(&frames))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} {} frames to {}",
                "Wrote".green(),
                frames.len(),
                path.display()
            );
        }
        None => {
            for row in rows {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
    }
    Ok(())
}

fn rows_to_frames(rows: Vec<Vec<f32>>) -> Result<FrameSequence> {
    let frames = rows
        .into_iter()
        .map(|row| {
            let len = row.len();
            Frame::try_from(row).map_err(|_| {
                anyhow::anyhow!("Expected {} values per frame, got {}", OUTPUT_DIM, len)
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FrameSequence::new(frames))
}

async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => match response {
            Response::Ok => {
                println!("{}", "OK".green());
            }
            Response::Queued { id } => {
                println!("{} clip #{}", "Queued".green(), id);
            }
            Response::Cleared { requests, clips } => {
                println!(
                    "{} {} pending request(s), {} prepared clip(s)",
                    "Cleared".green(),
                    requests,
                    clips
                );
            }
            Response::Status { status } => {
                println!("{}", "Facelink daemon".bold());
                println!(
                    "  {}      {}",
                    "Idle:".dimmed(),
                    if status.idle_running {
                        "running".green().to_string()
                    } else {
                        "stopped".yellow().to_string()
                    }
                );
                if !status.workers_running || !status.accepting {
                    println!(
                        "  {} {}",
                        "Pipeline:".dimmed(),
                        "stopped, not accepting clips".red()
                    );
                }
                println!(
                    "  {}   {} request(s), {} clip(s)",
                    "Queued:".dimmed(),
                    status.pending_requests,
                    status.prepared_clips
                );
                println!(
                    "  {}  {} accepted, {} played, {} degraded, {} dropped, {} failed",
                    "Totals:".dimmed(),
                    status.accepted,
                    status.played,
                    status.degraded,
                    status.dropped,
                    status.failed
                );
            }
            Response::Blendshapes { frames } => {
                println!("{} frames", frames.len());
            }
            Response::Error { message } => {
                eprintln!("{}", format!("Error: {}", message).red());
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: facelink daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}
