use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use facegrab::config::Config;
use facegrab::engine;
use facegrab::game::Intent;
use facegrab_core::{DetectFaces, FaceDetector, FileScoreStore, ScoreStore};
use facegrab_hw::{Camera, FrameSource};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facegrab", about = "Webcam arcade game: grab the snack with your face")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/facegrab/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play: menu, 60-second rounds, game over, replay
    Play(PlayArgs),
    /// Show the stored high score
    Score {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset the stored high score to zero
    ResetScore,
    /// List V4L2 capture devices
    Devices,
    /// Run camera and detector diagnostics
    Test {
        /// Number of frames to capture
        #[arg(short, long, default_value_t = 10)]
        frames: usize,
    },
}

#[derive(Args, Default)]
struct PlayArgs {
    /// V4L2 device path
    #[arg(short, long)]
    device: Option<String>,
    /// Directory containing the SCRFD model
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Round length in seconds
    #[arg(long)]
    round_secs: Option<u64>,
    /// Side of the square target in pixels
    #[arg(long)]
    target_size: Option<i32>,
    /// Fixed seed for target placement
    #[arg(long)]
    seed: Option<u64>,
    /// Write the last frame of each round to this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Do not ring the terminal bell on points
    #[arg(long)]
    no_sound: bool,
    /// Keep high scores for this session only
    #[arg(long)]
    no_save: bool,
}

impl PlayArgs {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.device {
            config.camera_device = v;
        }
        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if let Some(v) = self.round_secs {
            config.round_secs = v;
        }
        if let Some(v) = self.target_size {
            config.target_size = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.snapshot_dir.is_some() {
            config.snapshot_dir = self.snapshot_dir;
        }
        if self.no_sound {
            config.sound = false;
        }
        if self.no_save {
            config.save_scores = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Play(args) => {
            args.apply(&mut config);
            config.validate()?;
            play(config).await?;
        }
        Commands::Score { json } => {
            let store = FileScoreStore::new(&config.score_path);
            let score = store.load();
            if json {
                let out = serde_json::json!({
                    "high_score": score,
                    "path": store.path(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Highest Score: {score}");
            }
        }
        Commands::ResetScore => {
            FileScoreStore::new(&config.score_path)
                .save(0)
                .context("resetting high score")?;
            println!("High score reset ({})", config.score_path.display());
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Test { frames } => diagnostics(&config, frames)?,
    }

    Ok(())
}

async fn play(config: Config) -> Result<()> {
    let (tx, rx) = mpsc::channel::<Intent>(16);
    let engine = engine::spawn_engine(&config, rx).context("starting game engine")?;

    // Terminal input on its own OS thread: a blocking stdin read must not
    // hold up runtime shutdown.
    let input_tx = tx.clone();
    std::thread::Builder::new()
        .name("facegrab-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let Some(intent) = Intent::from_line(&line) else {
                    tracing::debug!(%line, "ignoring input");
                    continue;
                };
                if input_tx.blocking_send(intent).is_err() {
                    return;
                }
            }
            let _ = input_tx.blocking_send(Intent::Quit);
        })
        .context("spawning input thread")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            let _ = tx.send(Intent::Quit).await;
        }
    });

    let joined = tokio::task::spawn_blocking(move || engine.join()).await?;
    let Ok(result) = joined else {
        bail!("game engine thread panicked");
    };
    let stats = result?;
    println!(
        "\nThanks for playing: {} round(s), best score {}",
        stats.rounds, stats.best_score
    );
    Ok(())
}

/// Capture a few frames and report what the detector sees in each.
fn diagnostics(config: &Config, count: usize) -> Result<()> {
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)
        .with_context(|| format!("opening {}", config.camera_device))?;
    println!(
        "Camera: {} {}x{} {:?}",
        camera.device_path,
        camera.width,
        camera.height,
        camera.pixel_format()
    );

    let model_path = config.detector_model_path();
    let mut detector = FaceDetector::load(&model_path)
        .with_context(|| format!("loading detector {model_path}"))?
        .with_confidence_threshold(config.confidence_threshold);

    let mut stream = camera.stream()?;
    for _ in 0..config.warmup_frames {
        let _ = stream.next_frame();
    }

    for _ in 0..count {
        let frame = stream.next_frame()?;
        if frame.is_dark {
            println!("frame {:>4}: dark (avg {:.1})", frame.sequence, frame.avg_brightness());
            continue;
        }
        let faces = detector.detect(&frame.data, frame.width, frame.height)?;
        println!(
            "frame {:>4}: avg {:.1}, {} face(s) {:?}",
            frame.sequence,
            frame.avg_brightness(),
            faces.len(),
            faces
        );
    }
    Ok(())
}
