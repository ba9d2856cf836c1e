use crate::config::Config;
use crate::game::{Game, Intent, SessionStats, SystemClock};
use crate::screen::{Cue, SilentCue, TerminalBell, TerminalScreen};
use facegrab_core::{FaceDetector, FileScoreStore, MemoryScoreStore, PlacementError, ScoreStore};
use facegrab_hw::{Camera, FrameSource};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] facegrab_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] facegrab_core::DetectorError),
    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

/// Open the camera and load the detector, then run the game on a dedicated
/// OS thread.
///
/// Resources are acquired before the thread starts so that a missing camera
/// or model fails fast on the caller's side.
pub fn spawn_engine(
    config: &Config,
    mut intents: mpsc::Receiver<Intent>,
) -> Result<JoinHandle<Result<SessionStats, EngineError>>, EngineError> {
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let model_path = config.detector_model_path();
    let mut detector =
        FaceDetector::load(&model_path)?.with_confidence_threshold(config.confidence_threshold);
    tracing::info!(path = %model_path, "face detector loaded");

    let store: Box<dyn ScoreStore + Send> = if config.save_scores {
        Box::new(FileScoreStore::new(&config.score_path))
    } else {
        tracing::info!("score saving disabled; high score lives for this session only");
        let initial = FileScoreStore::new(&config.score_path).load();
        Box::new(MemoryScoreStore::new(initial))
    };
    let mut cue: Box<dyn Cue + Send> = if config.sound {
        Box::new(TerminalBell)
    } else {
        Box::new(SilentCue)
    };

    let settings = config.game_settings();
    let warmup_frames = config.warmup_frames;

    std::thread::Builder::new()
        .name("facegrab-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut frames = camera.stream()?;

            // Let auto exposure settle before the first real frame.
            for _ in 0..warmup_frames {
                let _ = frames.next_frame();
            }

            let mut screen = TerminalScreen::stdout();
            let result = Game {
                frames: &mut frames,
                detector: &mut detector,
                store: store.as_ref(),
                screen: &mut screen,
                cue: cue.as_mut(),
                clock: &mut SystemClock,
                settings,
            }
            .run(&mut intents);
            tracing::info!("engine thread exiting");
            result
        })
        .map_err(EngineError::Spawn)
}
