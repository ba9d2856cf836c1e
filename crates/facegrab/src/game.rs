//! Menu → round → game-over loop.
//!
//! Pulls frames, runs detection and ticks the [`RoundController`]. Player
//! intents arrive on a channel: blocking waits on the menu and game-over
//! screens, non-blocking polls once per frame during a round.

use crate::engine::EngineError;
use crate::screen::{Cue, Screen};
use crate::snapshot;
use facegrab_core::{
    DetectFaces, FrameSize, Rect, RoundController, RoundSummary, ScoreStore, TargetPlacer,
    TickOutcome,
};
use facegrab_hw::{Frame, FrameSource};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// What the player asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Start a round / play again.
    Confirm,
    /// Leave the current screen: end the round early, or exit from a menu.
    Cancel,
    /// Exit immediately.
    Quit,
}

impl Intent {
    /// Map one line of terminal input. Unknown input is ignored.
    pub fn from_line(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => Some(Self::Confirm),
            "q" | "quit" | "esc" | "exit" => Some(Self::Cancel),
            _ => None,
        }
    }
}

pub trait Clock {
    fn now(&mut self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
pub struct GameSettings {
    pub round_duration: Duration,
    pub target_size: i32,
    /// Fixed placement seed; random per process when unset.
    pub seed: Option<u64>,
    /// Where to dump the last frame of each round, if anywhere.
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub rounds: u32,
    pub best_score: u32,
}

struct RoundEnd {
    summary: RoundSummary,
    quit: bool,
}

/// The game's collaborators, borrowed for the length of a session.
pub struct Game<'a> {
    pub frames: &'a mut dyn FrameSource,
    pub detector: &'a mut dyn DetectFaces,
    pub store: &'a dyn ScoreStore,
    pub screen: &'a mut dyn Screen,
    pub cue: &'a mut dyn Cue,
    pub clock: &'a mut dyn Clock,
    pub settings: GameSettings,
}

impl Game<'_> {
    /// Run menus and rounds until the player leaves.
    ///
    /// Only a failure to capture the very first frame is fatal; later capture
    /// and detection errors degrade to empty detection sets.
    pub fn run(&mut self, intents: &mut mpsc::Receiver<Intent>) -> Result<SessionStats, EngineError> {
        let first = self.frames.next_frame()?;
        let frame = FrameSize::new(first.width, first.height);
        let placer = match self.settings.seed {
            Some(seed) => TargetPlacer::seeded(seed),
            None => TargetPlacer::from_entropy(),
        };
        let mut controller = RoundController::new(frame, self.settings.target_size, placer)?;
        tracing::info!(%frame, seed = ?self.settings.seed, "game ready");

        let mut stats = SessionStats::default();
        loop {
            let high_score = self.store.load();
            self.screen.menu(high_score);
            if intents.blocking_recv() != Some(Intent::Confirm) {
                break;
            }

            stats.rounds += 1;
            let end = self.play_round(&mut controller, high_score, stats.rounds, intents)?;
            stats.best_score = stats.best_score.max(end.summary.final_score);

            if end.summary.new_high_score {
                if let Err(e) = self.store.save(end.summary.high_score) {
                    tracing::warn!(error = %e, "could not save high score");
                }
            }
            self.screen.game_over(&end.summary);

            if end.quit || intents.blocking_recv() != Some(Intent::Confirm) {
                break;
            }
        }

        tracing::info!(rounds = stats.rounds, best = stats.best_score, "session over");
        Ok(stats)
    }

    fn play_round(
        &mut self,
        controller: &mut RoundController,
        high_score: u32,
        round: u32,
        intents: &mut mpsc::Receiver<Intent>,
    ) -> Result<RoundEnd, EngineError> {
        controller.start(self.settings.round_duration, high_score, self.clock.now())?;

        let mut quit = false;
        let mut last: Option<(Frame, Vec<Rect>, Rect)> = None;
        let summary = loop {
            match intents.try_recv() {
                Ok(Intent::Cancel) => controller.cancel(),
                Ok(Intent::Quit) | Err(TryRecvError::Disconnected) => {
                    quit = true;
                    controller.cancel();
                }
                Ok(Intent::Confirm) | Err(TryRecvError::Empty) => {}
            }
            if let Some(summary) = controller.summary() {
                break summary;
            }

            let (frame, faces) = self.capture(controller);
            match controller.tick(&faces, self.clock.now()) {
                TickOutcome::Running { snapshot, scored } => {
                    if scored {
                        self.cue.scored();
                    }
                    self.screen.hud(&snapshot, &faces);
                    if let Some(frame) = frame {
                        last = Some((frame, faces, snapshot.target));
                    }
                }
                TickOutcome::Ended(summary) => break summary,
                TickOutcome::Idle => unreachable!("round started above"),
            }
        };

        if let (Some(dir), Some((frame, faces, target))) = (&self.settings.snapshot_dir, &last) {
            match snapshot::save(dir, round, frame, target, faces) {
                Ok(path) => tracing::info!(path = %path.display(), "round snapshot written"),
                Err(e) => tracing::warn!(error = %e, "could not write round snapshot"),
            }
        }

        Ok(RoundEnd { summary, quit })
    }

    /// Grab one frame and detect faces in it.
    fn capture(&mut self, controller: &mut RoundController) -> (Option<Frame>, Vec<Rect>) {
        let frame = match self.frames.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed");
                return (None, Vec::new());
            }
        };

        if let Err(e) = controller.resize(FrameSize::new(frame.width, frame.height)) {
            tracing::warn!(error = %e, "ignoring frame size change");
        }

        if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "dark frame, skipping detection");
            return (Some(frame), Vec::new());
        }

        let faces = match self.detector.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed");
                Vec::new()
            }
        };
        (Some(frame), faces)
    }
}
