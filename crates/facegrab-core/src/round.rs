//! Round state machine: `Idle → Running → Ended`, replayable via `start`.
//!
//! The controller never reads the clock itself. Callers pass `now` into
//! [`RoundController::start`] and [`RoundController::tick`], which keeps every
//! transition deterministic under test.

use crate::hit_test::overlaps;
use crate::placement::{check_frame, PlacementError, TargetPlacer, PLACEMENT_MARGIN};
use crate::types::{FrameSize, Rect};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Default round length.
pub const DEFAULT_ROUND_DURATION: Duration = Duration::from_secs(60);
/// Default side length of the square target, in pixels.
pub const DEFAULT_TARGET_SIZE: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Ended,
}

/// What the presentation layer renders each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub score: u32,
    pub high_score: u32,
    pub remaining: Duration,
    pub target: Rect,
}

impl RoundSnapshot {
    /// Remaining time truncated to whole seconds, as shown on the HUD.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining.as_secs()
    }
}

/// Final result of a round, reported once it has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub final_score: u32,
    pub high_score: u32,
    /// The round pushed the high score above the value it started with.
    pub new_high_score: bool,
    /// The player left before the timer ran out.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No round has been started yet.
    Idle,
    Running {
        snapshot: RoundSnapshot,
        /// A detection hit the target this tick; fire the audio cue.
        scored: bool,
    },
    Ended(RoundSummary),
}

#[derive(Debug, Clone, Copy)]
struct RoundState {
    score: u32,
    high_score: u32,
    initial_high_score: u32,
    started_at: Instant,
    duration: Duration,
    target: Rect,
}

impl RoundState {
    fn summary(&self, cancelled: bool) -> RoundSummary {
        RoundSummary {
            final_score: self.score,
            high_score: self.high_score,
            new_high_score: self.high_score > self.initial_high_score,
            cancelled,
        }
    }

    fn snapshot(&self, elapsed: Duration) -> RoundSnapshot {
        RoundSnapshot {
            score: self.score,
            high_score: self.high_score,
            remaining: self.duration.saturating_sub(elapsed),
            target: self.target,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Running(RoundState),
    Ended(RoundSummary),
}

/// Drives one timed round at a time against a stream of detection sets.
pub struct RoundController<R = StdRng> {
    frame: FrameSize,
    target_size: i32,
    placer: TargetPlacer<R>,
    state: State,
}

impl<R: Rng> RoundController<R> {
    /// Create an idle controller for frames of the given size.
    ///
    /// Fails if the frame leaves no room for placement or the target size
    /// is not positive.
    pub fn new(
        frame: FrameSize,
        target_size: i32,
        placer: TargetPlacer<R>,
    ) -> Result<Self, PlacementError> {
        check_frame(frame)?;
        if target_size <= 0 {
            return Err(PlacementError::InvalidTargetSize {
                width: target_size,
                height: target_size,
            });
        }
        Ok(Self {
            frame,
            target_size,
            placer,
            state: State::Idle,
        })
    }

    /// Begin a new round. Valid from any phase; a running round is discarded.
    pub fn start(
        &mut self,
        duration: Duration,
        initial_high_score: u32,
        now: Instant,
    ) -> Result<(), PlacementError> {
        let target = self.next_target()?;
        self.state = State::Running(RoundState {
            score: 0,
            high_score: initial_high_score,
            initial_high_score,
            started_at: now,
            duration,
            target,
        });
        tracing::info!(
            duration_secs = duration.as_secs_f32(),
            high_score = initial_high_score,
            x = target.x,
            y = target.y,
            "round started"
        );
        Ok(())
    }

    /// Advance the round by one frame's worth of detections.
    pub fn tick(&mut self, detections: &[Rect], now: Instant) -> TickOutcome {
        let round = match &mut self.state {
            State::Idle => return TickOutcome::Idle,
            State::Ended(summary) => return TickOutcome::Ended(*summary),
            State::Running(round) => round,
        };

        let elapsed = now.saturating_duration_since(round.started_at);
        if elapsed >= round.duration {
            let summary = round.summary(false);
            tracing::info!(
                score = summary.final_score,
                high_score = summary.high_score,
                new_high_score = summary.new_high_score,
                "round finished"
            );
            self.state = State::Ended(summary);
            return TickOutcome::Ended(summary);
        }

        let scored = overlaps(&round.target, detections);
        if scored {
            round.score += 1;
            if round.score > round.high_score {
                round.high_score = round.score;
            }
            match self.placer.place(self.frame, self.target_size, self.target_size) {
                Ok(target) => round.target = target,
                Err(e) => {
                    tracing::warn!(error = %e, "could not relocate target; keeping current position")
                }
            }
            tracing::debug!(
                score = round.score,
                x = round.target.x,
                y = round.target.y,
                "target hit"
            );
        }

        TickOutcome::Running {
            snapshot: round.snapshot(elapsed),
            scored,
        }
    }

    /// End the running round early. No effect in any other phase.
    pub fn cancel(&mut self) {
        if let State::Running(round) = &self.state {
            let summary = round.summary(true);
            tracing::info!(score = summary.final_score, "round cancelled");
            self.state = State::Ended(summary);
        }
    }

    /// Adopt new frame dimensions.
    ///
    /// A frame too small for placement is rejected and the previous bounds
    /// stay in effect. Otherwise the current target is clamped back into the
    /// placement range of the new frame.
    pub fn resize(&mut self, frame: FrameSize) -> Result<(), PlacementError> {
        if frame == self.frame {
            return Ok(());
        }
        check_frame(frame)?;
        tracing::warn!(old = %self.frame, new = %frame, "frame size changed");
        self.frame = frame;

        if let State::Running(round) = &mut self.state {
            let max_x = (frame.width - PLACEMENT_MARGIN) as i32 - 1;
            let max_y = (frame.height - PLACEMENT_MARGIN) as i32 - 1;
            round.target.x = round.target.x.clamp(0, max_x);
            round.target.y = round.target.y.clamp(0, max_y);
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Running(_) => Phase::Running,
            State::Ended(_) => Phase::Ended,
        }
    }

    /// Current target while a round is running.
    pub fn target(&self) -> Option<Rect> {
        match &self.state {
            State::Running(round) => Some(round.target),
            _ => None,
        }
    }

    /// Score of the running or most recently ended round.
    pub fn score(&self) -> u32 {
        match &self.state {
            State::Idle => 0,
            State::Running(round) => round.score,
            State::Ended(summary) => summary.final_score,
        }
    }

    pub fn summary(&self) -> Option<RoundSummary> {
        match &self.state {
            State::Ended(summary) => Some(*summary),
            _ => None,
        }
    }

    /// Render state of the running round at `now`, without advancing it.
    pub fn snapshot(&self, now: Instant) -> Option<RoundSnapshot> {
        match &self.state {
            State::Running(round) => {
                Some(round.snapshot(now.saturating_duration_since(round.started_at)))
            }
            _ => None,
        }
    }

    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    fn next_target(&mut self) -> Result<Rect, PlacementError> {
        self.placer
            .place(self.frame, self.target_size, self.target_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: FrameSize = FrameSize {
        width: 640,
        height: 480,
    };

    fn controller() -> RoundController {
        RoundController::new(FRAME, DEFAULT_TARGET_SIZE, TargetPlacer::seeded(1234)).unwrap()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn far_away() -> Rect {
        // Entirely below the placement range, so never overlaps a target.
        Rect::new(0, 460, 10, 10).unwrap()
    }

    #[test]
    fn test_idle_until_started() {
        let mut ctl = controller();
        assert_eq!(ctl.phase(), Phase::Idle);
        assert_eq!(ctl.tick(&[], Instant::now()), TickOutcome::Idle);
        assert!(ctl.target().is_none());
        assert_eq!(ctl.score(), 0);
    }

    #[test]
    fn test_full_round_scenario() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 5, t0).unwrap();
        assert_eq!(ctl.phase(), Phase::Running);

        let first = ctl.target().unwrap();
        match ctl.tick(&[first], t0) {
            TickOutcome::Running { snapshot, scored } => {
                assert!(scored);
                assert_eq!(snapshot.score, 1);
                assert_eq!(snapshot.high_score, 5);
                assert_eq!(snapshot.remaining, secs(60));
                assert_ne!(snapshot.target, first);
            }
            other => panic!("expected running, got {other:?}"),
        }

        for i in 1..=5 {
            let target = ctl.target().unwrap();
            let outcome = ctl.tick(&[far_away(), target], t0 + secs(i));
            assert!(matches!(outcome, TickOutcome::Running { scored: true, .. }));
        }
        assert_eq!(ctl.score(), 6);
        let snap = ctl.snapshot(t0 + secs(10)).unwrap();
        assert_eq!(snap.high_score, 6);
        assert_eq!(snap.remaining_secs(), 50);

        let ended = ctl.tick(&[], t0 + secs(60));
        let expected = RoundSummary {
            final_score: 6,
            high_score: 6,
            new_high_score: true,
            cancelled: false,
        };
        assert_eq!(ended, TickOutcome::Ended(expected));
        assert_eq!(ctl.phase(), Phase::Ended);

        // Ended is terminal until the next start.
        let stale = Rect::new(0, 0, 640, 480).unwrap();
        assert_eq!(ctl.tick(&[stale], t0 + secs(61)), TickOutcome::Ended(expected));
        assert_eq!(ctl.summary(), Some(expected));
        assert_eq!(ctl.score(), 6);
    }

    #[test]
    fn test_miss_keeps_target() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 0, t0).unwrap();
        let target = ctl.target().unwrap();

        match ctl.tick(&[far_away()], t0 + Duration::from_millis(33)) {
            TickOutcome::Running { snapshot, scored } => {
                assert!(!scored);
                assert_eq!(snapshot.score, 0);
                assert_eq!(snapshot.target, target);
            }
            other => panic!("expected running, got {other:?}"),
        }
        assert!(matches!(
            ctl.tick(&[], t0 + secs(1)),
            TickOutcome::Running { scored: false, .. }
        ));
    }

    #[test]
    fn test_edge_touch_is_a_miss() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 0, t0).unwrap();
        let t = ctl.target().unwrap();
        let touching = Rect::new(t.right(), t.y, 30, 30).unwrap();
        assert!(matches!(
            ctl.tick(&[touching], t0),
            TickOutcome::Running { scored: false, .. }
        ));
    }

    #[test]
    fn test_one_point_per_tick() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 0, t0).unwrap();
        let t = ctl.target().unwrap();
        ctl.tick(&[t, t, t], t0);
        assert_eq!(ctl.score(), 1);
    }

    #[test]
    fn test_no_new_high_score_below_initial() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(30), 10, t0).unwrap();
        let t = ctl.target().unwrap();
        ctl.tick(&[t], t0);
        match ctl.tick(&[], t0 + secs(30)) {
            TickOutcome::Ended(summary) => {
                assert_eq!(summary.final_score, 1);
                assert_eq!(summary.high_score, 10);
                assert!(!summary.new_high_score);
            }
            other => panic!("expected ended, got {other:?}"),
        }
    }

    #[test]
    fn test_equal_score_is_not_new_high() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(30), 1, t0).unwrap();
        let t = ctl.target().unwrap();
        ctl.tick(&[t], t0);
        ctl.cancel();
        let summary = ctl.summary().unwrap();
        assert_eq!(summary.high_score, 1);
        assert!(!summary.new_high_score);
    }

    #[test]
    fn test_cancel_idempotent() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 0, t0).unwrap();
        let t = ctl.target().unwrap();
        ctl.tick(&[t], t0);

        ctl.cancel();
        let first = ctl.summary().unwrap();
        assert!(first.cancelled);
        assert_eq!(first.final_score, 1);

        ctl.cancel();
        assert_eq!(ctl.summary(), Some(first));
        assert_eq!(ctl.tick(&[], t0 + secs(1)), TickOutcome::Ended(first));
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let mut ctl = controller();
        ctl.cancel();
        assert_eq!(ctl.phase(), Phase::Idle);
    }

    #[test]
    fn test_replay_resets_score() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(10), 0, t0).unwrap();
        let t = ctl.target().unwrap();
        ctl.tick(&[t], t0);
        ctl.tick(&[], t0 + secs(10));
        assert_eq!(ctl.phase(), Phase::Ended);

        let t1 = t0 + secs(20);
        ctl.start(secs(10), 1, t1).unwrap();
        assert_eq!(ctl.phase(), Phase::Running);
        assert_eq!(ctl.score(), 0);
        match ctl.tick(&[], t1 + secs(9)) {
            TickOutcome::Running { snapshot, .. } => {
                assert_eq!(snapshot.high_score, 1);
                assert_eq!(snapshot.remaining_secs(), 1);
            }
            other => panic!("expected running, got {other:?}"),
        }
    }

    #[test]
    fn test_clock_before_start_saturates() {
        let mut ctl = controller();
        let t0 = Instant::now() + secs(5);
        ctl.start(secs(60), 0, t0).unwrap();
        match ctl.tick(&[], t0 - secs(1)) {
            TickOutcome::Running { snapshot, .. } => assert_eq!(snapshot.remaining, secs(60)),
            other => panic!("expected running, got {other:?}"),
        }
    }

    #[test]
    fn test_same_seed_same_targets() {
        let mut a = controller();
        let mut b = controller();
        let t0 = Instant::now();
        a.start(secs(60), 0, t0).unwrap();
        b.start(secs(60), 0, t0).unwrap();
        for i in 0..10 {
            assert_eq!(a.target(), b.target());
            let ta = a.target().unwrap();
            let tb = b.target().unwrap();
            a.tick(&[ta], t0 + secs(i));
            b.tick(&[tb], t0 + secs(i));
        }
    }

    #[test]
    fn test_new_rejects_small_frame() {
        let err = RoundController::new(FrameSize::new(100, 480), 60, TargetPlacer::seeded(0))
            .err()
            .unwrap();
        assert!(matches!(err, PlacementError::FrameTooSmall { .. }));
    }

    #[test]
    fn test_new_rejects_bad_target_size() {
        assert!(RoundController::new(FRAME, 0, TargetPlacer::seeded(0)).is_err());
    }

    #[test]
    fn test_resize_reclamps_target() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 0, t0).unwrap();

        ctl.resize(FrameSize::new(160, 120)).unwrap();
        let t = ctl.target().unwrap();
        assert!(t.x >= 0 && t.x < 60);
        assert!(t.y >= 0 && t.y < 20);
        assert_eq!(ctl.frame(), FrameSize::new(160, 120));

        // New targets come from the new bounds.
        ctl.tick(&[t], t0);
        let t = ctl.target().unwrap();
        assert!(t.x < 60 && t.y < 20);
    }

    #[test]
    fn test_resize_to_degenerate_frame_rejected() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.start(secs(60), 0, t0).unwrap();
        let before = ctl.target();
        assert!(ctl.resize(FrameSize::new(80, 80)).is_err());
        assert_eq!(ctl.frame(), FRAME);
        assert_eq!(ctl.target(), before);
    }
}
