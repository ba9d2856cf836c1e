//! Random target placement inside the camera frame.
//!
//! Positions are drawn from `[0, width - PLACEMENT_MARGIN) × [0, height - PLACEMENT_MARGIN)`.
//! The margin is a fixed constant and does not follow the target size.

use crate::types::{FrameSize, Rect};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Pixels excluded from the right and bottom edges when placing a target.
pub const PLACEMENT_MARGIN: u32 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("frame {frame} too small for placement: both sides must exceed {margin}px")]
    FrameTooSmall { frame: FrameSize, margin: u32 },
    #[error("invalid target size {width}x{height}")]
    InvalidTargetSize { width: i32, height: i32 },
}

/// Check that `frame` leaves a non-empty sampling range.
pub fn check_frame(frame: FrameSize) -> Result<(), PlacementError> {
    if frame.width <= PLACEMENT_MARGIN || frame.height <= PLACEMENT_MARGIN {
        return Err(PlacementError::FrameTooSmall {
            frame,
            margin: PLACEMENT_MARGIN,
        });
    }
    Ok(())
}

/// Draw a target rectangle using a caller-owned RNG.
pub fn place_with<R: Rng>(
    rng: &mut R,
    frame: FrameSize,
    target_width: i32,
    target_height: i32,
) -> Result<Rect, PlacementError> {
    check_frame(frame)?;
    let invalid = PlacementError::InvalidTargetSize {
        width: target_width,
        height: target_height,
    };
    if target_width <= 0 || target_height <= 0 {
        return Err(invalid);
    }

    let x = rng.gen_range(0..frame.width - PLACEMENT_MARGIN) as i32;
    let y = rng.gen_range(0..frame.height - PLACEMENT_MARGIN) as i32;
    Rect::new(x, y, target_width, target_height).ok_or(invalid)
}

/// Source of new target positions. Owns its RNG.
pub struct TargetPlacer<R = StdRng> {
    rng: R,
}

impl TargetPlacer<StdRng> {
    /// Reproducible placer: the same seed yields the same sequence of positions.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> TargetPlacer<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn place(
        &mut self,
        frame: FrameSize,
        target_width: i32,
        target_height: i32,
    ) -> Result<Rect, PlacementError> {
        place_with(&mut self.rng, frame, target_width, target_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_within_bounds() {
        let frame = FrameSize::new(640, 480);
        let mut placer = TargetPlacer::seeded(7);
        for _ in 0..2000 {
            let r = placer.place(frame, 60, 60).unwrap();
            assert!(r.x >= 0 && r.x < 540, "x out of range: {}", r.x);
            assert!(r.y >= 0 && r.y < 380, "y out of range: {}", r.y);
            assert_eq!((r.width, r.height), (60, 60));
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let frame = FrameSize::new(1280, 720);
        let mut a = TargetPlacer::seeded(42);
        let mut b = TargetPlacer::seeded(42);
        let seq_a: Vec<Rect> = (0..32).map(|_| a.place(frame, 60, 60).unwrap()).collect();
        let seq_b: Vec<Rect> = (0..32).map(|_| b.place(frame, 60, 60).unwrap()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let frame = FrameSize::new(1280, 720);
        let mut a = TargetPlacer::seeded(1);
        let mut b = TargetPlacer::seeded(2);
        let seq_a: Vec<Rect> = (0..32).map(|_| a.place(frame, 60, 60).unwrap()).collect();
        let seq_b: Vec<Rect> = (0..32).map(|_| b.place(frame, 60, 60).unwrap()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn test_margin_ignores_target_size() {
        // 150px target in a 201px frame: x may land in [0, 101), so the
        // target can extend past the right edge.
        let frame = FrameSize::new(201, 201);
        let mut placer = TargetPlacer::seeded(3);
        for _ in 0..500 {
            let r = placer.place(frame, 150, 150).unwrap();
            assert!(r.x < 101 && r.y < 101);
        }
    }

    #[test]
    fn test_smallest_valid_frame() {
        let frame = FrameSize::new(101, 101);
        let mut placer = TargetPlacer::seeded(9);
        let r = placer.place(frame, 60, 60).unwrap();
        assert_eq!((r.x, r.y), (0, 0));
    }

    #[test]
    fn test_degenerate_frame_rejected() {
        let mut placer = TargetPlacer::seeded(0);
        for (w, h) in [(100, 480), (640, 100), (50, 50), (0, 0)] {
            let err = placer.place(FrameSize::new(w, h), 60, 60).unwrap_err();
            assert!(matches!(err, PlacementError::FrameTooSmall { margin: 100, .. }));
        }
    }

    #[test]
    fn test_invalid_target_size_rejected() {
        let mut placer = TargetPlacer::seeded(0);
        let err = placer.place(FrameSize::new(640, 480), 0, 60).unwrap_err();
        assert_eq!(err, PlacementError::InvalidTargetSize { width: 0, height: 60 });
    }

    #[test]
    fn test_place_with_borrowed_rng() {
        let mut rng = StdRng::seed_from_u64(11);
        let r = place_with(&mut rng, FrameSize::new(320, 240), 30, 40).unwrap();
        assert!(r.x < 220 && r.y < 140);
        assert_eq!((r.width, r.height), (30, 40));
    }
}
