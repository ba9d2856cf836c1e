//! facegrab-core: game logic and face detection.
//!
//! Hit testing, target placement and the round state machine are pure and
//! clock-free; the SCRFD detector runs via ONNX Runtime on CPU.

pub mod detector;
pub mod placement;
pub mod round;
pub mod score_store;
pub mod types;

pub use detector::{DetectFaces, DetectorError, FaceDetector};
pub use hit_test::overlaps;
pub use placement::{PlacementError, TargetPlacer, PLACEMENT_MARGIN};
pub use round::{Phase, RoundController, RoundSnapshot, RoundSummary, TickOutcome};
pub use score_store::{FileScoreStore, MemoryScoreStore, ScoreStore, ScoreStoreError};
pub use types::{FrameSize, Rect};
