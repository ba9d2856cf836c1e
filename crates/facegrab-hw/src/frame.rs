//! Captured frame type and grayscale conversion.

use std::time::Instant;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Build a frame from grayscale pixels captured now, classifying darkness.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&data, DARK_FRAME_THRESHOLD);
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
            is_dark,
        }
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("is_dark", &self.is_dark)
            .finish_non_exhaustive()
    }
}

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// True if more than `threshold_pct` of pixels are below 32.
///
/// A covered lens or an unlit room; detection is skipped for such frames.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
