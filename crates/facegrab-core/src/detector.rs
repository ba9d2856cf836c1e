//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the anchor-free SCRFD model over a letterboxed grayscale frame and
//! returns integer face rectangles in frame coordinates. Landmark outputs,
//! when the export has them, are ignored.

use crate::types::{FrameSize, Rect};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Default minimum score for a detection to be kept.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    BadFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that turns a grayscale frame into face rectangles.
pub trait DetectFaces {
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<Rect>, DetectorError>;
}

/// Maps letterboxed model coordinates back to the source frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: usize, height: usize, input: usize) -> Self {
        let scale = (input as f32 / width as f32).min(input as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (input as f32 - new_w) / 2.0,
            pad_y: (input as f32 - new_h) / 2.0,
        }
    }

    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// A decoded box in frame coordinates before NMS.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    fn to_rect(self, frame: FrameSize) -> Option<Rect> {
        let x = self.x1.round() as i32;
        let y = self.y1.round() as i32;
        let w = (self.x2.round() as i32) - x;
        let h = (self.y2.round() as i32) - y;
        Rect::new(x, y, w, h)?.clip_to(frame)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputs = (usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
    confidence_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(path = model_path, outputs = ?output_names, "loaded SCRFD model");

        // 6 outputs for box-only exports, 9 when keypoints are included.
        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = discover_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output mapping");

        Ok(Self {
            session,
            stride_outputs,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        })
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn run(&mut self, gray: &[u8], width: usize, height: usize) -> Result<Vec<Candidate>, DetectorError> {
        let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
        let input = preprocess(gray, width, height, &letterbox);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];
            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;
            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                self.confidence_threshold,
            ));
        }
        Ok(candidates)
    }
}

impl DetectFaces for FaceDetector {
    /// Faces sorted by descending confidence, clipped to the frame.
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<Rect>, DetectorError> {
        let (w, h) = (width as usize, height as usize);
        if gray.len() < w * h {
            return Err(DetectorError::BadFrame {
                expected: w * h,
                actual: gray.len(),
            });
        }
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.run(gray, w, h)?;
        let frame = FrameSize::new(width, height);
        Ok(nms(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .filter_map(|c| c.to_rect(frame))
            .collect())
    }
}

/// Letterbox the frame into a normalised 1×3×640×640 tensor.
///
/// Bilinear resize; padding uses the mean so it normalises to zero. The gray
/// channel is replicated into all three input channels.
fn preprocess(gray: &[u8], width: usize, height: usize, letterbox: &Letterbox) -> Array4<f32> {
    let size = SCRFD_INPUT_SIZE;
    let new_w = (width as f32 * letterbox.scale).round() as usize;
    let new_h = (height as f32 * letterbox.scale).round() as usize;
    let x_off = letterbox.pad_x.floor() as usize;
    let y_off = letterbox.pad_y.floor() as usize;
    let inv = 1.0 / letterbox.scale;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let inside = y >= y_off && y < y_off + new_h && x >= x_off && x < x_off + new_w;
            let pixel = if inside {
                sample_bilinear(
                    gray,
                    width,
                    height,
                    ((x - x_off) as f32 + 0.5) * inv - 0.5,
                    ((y - y_off) as f32 + 0.5) * inv - 0.5,
                )
            } else {
                SCRFD_MEAN
            };
            let v = (pixel - SCRFD_MEAN) / SCRFD_STD;
            for c in 0..3 {
                tensor[[0, c, y, x]] = v;
            }
        }
    }
    tensor
}

fn sample_bilinear(gray: &[u8], width: usize, height: usize, sx: f32, sy: f32) -> f32 {
    let x0 = (sx.floor() as i32).clamp(0, width as i32 - 1) as usize;
    let y0 = (sy.floor() as i32).clamp(0, height as i32 - 1) as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (sx - sx.floor()).clamp(0.0, 1.0);
    let fy = (sy - sy.floor()).clamp(0.0, 1.0);

    let px = |x: usize, y: usize| gray[y * width + x] as f32;
    let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
    let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Map stride slots to output tensors, by name when the export names them
/// `score_8`/`bbox_8`/..., otherwise positionally (scores first, then boxes).
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

/// Decode one stride level of score/bbox outputs into frame-space candidates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Candidate> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= threshold {
                return None;
            }
            let d = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * s;
            let cy = (cell / grid_w) as f32 * s;

            let (x1, y1) = letterbox.to_frame(cx - d[0] * s, cy - d[1] * s);
            let (x2, y2) = letterbox.to_frame(cx + d[2] * s, cy + d[3] * s);
            Some(Candidate { x1, y1, x2, y2, score })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if keep.iter().all(|k| k.iou(&c) <= iou_threshold) {
            keep.push(c);
        }
    }
    keep
}
