//! facegrab-hw: Webcam capture.
//!
//! V4L2 streaming capture with YUYV/GREY to grayscale conversion and
//! dark-frame classification.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, FrameSource, PixelFormat};
pub use frame::Frame;
