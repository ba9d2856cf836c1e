//! PNG dump of a round's last frame with the target and faces drawn on it.

use facegrab_core::{FrameSize, Rect};
use facegrab_hw::Frame;
use image::{GrayImage, ImageError, Luma};
use std::path::{Path, PathBuf};

const TARGET_SHADE: Luma<u8> = Luma([255]);
const FACE_SHADE: Luma<u8> = Luma([0]);
const FACE_OUTLINE: i32 = 2;

/// Draw the target (filled) and each face (outlined) over the frame.
///
/// Returns `None` if the frame buffer does not match its dimensions.
pub fn render(frame: &Frame, target: &Rect, faces: &[Rect]) -> Option<GrayImage> {
    let mut img = GrayImage::from_raw(frame.width, frame.height, frame.data.clone())?;
    let size = FrameSize::new(frame.width, frame.height);

    for face in faces {
        outline(&mut img, size, face, FACE_OUTLINE, FACE_SHADE);
    }
    fill(&mut img, size, target, TARGET_SHADE);
    Some(img)
}

/// Write `round-<n>.png` into `dir`, creating it if needed.
pub fn save(
    dir: &Path,
    round: u32,
    frame: &Frame,
    target: &Rect,
    faces: &[Rect],
) -> Result<PathBuf, ImageError> {
    let img = render(frame, target, faces).ok_or_else(|| {
        ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "frame buffer of {} bytes does not match {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            ),
        ))
    })?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("round-{round}.png"));
    img.save(&path)?;
    Ok(path)
}

fn fill(img: &mut GrayImage, size: FrameSize, rect: &Rect, shade: Luma<u8>) {
    let Some(r) = rect.clip_to(size) else {
        return;
    };
    for y in r.y..r.bottom() {
        for x in r.x..r.right() {
            img.put_pixel(x as u32, y as u32, shade);
        }
    }
}

fn outline(img: &mut GrayImage, size: FrameSize, rect: &Rect, thickness: i32, shade: Luma<u8>) {
    let t = thickness.min(rect.width).min(rect.height);
    let edges = [
        Rect::new(rect.x, rect.y, rect.width, t),
        Rect::new(rect.x, rect.bottom() - t, rect.width, t),
        Rect::new(rect.x, rect.y, t, rect.height),
        Rect::new(rect.right() - t, rect.y, t, rect.height),
    ];
    for edge in edges.into_iter().flatten() {
        fill(img, size, &edge, shade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32) -> Frame {
        Frame::from_gray(vec![100; (w * h) as usize], w, h, 0)
    }

    #[test]
    fn test_render_target_and_face() {
        let f = frame(200, 150);
        let target = Rect::new(10, 10, 20, 20).unwrap();
        let face = Rect::new(100, 50, 40, 40).unwrap();
        let img = render(&f, &target, &[face]).unwrap();

        assert_eq!(img.get_pixel(15, 15), &Luma([255]));
        assert_eq!(img.get_pixel(100, 50), &Luma([0]));
        assert_eq!(img.get_pixel(139, 89), &Luma([0]));
        // Face interior untouched.
        assert_eq!(img.get_pixel(120, 70), &Luma([100]));
        assert_eq!(img.get_pixel(5, 5), &Luma([100]));
    }

    #[test]
    fn test_render_clips_offscreen() {
        let f = frame(120, 120);
        let target = Rect::new(100, 100, 60, 60).unwrap();
        let face = Rect::new(-30, -30, 50, 50).unwrap();
        let img = render(&f, &target, &[face]).unwrap();
        assert_eq!(img.get_pixel(119, 119), &Luma([255]));
        assert_eq!(img.get_pixel(19, 0), &Luma([0]));
    }

    #[test]
    fn test_render_bad_buffer() {
        let mut f = frame(10, 10);
        f.data.truncate(50);
        assert!(render(&f, &Rect::new(0, 0, 2, 2).unwrap(), &[]).is_none());
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shots");
        let path = save(&out, 3, &frame(64, 48), &Rect::new(0, 0, 8, 8).unwrap(), &[]).unwrap();
        assert_eq!(path, out.join("round-3.png"));
        let back = image::open(&path).unwrap().to_luma8();
        assert_eq!(back.dimensions(), (64, 48));
        assert_eq!(back.get_pixel(1, 1), &Luma([255]));
    }
}
