use crate::game::GameSettings;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Game configuration.
///
/// Layered, later wins: built-in defaults, the TOML config file, `FACEGRAB_*`
/// environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may negotiate another.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD model file name inside `model_dir`.
    pub detector_model: String,
    /// Minimum detector score for a face to count.
    pub confidence_threshold: f32,
    /// Path of the high-score record.
    pub score_path: PathBuf,
    /// Persist new high scores to `score_path`.
    pub save_scores: bool,
    pub round_secs: u64,
    /// Side length of the square target, in pixels.
    pub target_size: i32,
    /// Frames discarded after opening the camera (auto exposure settling).
    pub warmup_frames: usize,
    /// Ring the terminal bell on every point.
    pub sound: bool,
    /// Fixed seed for target placement.
    pub seed: Option<u64>,
    /// Write the last frame of each round here as PNG.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            model_dir: data_dir.join("models"),
            detector_model: "det_10g.onnx".to_string(),
            confidence_threshold: facegrab_core::detector::DEFAULT_CONFIDENCE_THRESHOLD,
            score_path: data_dir.join("scores.txt"),
            save_scores: true,
            round_secs: facegrab_core::round::DEFAULT_ROUND_DURATION.as_secs(),
            target_size: facegrab_core::round::DEFAULT_TARGET_SIZE,
            warmup_frames: 4,
            sound: true,
            seed: None,
            snapshot_dir: None,
        }
    }
}

impl Config {
    /// Load from `path` (must exist) or from the default config file if
    /// present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply `FACEGRAB_*` overrides. Unparsable numeric values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEGRAB_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACEGRAB_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEGRAB_SCORE_PATH") {
            self.score_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEGRAB_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FACEGRAB_SOUND") {
            self.sound = v != "0";
        }
        if let Some(v) = lookup("FACEGRAB_SEED").and_then(|v| v.parse().ok()) {
            self.seed = Some(v);
        }
        parse_into(&lookup, "FACEGRAB_ROUND_SECS", &mut self.round_secs);
        parse_into(&lookup, "FACEGRAB_TARGET_SIZE", &mut self.target_size);
        parse_into(&lookup, "FACEGRAB_CONFIDENCE", &mut self.confidence_threshold);
        parse_into(&lookup, "FACEGRAB_WARMUP_FRAMES", &mut self.warmup_frames);
    }

    /// Reject values the game cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.round_secs == 0 {
            bail!("round_secs must be at least 1");
        }
        if self.target_size <= 0 {
            bail!("target_size must be positive, got {}", self.target_size);
        }
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be in [0, 1), got {}",
                self.confidence_threshold
            );
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            round_duration: Duration::from_secs(self.round_secs),
            target_size: self.target_size,
            seed: self.seed,
            snapshot_dir: self.snapshot_dir.clone(),
        }
    }
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

fn home_relative(xdg_var: &str, fallback: &str) -> PathBuf {
    std::env::var(xdg_var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(fallback)
        })
        .join("facegrab")
}

fn data_dir() -> PathBuf {
    home_relative("XDG_DATA_HOME", ".local/share")
}

pub fn default_config_path() -> PathBuf {
    home_relative("XDG_CONFIG_HOME", ".config").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.camera_device, "/dev/video0");
        assert_eq!(c.round_secs, 60);
        assert_eq!(c.target_size, 60);
        assert!(c.sound && c.save_scores);
        assert!(c.score_path.ends_with("facegrab/scores.txt"));
        assert!(c.detector_model_path().ends_with("models/det_10g.onnx"));
        c.validate().unwrap();
    }

    #[test]
    fn test_toml_partial_file() {
        let c: Config = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            round_secs = 30
            snapshot_dir = "/tmp/shots"
            "#,
        )
        .unwrap();
        assert_eq!(c.camera_device, "/dev/video4");
        assert_eq!(c.round_secs, 30);
        assert_eq!(c.snapshot_dir, Some(PathBuf::from("/tmp/shots")));
        assert_eq!(c.target_size, 60);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        assert!(toml::from_str::<Config>("camera = \"/dev/video1\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut c: Config = toml::from_str("round_secs = 30\ntarget_size = 80").unwrap();
        c.apply_env(env(&[
            ("FACEGRAB_ROUND_SECS", "45"),
            ("FACEGRAB_SOUND", "0"),
            ("FACEGRAB_SEED", "7"),
            ("FACEGRAB_SCORE_PATH", "/var/tmp/s.txt"),
        ]));
        assert_eq!(c.round_secs, 45);
        assert_eq!(c.target_size, 80);
        assert!(!c.sound);
        assert_eq!(c.seed, Some(7));
        assert_eq!(c.score_path, PathBuf::from("/var/tmp/s.txt"));
    }

    #[test]
    fn test_env_bad_number_ignored() {
        let mut c = Config::default();
        c.apply_env(env(&[("FACEGRAB_TARGET_SIZE", "huge"), ("FACEGRAB_CONFIDENCE", "0.7")]));
        assert_eq!(c.target_size, 60);
        assert!((c.confidence_threshold - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sound = false\nwarmup_frames = 0\n").unwrap();
        let c = Config::from_file(&path).unwrap();
        assert!(!c.sound);
        assert_eq!(c.warmup_frames, 0);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_validate() {
        let c = Config { round_secs: 0, ..Config::default() };
        assert!(c.validate().is_err());
        let c = Config { target_size: -3, ..Config::default() };
        assert!(c.validate().is_err());
        let c = Config { confidence_threshold: 1.5, ..Config::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_game_settings() {
        let c = Config { round_secs: 15, seed: Some(3), ..Config::default() };
        let s = c.game_settings();
        assert_eq!(s.round_duration, Duration::from_secs(15));
        assert_eq!(s.seed, Some(3));
        assert_eq!(s.target_size, 60);
    }
}
