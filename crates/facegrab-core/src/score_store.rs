//! Persistent best score.
//!
//! The record is a single human-readable line, `Maior Score: <n>`. Anything
//! missing or malformed loads as zero.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const RECORD_PREFIX: &str = "Maior Score";

#[derive(Error, Debug)]
pub enum ScoreStoreError {
    #[error("failed to write score file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Durable storage for the single best score.
pub trait ScoreStore {
    /// Stored high score, or 0 if there is none.
    fn load(&self) -> u32;
    /// Overwrite the stored high score.
    fn save(&self, score: u32) -> Result<(), ScoreStoreError>;
}

pub fn format_record(score: u32) -> String {
    format!("{RECORD_PREFIX}: {score}")
}

/// Parse the first line of a score record.
///
/// Only the text after the first `:` matters; the label is not checked.
pub fn parse_record(contents: &str) -> Option<u32> {
    let line = contents.lines().next()?;
    let (_, value) = line.split_once(':')?;
    value.trim().parse().ok()
}

/// Score record kept in a text file.
#[derive(Debug, Clone)]
pub struct FileScoreStore {
    path: PathBuf,
}

impl FileScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_err(&self, source: io::Error) -> ScoreStoreError {
        ScoreStoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl ScoreStore for FileScoreStore {
    fn load(&self) -> u32 {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no score file yet");
                return 0;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read score file");
                return 0;
            }
        };

        parse_record(&contents).unwrap_or_else(|| {
            tracing::warn!(path = %self.path.display(), "malformed score record; using 0");
            0
        })
    }

    fn save(&self, score: u32) -> Result<(), ScoreStoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.write_err(e))?;
        }

        // Write-then-rename so a crash mid-write leaves the old record intact.
        let tmp = self.temp_path();
        fs::write(&tmp, format_record(score)).map_err(|e| self.write_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.write_err(e))?;

        tracing::info!(path = %self.path.display(), score, "high score saved");
        Ok(())
    }
}

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    score: Cell<u32>,
}

impl MemoryScoreStore {
    pub fn new(initial: u32) -> Self {
        Self {
            score: Cell::new(initial),
        }
    }
}

impl ScoreStore for MemoryScoreStore {
    fn load(&self) -> u32 {
        self.score.get()
    }

    fn save(&self, score: u32) -> Result<(), ScoreStoreError> {
        self.score.set(score);
        Ok(())
    }
}
