//! Terminal presentation: menu, per-tick HUD line, game-over summary, and the
//! audio cue fired on every point.

use facegrab_core::{Rect, RoundSnapshot, RoundSummary};
use std::io::{self, Write};

/// Everything the player sees.
pub trait Screen {
    fn menu(&mut self, high_score: u32);
    fn hud(&mut self, snapshot: &RoundSnapshot, faces: &[Rect]);
    fn game_over(&mut self, summary: &RoundSummary);
}

/// Fire-and-forget signal played when the player scores.
pub trait Cue {
    fn scored(&mut self);
}

/// Rings the terminal bell on stderr. Write failures are ignored.
pub struct TerminalBell;

impl Cue for TerminalBell {
    fn scored(&mut self) {
        let mut err = io::stderr();
        let _ = err.write_all(b"\x07").and_then(|_| err.flush());
    }
}

/// No sound at all.
pub struct SilentCue;

impl Cue for SilentCue {
    fn scored(&mut self) {}
}

/// Line-oriented screen for a plain terminal.
///
/// The HUD is redrawn in place with `\r`, and only when the score or the
/// whole-second countdown changes.
pub struct TerminalScreen<W: Write> {
    out: W,
    last_hud: Option<(u32, u64, usize)>,
}

impl TerminalScreen<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalScreen<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_hud: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::debug!(error = %e, "terminal write failed");
        }
    }
}

impl<W: Write> Screen for TerminalScreen<W> {
    fn menu(&mut self, high_score: u32) {
        self.last_hud = None;
        self.emit(&format!(
            "\n=== facegrab ===\n\
             Move your face over the snack before time runs out.\n\
             Highest Score: {high_score}\n\
             Press Enter to play, q + Enter to quit.\n"
        ));
    }

    fn hud(&mut self, snapshot: &RoundSnapshot, faces: &[Rect]) {
        let key = (snapshot.score, snapshot.remaining_secs(), faces.len());
        if self.last_hud == Some(key) {
            return;
        }
        self.last_hud = Some(key);
        self.emit(&format!(
            "\rScore: {:<4} Time: {:<3} Faces: {:<2}",
            snapshot.score,
            snapshot.remaining_secs(),
            faces.len()
        ));
    }

    fn game_over(&mut self, summary: &RoundSummary) {
        self.last_hud = None;
        let mut text = format!("\n\n=== Game Over ===\nScore: {}\n", summary.final_score);
        if summary.new_high_score {
            text.push_str("New high score!\n");
        }
        text.push_str("Press Enter to play again, q + Enter to quit.\n");
        self.emit(&text);
    }
}
