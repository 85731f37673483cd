//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Replicas launch concurrently and share one reporter; services name the
//! layout in each message so interleaved lines stay attributable.

use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"`
/// - `success()` prints `"  ✓ {message}"`
/// - `warn()` prints `"  ! {message}"`
///
/// All three are suppressed when `ctx.quiet`.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    fn emit(&self, marker: &str, style: owo_colors::Style, message: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("  {} {message}", marker.style(style));
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        self.emit("→", self.ctx.styles.step, message);
    }

    fn success(&self, message: &str) {
        self.emit("✓", self.ctx.styles.success, message);
    }

    fn warn(&self, message: &str) {
        self.emit("!", self.ctx.styles.warning, message);
    }
}
