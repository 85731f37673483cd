//! Progress indicators using indicatif

#![allow(clippy::expect_used)] // Templates are compile-time constants

use indicatif::{ProgressBar, ProgressStyle};

use crate::application::ports::TransferProgress;

/// Create a byte-count bar for file transfers. Hidden when `visible` is false.
///
/// # Panics
///
/// Panics if the progress bar template string is invalid (it is a compile-time constant and will not panic).
#[must_use]
pub fn transfer_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {msg}\n    {bar:40.cyan/dim} {percent}%  {bytes}/{total_bytes}")
            .expect("valid template")
            .progress_chars("━━─"),
    );
    pb
}

/// Move `pb` to the state described by one transfer tick.
///
/// Each file of a tree transfer restarts the bar with its own length.
pub fn track(pb: &ProgressBar, progress: &TransferProgress<'_>) {
    if pb.length() != Some(progress.total) || progress.sent == 0 {
        pb.set_length(progress.total);
        pb.set_message(format!("{} ({})", progress.filename, progress.peer));
    }
    pb.set_position(progress.sent);
}

/// Finish a progress bar with a success message.
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_with_message(format!("✓ {msg}"));
}

/// Finish a progress bar with an error message.
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.abandon_with_message(format!("✗ {msg}"));
}
