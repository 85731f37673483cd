//! Command implementations

pub mod config;
pub mod deploy;
pub mod destroy;
pub mod key_pairs;
pub mod launch;
pub mod sessions;
pub mod transfer;
pub mod version;

use std::process::ExitCode;

/// `SUCCESS` when every unit of work succeeded, else `FAILURE`.
fn exit_code(all_ok: bool) -> ExitCode {
    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
