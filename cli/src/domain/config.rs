//! Domain types and validators for Skyforge settings.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level settings stored in `~/.skyforge/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub provision: ProvisionSettings,
    pub ssh: SshSettings,
    pub key_pairs: KeyPairSettings,
}

/// Bounded wait for a new node to report `running`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionSettings {
    pub wait_period_secs: u64,
    pub wait_timeout_secs: u64,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            wait_period_secs: 5,
            wait_timeout_secs: 300,
        }
    }
}

/// Remote shell connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshSettings {
    /// OpenSSH client binary.
    pub binary: String,
    pub connect_attempts: u32,
    pub connect_delay_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            connect_attempts: 15,
            connect_delay_secs: 5,
            connect_timeout_secs: 300,
        }
    }
}

/// Key-pair deletion retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeyPairSettings {
    pub delete_attempts: u32,
    pub delete_initial_delay_secs: u64,
    pub delete_max_delay_secs: u64,
}

impl Default for KeyPairSettings {
    fn default() -> Self {
        Self {
            delete_attempts: 15,
            delete_initial_delay_secs: 3,
            delete_max_delay_secs: 60,
        }
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────────

/// Bounded retry schedule: `attempts` tries, sleeping `delay(n)` after the
/// n-th failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    /// Multiplier applied after each failure; 1 means a fixed delay.
    pub backoff: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    #[must_use]
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            initial_delay: delay,
            backoff: 1,
            max_delay: delay,
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Settings {
    /// Retry schedule for establishing the remote shell.
    #[must_use]
    pub fn ssh_connect_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.ssh.connect_attempts,
            Duration::from_secs(self.ssh.connect_delay_secs),
        )
    }

    /// Exponential schedule for provider key-pair deletion.
    #[must_use]
    pub fn key_pair_delete_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.key_pairs.delete_attempts,
            initial_delay: Duration::from_secs(self.key_pairs.delete_initial_delay_secs),
            backoff: 2,
            max_delay: Duration::from_secs(self.key_pairs.delete_max_delay_secs),
        }
    }

    #[must_use]
    pub fn ssh_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }

    #[must_use]
    pub fn wait_period(&self) -> Duration {
        Duration::from_secs(self.provision.wait_period_secs)
    }

    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.provision.wait_timeout_secs)
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates loaded settings.
///
/// # Errors
///
/// Returns an error if an attempt count is zero or the wait period is zero.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    let checks: [(&str, u64, u64); 4] = [
        (
            "ssh.connect_attempts",
            u64::from(settings.ssh.connect_attempts),
            1,
        ),
        (
            "key_pairs.delete_attempts",
            u64::from(settings.key_pairs.delete_attempts),
            1,
        ),
        (
            "provision.wait_period_secs",
            settings.provision.wait_period_secs,
            1,
        ),
        (
            "ssh.connect_timeout_secs",
            settings.ssh.connect_timeout_secs,
            1,
        ),
    ];
    for (key, value, min) in checks {
        if value < min {
            return Err(ConfigError::BelowMinimum {
                key: key.to_string(),
                value,
                min,
            }
            .into());
        }
    }
    Ok(())
}
