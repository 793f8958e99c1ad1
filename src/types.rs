// =============================================================================
// Shared types used across the signal simulator
// =============================================================================

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of the signal engine's cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Analyzing,
    Ready,
    Expiring,
    AwaitingEntry,
    Complete,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl Phase {
    /// Phases that hold a generated signal and count down an entry window.
    pub fn is_entry_window(self) -> bool {
        matches!(self, Self::Ready | Self::Expiring)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Analyzing => write!(f, "Analyzing"),
            Self::Ready => write!(f, "Ready"),
            Self::Expiring => write!(f, "Expiring"),
            Self::AwaitingEntry => write!(f, "AwaitingEntry"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// A generated signal. Immutable once created; `lower_bound < upper_bound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub label: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// Display text for the multiplier range, e.g. `Exit between 1.52x and 2.40x`.
    pub fn range_text(&self) -> String {
        format!(
            "Exit between {:.2}x and {:.2}x",
            self.lower_bound, self.upper_bound
        )
    }
}

/// A persisted history record. Field names match the stored JSON layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub text: String,
    #[serde(default)]
    pub cashout: String,
    pub time: String,
}

impl HistoryEntry {
    /// Build an entry from a signal, rendering `created_at` as local
    /// time-of-day with `time_format` (chrono strftime syntax). A pattern
    /// chrono cannot render falls back to `HH:MM`.
    pub fn from_signal(signal: &Signal, time_format: &str) -> Self {
        let local = signal.created_at.with_timezone(&Local);
        let mut time = String::new();
        if write!(time, "{}", local.format(time_format)).is_err() {
            time = local.format("%H:%M").to_string();
        }

        Self {
            text: signal.label.clone(),
            cashout: signal.range_text(),
            time,
        }
    }
}

/// Registration record used as the navigation gate in front of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub whatsapp: String,
}
