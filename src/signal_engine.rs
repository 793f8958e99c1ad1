// =============================================================================
// Signal Engine — tick-driven countdown state machine
// =============================================================================
//
// Cycle (optional phases in brackets, enabled by `EngineConfig`):
//
//   Idle ──arm──▶ [Analyzing] ──expiry──▶ Ready ──▶ [Expiring]
//     ▲                                     │           │
//     │                      manual trigger ┘ (from Idle only)
//     │                                     ▼           ▼
//     └── dwell timer ── Complete ◀── [AwaitingEntry] ◀─┘
//
// Entering `Ready` generates a signal and writes it to the history store
// synchronously. `tick()` moves at most one transition per call and never
// decrements below zero.
//
// Out-of-phase calls are no-ops returning `false`; the engine has no error
// states once constructed. Invalid configuration is rejected by `new`.
//
// The engine never sleeps. One-shot delays (manual cooldown, dwell, re-arm)
// are handed to a `Scheduler`, which feeds them back through `on_deferred`.
// Dwell and re-arm events carry the cycle they belong to so a late event
// from an earlier cycle is ignored.
// =============================================================================

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::history_store::HistoryStore;
use crate::random::{uniform_secs, RandomSource};
use crate::runtime_config::{validate_time_format, ConfigError, EngineConfig};
use crate::signal_generator::SignalGenerator;
use crate::types::{HistoryEntry, Phase, Signal};

// =============================================================================
// Scheduling seam
// =============================================================================

/// One-shot events the engine asks its scheduler to deliver later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredEvent {
    ReleaseManualLock,
    EndDwell { cycle: u64 },
    Rearm { cycle: u64 },
}

/// Fire-once timer driver. Implementations deliver each event back to the
/// engine's `on_deferred` after `after` has elapsed.
pub trait Scheduler: Send {
    fn schedule(&mut self, after: Duration, event: DeferredEvent);

    /// Drop every pending event.
    fn cancel_all(&mut self);
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only view of the engine published to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub current_signal: Option<Signal>,
    pub is_expiring: bool,
    pub manual_trigger_locked: bool,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            remaining_seconds: 0,
            current_signal: None,
            is_expiring: false,
            manual_trigger_locked: false,
        }
    }
}

// =============================================================================
// SignalEngine
// =============================================================================

#[derive(Debug, Default)]
struct EngineState {
    phase: Phase,
    remaining_seconds: u32,
    current_signal: Option<Signal>,
    manual_trigger_locked: bool,
    /// Incremented on every entry into `Ready`.
    cycle: u64,
}

pub struct SignalEngine {
    config: EngineConfig,
    generator: SignalGenerator,
    random: Box<dyn RandomSource>,
    history: HistoryStore,
    time_format: String,
    scheduler: Box<dyn Scheduler>,
    state: EngineState,
}

impl SignalEngine {
    /// Build an engine in `Idle`. Fails if `config` or `time_format` does
    /// not validate.
    pub fn new(
        config: EngineConfig,
        random: Box<dyn RandomSource>,
        history: HistoryStore,
        time_format: impl Into<String>,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let time_format = time_format.into();
        validate_time_format(&time_format)?;
        let generator = SignalGenerator::new(config.categories.clone())?;

        info!(
            autonomous = config.analysis.is_some(),
            awaiting_entry = config.awaiting_entry.is_some(),
            expiring_phase = config.expiring_phase,
            categories = generator.categories().len(),
            "signal engine constructed"
        );

        Ok(Self {
            config,
            generator,
            random,
            history,
            time_format,
            scheduler,
            state: EngineState::default(),
        })
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Advance one unit of time. Returns `true` if state changed.
    pub fn tick(&mut self) -> bool {
        if !self.is_counting_down() {
            return false;
        }

        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);

        if self.state.remaining_seconds == 0 {
            self.exit_current_phase();
        } else {
            self.promote_to_expiring();
        }
        true
    }

    /// Generate now. Ignored unless `Idle` and not cooling down.
    pub fn trigger_manually(&mut self) -> bool {
        if self.state.phase != Phase::Idle || self.state.manual_trigger_locked {
            debug!(
                phase = %self.state.phase,
                locked = self.state.manual_trigger_locked,
                "manual trigger ignored"
            );
            return false;
        }

        self.enter_ready();
        self.state.manual_trigger_locked = true;
        self.scheduler.schedule(
            Duration::from_secs(self.config.manual_cooldown_secs),
            DeferredEvent::ReleaseManualLock,
        );
        info!(
            cycle = self.state.cycle,
            cooldown_secs = self.config.manual_cooldown_secs,
            "manual trigger accepted"
        );
        true
    }

    /// Start the analysis countdown from `Idle`. No-op without an analysis
    /// phase or outside `Idle`.
    pub fn arm(&mut self) -> bool {
        let Some(range) = self.config.analysis else {
            return false;
        };
        if self.state.phase != Phase::Idle {
            return false;
        }

        self.state.phase = Phase::Analyzing;
        self.state.remaining_seconds = uniform_secs(self.random.as_mut(), range);
        debug!(secs = self.state.remaining_seconds, "analysis countdown armed");
        true
    }

    /// Apply a fired one-shot event. Returns `true` if state changed.
    pub fn on_deferred(&mut self, event: DeferredEvent) -> bool {
        match event {
            DeferredEvent::ReleaseManualLock => {
                if !self.state.manual_trigger_locked {
                    return false;
                }
                self.state.manual_trigger_locked = false;
                debug!("manual trigger cooldown released");
                true
            }
            DeferredEvent::EndDwell { cycle } => {
                if self.state.phase != Phase::Complete || cycle != self.state.cycle {
                    return false;
                }
                self.reset_to_idle();
                true
            }
            DeferredEvent::Rearm { cycle } => cycle == self.state.cycle && self.arm(),
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.state.phase,
            remaining_seconds: self.state.remaining_seconds,
            current_signal: self.state.current_signal.clone(),
            is_expiring: self.is_expiring(),
            manual_trigger_locked: self.state.manual_trigger_locked,
        }
    }

    /// Cancel every pending one-shot event.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        debug!(phase = %self.state.phase, "signal engine shut down");
    }

    // ── Transitions ─────────────────────────────────────────────────────

    fn is_counting_down(&self) -> bool {
        matches!(
            self.state.phase,
            Phase::Analyzing | Phase::Ready | Phase::Expiring | Phase::AwaitingEntry
        )
    }

    fn is_expiring(&self) -> bool {
        self.state.phase.is_entry_window()
            && (1..=self.config.low_water_mark_secs).contains(&self.state.remaining_seconds)
    }

    fn exit_current_phase(&mut self) {
        match self.state.phase {
            Phase::Analyzing => self.enter_ready(),
            Phase::Ready | Phase::Expiring => match self.config.awaiting_entry {
                Some(range) => {
                    self.state.phase = Phase::AwaitingEntry;
                    self.state.remaining_seconds = uniform_secs(self.random.as_mut(), range);
                    debug!(
                        cycle = self.state.cycle,
                        secs = self.state.remaining_seconds,
                        "entry window closed, awaiting entry"
                    );
                }
                None => self.enter_complete(),
            },
            Phase::AwaitingEntry => self.enter_complete(),
            Phase::Idle | Phase::Complete => {}
        }
    }

    fn enter_ready(&mut self) {
        self.state.cycle += 1;

        let signal = self.generator.generate(self.random.as_mut(), Utc::now());
        let entry = HistoryEntry::from_signal(&signal, &self.time_format);
        if let Err(e) = self.history.record(entry) {
            warn!(error = %e, cycle = self.state.cycle, "failed to record signal history");
        }

        info!(
            cycle = self.state.cycle,
            signal_id = %signal.id,
            label = %signal.label,
            lower = format!("{:.2}", signal.lower_bound),
            upper = format!("{:.2}", signal.upper_bound),
            "signal generated"
        );

        self.state.phase = Phase::Ready;
        self.state.remaining_seconds = uniform_secs(self.random.as_mut(), self.config.entry_window);
        self.state.current_signal = Some(signal);
        self.promote_to_expiring();
    }

    fn promote_to_expiring(&mut self) {
        if self.config.expiring_phase && self.state.phase == Phase::Ready && self.is_expiring() {
            self.state.phase = Phase::Expiring;
            debug!(
                cycle = self.state.cycle,
                remaining = self.state.remaining_seconds,
                "entry window expiring"
            );
        }
    }

    fn enter_complete(&mut self) {
        self.state.phase = Phase::Complete;
        self.state.remaining_seconds = 0;
        self.scheduler.schedule(
            Duration::from_secs(self.config.dwell_secs),
            DeferredEvent::EndDwell {
                cycle: self.state.cycle,
            },
        );
        debug!(cycle = self.state.cycle, dwell_secs = self.config.dwell_secs, "cycle complete");
    }

    fn reset_to_idle(&mut self) {
        self.state.phase = Phase::Idle;
        self.state.remaining_seconds = 0;
        self.state.current_signal = None;

        if self.config.analysis.is_some() {
            self.scheduler.schedule(
                Duration::from_secs(self.config.rearm_delay_secs),
                DeferredEvent::Rearm {
                    cycle: self.state.cycle,
                },
            );
        }
        debug!(cycle = self.state.cycle, "engine reset to idle");
    }
}
