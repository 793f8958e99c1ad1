// =============================================================================
// Engine Runtime — tokio driver for the signal engine
// =============================================================================
//
// Runs as a single background Tokio task that owns the engine outright, so
// every mutation is serialised through one place:
//
//   1. A `tokio::time::interval` drives `tick()` once per tick interval.
//      Missed ticks are skipped, never replayed in a burst.
//   2. An mpsc command channel carries manual triggers, fired one-shot
//      events and shutdown requests into the same loop.
//   3. After each mutation the snapshot is pushed into a `watch` channel;
//      renderers subscribe to it instead of polling the engine.
//
// One-shot delays are tokio tasks held as `AbortOnDropHandle`s by the
// scheduler. Dropping the `EngineHandle` aborts the loop task, which drops
// the engine and with it every pending timer.
// =============================================================================

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::history_store::HistoryStore;
use crate::random::RandomSource;
use crate::runtime_config::{ConfigError, EngineConfig};
use crate::signal_engine::{DeferredEvent, EngineSnapshot, Scheduler, SignalEngine};
use crate::util::AbortOnDropHandle;

enum Command {
    Trigger(oneshot::Sender<bool>),
    Deferred(DeferredEvent),
    Shutdown,
}

// =============================================================================
// TokioScheduler
// =============================================================================

/// Delivers deferred events back into the runtime loop via the command
/// channel after a `tokio::time::sleep`.
struct TokioScheduler {
    commands: mpsc::UnboundedSender<Command>,
    timers: Vec<AbortOnDropHandle<()>>,
}

impl TokioScheduler {
    fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            timers: Vec::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, after: Duration, event: DeferredEvent) {
        self.timers.retain(|timer| !timer.is_finished());

        let commands = self.commands.clone();
        let timer = tokio::spawn(async move {
            sleep(after).await;
            // The loop is gone when this fails; nothing left to notify.
            let _ = commands.send(Command::Deferred(event));
        });
        self.timers.push(timer.into());

        debug!(?event, after_ms = after.as_millis() as u64, "deferred event scheduled");
    }

    fn cancel_all(&mut self) {
        let pending = self.timers.len();
        self.timers.clear();
        debug!(pending, "deferred events cancelled");
    }
}

// =============================================================================
// EngineHandle
// =============================================================================

/// Owner-side handle to a running engine. Dropping it stops the engine.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<EngineSnapshot>,
    task: AbortOnDropHandle<()>,
}

impl EngineHandle {
    /// Ask for a signal now. Returns `true` if the engine accepted it.
    pub async fn trigger(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Trigger(reply_tx)).is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Receiver updated after every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop the loop and cancel pending timers, waiting for the task to end.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let Self { task, .. } = self;
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
    }
}

/// Build the engine and spawn its loop on the current tokio runtime.
///
/// Must be called from within a tokio runtime. Fails before spawning
/// anything if `config` does not validate.
pub fn spawn_engine(
    config: EngineConfig,
    random: Box<dyn RandomSource>,
    history: HistoryStore,
    time_format: impl Into<String>,
) -> Result<EngineHandle, ConfigError> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let scheduler = TokioScheduler::new(command_tx.clone());

    let tick_every = Duration::from_millis(config.tick_interval_ms);
    let engine = SignalEngine::new(config, random, history, time_format, Box::new(scheduler))?;

    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
    let task = tokio::spawn(run_engine_loop(engine, command_rx, snapshot_tx, tick_every));

    Ok(EngineHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        task: task.into(),
    })
}

async fn run_engine_loop(
    mut engine: SignalEngine,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<EngineSnapshot>,
    tick_every: Duration,
) {
    info!(tick_ms = tick_every.as_millis() as u64, "engine loop started");

    let mut ticker = interval(tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the first countdown step should
    // land one full interval after start.
    ticker.tick().await;

    if engine.arm() {
        publish(&engine, &snapshots);
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if engine.tick() {
                    publish(&engine, &snapshots);
                }
            }
            command = commands.recv() => match command {
                Some(Command::Trigger(reply)) => {
                    let accepted = engine.trigger_manually();
                    if accepted {
                        publish(&engine, &snapshots);
                    }
                    let _ = reply.send(accepted);
                }
                Some(Command::Deferred(event)) => {
                    if engine.on_deferred(event) {
                        publish(&engine, &snapshots);
                    }
                }
                Some(Command::Shutdown) | None => break,
            },
        }
    }

    engine.shutdown();
    info!("engine loop stopped");
}

fn publish(engine: &SignalEngine, snapshots: &watch::Sender<EngineSnapshot>) {
    let next = engine.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
