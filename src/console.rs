// =============================================================================
// Console View — renders engine snapshots and forwards manual triggers
// =============================================================================
//
// Pure consumer of the snapshot channel: maps each published snapshot to one
// status line. Input is line based on stdin:
//
//   <Enter> / g   generate now (manual trigger)
//   h             print the history
//   q             quit
// =============================================================================

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::engine_runtime::EngineHandle;
use crate::history_store::HistoryStore;
use crate::signal_engine::EngineSnapshot;
use crate::types::{HistoryEntry, Phase};

/// One status line for a snapshot.
pub fn render_status(snapshot: &EngineSnapshot) -> String {
    let secs = snapshot.remaining_seconds;
    let mut line = match snapshot.phase {
        Phase::Idle => "Idle | press Enter to generate a prediction".to_string(),
        Phase::Analyzing => format!(
            "Next prediction in {}:{:02} | analysing...",
            secs / 60,
            secs % 60
        ),
        Phase::Ready | Phase::Expiring => format!("Prediction detected | entry available for {secs}s"),
        Phase::AwaitingEntry => format!("Place your entry | {secs}s left"),
        Phase::Complete => "Round complete".to_string(),
    };

    if let Some(signal) = &snapshot.current_signal {
        line.push_str(&format!(" | {} | {}", signal.label, signal.range_text()));
    }
    if snapshot.is_expiring {
        line.push_str(" | entry about to expire");
    }
    if snapshot.manual_trigger_locked {
        line.push_str(" | manual generation cooling down");
    }
    line
}

/// Printable history listing, most recent first.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No predictions generated yet.".to_string();
    }
    entries
        .iter()
        .map(|e| format!("{}  {}  {}", e.time, e.text, e.cashout))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drive the console until `q`, end of input or Ctrl+C.
pub async fn run(handle: &EngineHandle, history: &HistoryStore) -> Result<()> {
    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", render_status(&handle.snapshot()));

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("engine stopped publishing snapshots");
                    break;
                }
                println!("{}", render_status(&updates.borrow_and_update()));
            }
            line = lines.next_line() => match line? {
                Some(input) => match input.trim() {
                    "" | "g" => {
                        if !handle.trigger().await {
                            println!("Manual generation unavailable right now.");
                        }
                    }
                    "h" => println!("{}", render_history(&history.read_all())),
                    "q" => break,
                    other => println!("Unknown command `{other}` (Enter/g, h, q)"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::types::Signal;

    fn signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            label: "early cashout".into(),
            lower_bound: 1.75,
            upper_bound: 2.5,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn analyzing_renders_minutes_and_seconds() {
        let snap = EngineSnapshot {
            phase: Phase::Analyzing,
            remaining_seconds: 65,
            ..EngineSnapshot::default()
        };
        assert_eq!(render_status(&snap), "Next prediction in 1:05 | analysing...");
    }

    #[test]
    fn expiring_ready_renders_signal_and_warning() {
        let snap = EngineSnapshot {
            phase: Phase::Ready,
            remaining_seconds: 4,
            current_signal: Some(signal()),
            is_expiring: true,
            manual_trigger_locked: true,
        };
        assert_eq!(
            render_status(&snap),
            "Prediction detected | entry available for 4s | early cashout | \
             Exit between 1.75x and 2.50x | entry about to expire | manual generation cooling down"
        );
    }

    #[test]
    fn empty_history_message() {
        assert_eq!(render_history(&[]), "No predictions generated yet.");
    }

    #[test]
    fn history_lines_are_in_given_order() {
        let entries = vec![
            HistoryEntry {
                text: "b".into(),
                cashout: "Exit between 2.00x and 3.00x".into(),
                time: "10:01".into(),
            },
            HistoryEntry {
                text: "a".into(),
                cashout: "Exit between 1.50x and 2.00x".into(),
                time: "10:00".into(),
            },
        ];
        assert_eq!(
            render_history(&entries),
            "10:01  b  Exit between 2.00x and 3.00x\n10:00  a  Exit between 1.50x and 2.00x"
        );
    }
}
