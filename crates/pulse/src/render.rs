//! Human-readable output for watched responses and the connection banner.

use chrono::Local;
use serde_json::Value;

use pulse_core::{ConnectionPhase, ConnectionSnapshot};

const MAX_RAW_WIDTH: usize = 120;

/// One-line summary of a response body.
///
/// Cluster overviews (`/pools/default`) get node health and rebalance state;
/// anything else falls back to truncated JSON.
pub fn summarize(body: &Value) -> String {
    if let Some(nodes) = body.get("nodes").and_then(Value::as_array) {
        let healthy = nodes
            .iter()
            .filter(|n| n.get("status").and_then(Value::as_str) == Some("healthy"))
            .count();
        let rebalance = body
            .get("rebalanceStatus")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return format!(
            "nodes={} healthy={} rebalance={}",
            nodes.len(),
            healthy,
            rebalance
        );
    }
    if let Some(tasks) = body.as_array() {
        let running = tasks
            .iter()
            .filter(|t| t.get("status").and_then(Value::as_str) == Some("running"))
            .count();
        return format!("tasks={} running={}", tasks.len(), running);
    }
    truncate(&body.to_string(), MAX_RAW_WIDTH)
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

pub fn timestamped(line: &str) -> String {
    format!("{}  {}", Local::now().format("%H:%M:%S"), line)
}

/// Banner text for a monitor state change, or `None` when nothing should be
/// printed.
///
/// While lost, the countdown is shown on entry and then every ten seconds.
pub fn banner(
    previous: Option<&ConnectionSnapshot>,
    current: &ConnectionSnapshot,
) -> Option<String> {
    let phase_changed = previous.is_none_or(|p| p.phase != current.phase);
    match current.phase {
        ConnectionPhase::Lost => {
            if phase_changed || current.countdown_secs % 10 == 0 {
                Some(format!(
                    "Lost connection to server. Retrying in {}s",
                    current.countdown_secs
                ))
            } else {
                None
            }
        }
        ConnectionPhase::Reloading if phase_changed => {
            Some("Connection restored. Reinitializing...".to_string())
        }
        ConnectionPhase::Normal if previous.is_some_and(|p| p.phase == ConnectionPhase::Lost) => {
            Some("Connection restored.".to_string())
        }
        _ => None,
    }
}
