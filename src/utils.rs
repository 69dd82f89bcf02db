use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Drops timestamps that are `window` or more behind `now`.
///
/// Timestamps are stored in arrival order, so pruning stops at the first
/// entry still inside the window.
pub fn prune_window(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(t) = times.front() {
        if now.saturating_duration_since(*t) >= window {
            times.pop_front();
        } else {
            break;
        }
    }
}

pub fn format_endpoint(ip: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if ip.contains(':') => format!("[{}]:{}", ip, port),
        Some(port) => format!("{}:{}", ip, port),
        None => ip.to_string(),
    }
}
