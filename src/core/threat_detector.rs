//! Per-source threat detection for the packet sentry.
//!
//! This module keeps sliding-window state for every source IP and runs
//! the port-scan, volumetric-flood and oversized-packet heuristics
//! against each accepted packet.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{AlertEvent, AlertKind, NormalizedPacket};
use crate::utils::prune_window;

/// Threat detection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Time window for port-scan tracking (seconds)
    pub port_scan_window_secs: u64,
    /// Distinct destination ports tolerated before a port-scan alert
    pub port_scan_threshold: usize,
    /// Time window for flood tracking (seconds)
    pub flood_window_secs: u64,
    /// Packets per flood window tolerated before a flood alert
    pub flood_threshold: usize,
    /// Largest packet length (bytes) that does not raise an alert
    pub oversized_threshold: u32,
    /// Forget sources idle for this long (seconds); never when unset
    pub idle_eviction_secs: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            port_scan_window_secs: 10,
            port_scan_threshold: 10,
            flood_window_secs: 5,
            flood_threshold: 100,
            oversized_threshold: 1500,
            idle_eviction_secs: Some(600),
        }
    }
}

impl DetectorConfig {
    pub fn port_scan_window(&self) -> Duration {
        Duration::from_secs(self.port_scan_window_secs)
    }

    pub fn flood_window(&self) -> Duration {
        Duration::from_secs(self.flood_window_secs)
    }

    pub fn idle_eviction(&self) -> Option<Duration> {
        self.idle_eviction_secs.map(Duration::from_secs)
    }
}

/// Sliding-window state for a single source IP
#[derive(Debug)]
struct ActivityRecord {
    /// Destination ports seen since the last port-scan alert
    distinct_ports: HashSet<u16>,
    /// Arrival times inside the port-scan window
    scan_times: VecDeque<Instant>,
    /// Arrival times inside the flood window
    flood_times: VecDeque<Instant>,
    /// Last packet from this source, drives idle eviction
    last_seen: Instant,
}

impl ActivityRecord {
    fn new(now: Instant) -> Self {
        Self {
            distinct_ports: HashSet::new(),
            scan_times: VecDeque::new(),
            flood_times: VecDeque::new(),
            last_seen: now,
        }
    }
}

/// Threat detector implementation
pub struct ThreatDetector {
    /// Detection configuration
    config: DetectorConfig,
    /// Per-source activity, keyed by source IP
    activity: HashMap<String, ActivityRecord>,
}

impl ThreatDetector {
    /// Create a new threat detector instance
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            activity: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Inspect a packet against all rules, windowed by the current time
    pub fn inspect(&mut self, packet: &NormalizedPacket) -> Vec<AlertEvent> {
        self.inspect_at(packet, Instant::now())
    }

    /// Inspect a packet against all rules as if it arrived at `now`
    ///
    /// Rules run in a fixed order: port scan, volumetric flood, oversized
    /// packet. Several may fire for the same packet; the returned alerts
    /// follow that order.
    pub fn inspect_at(&mut self, packet: &NormalizedPacket, now: Instant) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        let record = self
            .activity
            .entry(packet.source_ip.clone())
            .or_insert_with(|| ActivityRecord::new(now));
        record.last_seen = now;

        // Port scan
        if let Some(port) = packet.destination_port {
            record.distinct_ports.insert(port);
        }
        record.scan_times.push_back(now);
        prune_window(&mut record.scan_times, now, self.config.port_scan_window());

        if record.distinct_ports.len() > self.config.port_scan_threshold {
            alerts.push(AlertEvent::new(
                AlertKind::PortScan {
                    distinct_ports: record.distinct_ports.len(),
                },
                packet.source_ip.as_str(),
            ));
            record.distinct_ports.clear();
            record.scan_times.clear();
        }

        // Volumetric flood
        record.flood_times.push_back(now);
        prune_window(&mut record.flood_times, now, self.config.flood_window());

        if record.flood_times.len() > self.config.flood_threshold {
            alerts.push(AlertEvent::new(
                AlertKind::VolumetricFlood {
                    packet_count: record.flood_times.len(),
                },
                packet.source_ip.as_str(),
            ));
            record.flood_times.clear();
        }

        // Oversized packet
        if packet.length > self.config.oversized_threshold {
            alerts.push(AlertEvent::new(
                AlertKind::OversizedPacket {
                    length: packet.length,
                },
                packet.source_ip.as_str(),
            ));
        }

        alerts
    }

    /// Forget sources that have been idle longer than the configured timeout
    ///
    /// Returns the number of records removed.
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.config.idle_eviction() else {
            return 0;
        };
        let before = self.activity.len();
        self.activity
            .retain(|_, record| now.saturating_duration_since(record.last_seen) < timeout);
        let evicted = before - self.activity.len();
        if evicted > 0 {
            debug!("Evicted {} idle source records", evicted);
        }
        evicted
    }

    /// Number of source IPs currently tracked
    pub fn tracked_sources(&self) -> usize {
        self.activity.len()
    }

    /// Reset detection state for a given source IP
    ///
    /// Returns `false` when the source was not tracked.
    pub fn reset(&mut self, source_ip: &str) -> bool {
        self.activity.remove(source_ip).is_some()
    }

    /// Reset detection state for every source
    pub fn reset_all(&mut self) {
        self.activity.clear();
    }
}
