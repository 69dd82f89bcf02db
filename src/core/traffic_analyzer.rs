//! Traffic statistics for the packet sentry.
//!
//! This module keeps the running counters shown to the operator and the
//! catalogue of addresses and protocols seen on the wire.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::NormalizedPacket;

/// Aggregate counters over the accepted packet stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub packet_count: u64,
    pub total_bytes: u64,
    pub protocol_distribution: HashMap<String, u64>,
}

/// Traffic analyzer
#[derive(Debug, Default)]
pub struct TrafficAnalyzer {
    stats: TrafficStats,
}

impl TrafficAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a packet. Packets are not deduplicated.
    pub fn observe(&mut self, packet: &NormalizedPacket) {
        self.stats.packet_count += 1;
        self.stats.total_bytes += u64::from(packet.length);
        *self
            .stats
            .protocol_distribution
            .entry(packet.protocol.clone())
            .or_insert(0) += 1;
    }

    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> TrafficStats {
        self.stats.clone()
    }
}

/// Distinct values seen on the wire, used to offer filter choices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedValues {
    pub source_ips: BTreeSet<String>,
    pub destination_ips: BTreeSet<String>,
    pub protocols: BTreeSet<String>,
}

impl ObservedValues {
    /// Record a packet's addresses and protocol. Returns `true` if anything was new.
    pub fn record(&mut self, packet: &NormalizedPacket) -> bool {
        let mut changed = false;
        if !self.source_ips.contains(&packet.source_ip) {
            changed |= self.source_ips.insert(packet.source_ip.clone());
        }
        if !self.destination_ips.contains(&packet.destination_ip) {
            changed |= self.destination_ips.insert(packet.destination_ip.clone());
        }
        if !self.protocols.contains(&packet.protocol) {
            changed |= self.protocols.insert(packet.protocol.clone());
        }
        changed
    }
}
