use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::DetectorConfig;

/// A decoded packet as seen by the pipeline.
///
/// Built once by the decoder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPacket {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Sender address
    pub source_ip: String,
    /// Receiver address
    pub destination_ip: String,
    /// Highest recognised layer, e.g. "TCP" or "HTTP"
    pub protocol: String,
    /// Frame length in bytes
    pub length: u32,
    /// Free-text summary
    pub info: String,
    /// Transport source port, absent for port-less protocols
    pub source_port: Option<u16>,
    /// Transport destination port, absent for port-less protocols
    pub destination_port: Option<u16>,
}

/// Exact-match packet filter. `None` places no constraint on a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub protocol: Option<String>,
    pub source_ip: Option<String>,
    pub destination_ip: Option<String>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.source_ip.is_none() && self.destination_ip.is_none()
    }
}

/// Alert kind with its kind-specific payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// Distinct destination ports seen when the rule fired
    PortScan { distinct_ports: usize },
    /// Packets inside the flood window when the rule fired
    VolumetricFlood { packet_count: usize },
    /// Length of the offending packet
    OversizedPacket { length: u32 },
}

impl AlertKind {
    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::PortScan { .. } => "port_scan",
            AlertKind::VolumetricFlood { .. } => "volumetric_flood",
            AlertKind::OversizedPacket { .. } => "oversized_packet",
        }
    }
}

/// Alert emitted by the threat detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: AlertKind,
    pub source_ip: String,
    pub detected_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, source_ip: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source_ip: source_ip.into(),
            detected_at: Utc::now(),
        }
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AlertKind::PortScan { distinct_ports } => write!(
                f,
                "Port scan detected from {} ({} distinct ports)",
                self.source_ip, distinct_ports
            ),
            AlertKind::VolumetricFlood { packet_count } => write!(
                f,
                "Possible volumetric flood from {} ({} packets)",
                self.source_ip, packet_count
            ),
            AlertKind::OversizedPacket { length } => write!(
                f,
                "Oversized packet ({} bytes) from {}",
                length, self.source_ip
            ),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Capture session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface to capture on at startup
    pub interface: Option<String>,
    /// Start capturing on `interface` as soon as the service is up
    pub autostart: bool,
    /// Period of the queue drain in milliseconds
    pub drain_interval_ms: u64,
    /// Read timeout of the capture handle in milliseconds
    pub read_timeout_ms: u64,
    /// Put the interface into promiscuous mode
    pub promiscuous: bool,
    /// Upper bound on packets waiting for the next drain; unbounded when unset
    pub max_pending: Option<usize>,
    /// Capacity of the pipeline event channel
    pub event_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            autostart: false,
            drain_interval_ms: 1000,
            read_timeout_ms: 200,
            promiscuous: true,
            max_pending: None,
            event_capacity: 1024,
        }
    }
}

/// Alert log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertLogConfig {
    /// Number of recent alerts kept for the control surface
    pub history: usize,
}

impl Default for AlertLogConfig {
    fn default() -> Self {
        Self { history: 200 }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to start the Prometheus exporter
    pub enabled: bool,
    /// Exporter listen address
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9100".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Capture configuration
    pub capture: CaptureConfig,
    /// Threat detection configuration
    pub detection: DetectorConfig,
    /// Alert log configuration
    pub alerts: AlertLogConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}
