//! Core functionality for the packet sentry.
//!
//! This module contains the capture-to-alert pipeline: packet sources and
//! decoding, the hand-off queue, the packet filter, traffic statistics and
//! the per-source threat detector.

pub mod capture_queue;
pub mod decoder;
pub mod packet_filter;
pub mod packet_source;
pub mod pipeline;
pub mod threat_detector;
pub mod traffic_analyzer;

pub use capture_queue::CaptureQueue;
pub use decoder::decode;
pub use packet_filter::accepts;
pub use packet_source::{list_interfaces, CaptureError, LiveCaptureSource, PacketSource, RawCapture, RawPacket};
pub use pipeline::{Pipeline, PipelineEvent, SessionEnd, SessionState};
pub use threat_detector::{DetectorConfig, ThreatDetector};
pub use traffic_analyzer::{ObservedValues, TrafficAnalyzer, TrafficStats};
