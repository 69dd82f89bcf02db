//! Packet sources for the packet sentry.
//!
//! A [`PacketSource`] opens a live capture on a named interface and hands
//! back raw link-layer frames. [`LiveCaptureSource`] does this with
//! `pnet` datalink channels.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pnet::datalink::{self, Channel, DataLinkReceiver};
use thiserror::Error;

use crate::models::CaptureConfig;

/// Errors that can occur while opening or reading a capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("Interface {0} does not provide an Ethernet channel")]
    UnsupportedChannel(String),
    #[error("Capture I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Capture source error: {0}")]
    Source(String),
    #[error("Capture already running")]
    AlreadyRunning,
    #[error("Capture not running")]
    NotRunning,
}

/// A captured link-layer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl RawPacket {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            timestamp: Utc::now(),
            data,
        }
    }
}

/// An open capture handle
pub trait RawCapture: Send {
    /// Read the next frame.
    ///
    /// `Ok(None)` means the read timed out with nothing captured; the caller
    /// gets a chance to check whether it should keep going.
    fn next_frame(&mut self) -> Result<Option<RawPacket>, CaptureError>;
}

/// Something that can open live captures by interface name
#[cfg_attr(test, mockall::automock)]
pub trait PacketSource: Send + Sync {
    fn open_live_capture(&self, interface: &str) -> Result<Box<dyn RawCapture>, CaptureError>;
}

/// Live capture through `pnet` datalink channels
#[derive(Debug, Clone)]
pub struct LiveCaptureSource {
    read_timeout: Duration,
    promiscuous: bool,
}

impl LiveCaptureSource {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            promiscuous: config.promiscuous,
        }
    }
}

impl PacketSource for LiveCaptureSource {
    fn open_live_capture(&self, interface: &str) -> Result<Box<dyn RawCapture>, CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?;

        let config = datalink::Config {
            read_timeout: Some(self.read_timeout),
            promiscuous: self.promiscuous,
            ..Default::default()
        };

        match datalink::channel(&iface, config)? {
            Channel::Ethernet(_, rx) => Ok(Box::new(LiveCapture { rx })),
            _ => Err(CaptureError::UnsupportedChannel(interface.to_string())),
        }
    }
}

struct LiveCapture {
    rx: Box<dyn DataLinkReceiver>,
}

impl RawCapture for LiveCapture {
    fn next_frame(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(RawPacket::new(frame.to_vec()))),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(CaptureError::Io(e)),
        }
    }
}

/// Names of interfaces that are up and can be captured on
pub fn list_interfaces() -> Vec<String> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up())
        .map(|iface| iface.name)
        .collect()
}
