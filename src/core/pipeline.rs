//! Capture pipeline for the packet sentry.
//!
//! A [`Pipeline`] owns one capture session at a time. The producer reads
//! frames from a [`PacketSource`] on a blocking thread, decodes them and
//! appends them to a [`CaptureQueue`]. The consumer task drains the queue
//! on a fixed cadence and passes each packet, in arrival order, through
//! the filter, the traffic analyzer and the threat detector.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use metrics::{counter, gauge, increment_counter};
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::core::capture_queue::CaptureQueue;
use crate::core::decoder::decode;
use crate::core::packet_filter::accepts;
use crate::core::packet_source::{CaptureError, PacketSource, RawCapture};
use crate::core::threat_detector::{DetectorConfig, ThreatDetector};
use crate::core::traffic_analyzer::{ObservedValues, TrafficAnalyzer, TrafficStats};
use crate::models::{AlertEvent, CaptureConfig, FilterSpec, NormalizedPacket};

/// How a capture session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SessionEnd {
    /// Stopped on request
    Stopped,
    /// The capture source failed
    CaptureFailed(String),
}

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running { interface: String },
    Stopped { interface: String },
    Failed { interface: String, reason: String },
}

/// Events published to subscribers
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A drained batch, before filtering, in arrival order
    PacketsReceived(Arc<Vec<NormalizedPacket>>),
    /// An alert raised by the threat detector
    Alert(AlertEvent),
    /// The session is over; nothing else is delivered for it
    SessionEnded(SessionEnd),
}

/// Result of processing one drained batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Packets that passed the filter
    pub accepted: usize,
    /// Packets skipped because their processing panicked
    pub failed: usize,
    /// Alerts in packet order
    pub alerts: Vec<AlertEvent>,
}

/// Filter, analyzer and detector state for one session
pub struct PacketProcessor {
    analyzer: TrafficAnalyzer,
    detector: ThreatDetector,
    observed: ObservedValues,
}

impl PacketProcessor {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            analyzer: TrafficAnalyzer::new(),
            detector: ThreatDetector::new(config),
            observed: ObservedValues::default(),
        }
    }

    fn process_packet(&mut self, packet: &NormalizedPacket, filter: &FilterSpec) -> Option<Vec<AlertEvent>> {
        self.observed.record(packet);
        if !accepts(packet, filter) {
            return None;
        }
        self.analyzer.observe(packet);
        Some(self.detector.inspect(packet))
    }

    /// Run every packet of a batch through filter, analyzer and detector.
    ///
    /// A packet whose processing panics is logged and skipped; the rest of
    /// the batch is still processed.
    pub fn process_batch(&mut self, batch: &[NormalizedPacket], filter: &FilterSpec) -> BatchOutcome {
        self.process_each(batch, |processor, packet| processor.process_packet(packet, filter))
    }

    fn process_each<F>(&mut self, batch: &[NormalizedPacket], mut step: F) -> BatchOutcome
    where
        F: FnMut(&mut Self, &NormalizedPacket) -> Option<Vec<AlertEvent>>,
    {
        let mut outcome = BatchOutcome::default();
        for packet in batch {
            match panic::catch_unwind(AssertUnwindSafe(|| step(self, packet))) {
                Ok(Some(alerts)) => {
                    outcome.accepted += 1;
                    outcome.alerts.extend(alerts);
                }
                Ok(None) => {}
                Err(_) => {
                    error!("Skipped packet from {} after a processing failure", packet.source_ip);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    pub fn evict_idle(&mut self, now: Instant) -> usize {
        self.detector.evict_idle(now)
    }

    pub fn stats(&self) -> &TrafficStats {
        self.analyzer.stats()
    }

    pub fn observed(&self) -> &ObservedValues {
        &self.observed
    }

    pub fn tracked_sources(&self) -> usize {
        self.detector.tracked_sources()
    }
}

/// State readable by the control surface while a session runs
#[derive(Default)]
struct Shared {
    filter: RwLock<FilterSpec>,
    stats: RwLock<TrafficStats>,
    observed: RwLock<ObservedValues>,
    state: RwLock<SessionState>,
}

struct Session {
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    producer: JoinHandle<Result<u64, CaptureError>>,
    consumer: JoinHandle<()>,
}

impl Session {
    /// The producer exited on its own or the consumer is gone
    fn has_ended(&self) -> bool {
        !self.running.load(Ordering::SeqCst) || self.consumer.is_finished()
    }
}

/// Pipeline coordinator
pub struct Pipeline {
    source: Arc<dyn PacketSource>,
    capture: CaptureConfig,
    detection: DetectorConfig,
    shared: Arc<Shared>,
    events: broadcast::Sender<PipelineEvent>,
    session: Option<Session>,
}

impl Pipeline {
    /// Create a new pipeline reading from `source`
    pub fn new(source: Arc<dyn PacketSource>, capture: CaptureConfig, detection: DetectorConfig) -> Self {
        let (events, _) = broadcast::channel(capture.event_capacity.max(1));
        Self {
            source,
            capture,
            detection,
            shared: Arc::new(Shared::default()),
            events,
            session: None,
        }
    }

    /// Subscribe to batches, alerts and session-end notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Replace the packet filter; applies from the next drained batch
    pub async fn set_filter(&self, spec: FilterSpec) {
        info!("Packet filter set to {:?}", spec);
        *self.shared.filter.write().await = spec;
    }

    pub async fn filter(&self) -> FilterSpec {
        self.shared.filter.read().await.clone()
    }

    /// Snapshot of the current session's traffic statistics
    pub async fn stats(&self) -> TrafficStats {
        self.shared.stats.read().await.clone()
    }

    pub async fn observed_values(&self) -> ObservedValues {
        self.shared.observed.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.shared.state.read().await.clone()
    }

    /// Whether a session is open and still capturing
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| !session.has_ended())
    }

    /// Start capturing on `interface`
    ///
    /// Fails if a session is already running or the interface cannot be
    /// opened. Statistics and detector state start empty for every session.
    pub async fn start(&mut self, interface: &str) -> Result<(), CaptureError> {
        self.reap_finished().await;
        if self.session.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let source = Arc::clone(&self.source);
        let name = interface.to_string();
        let capture = tokio::task::spawn_blocking(move || source.open_live_capture(&name))
            .await
            .map_err(|e| CaptureError::Source(e.to_string()))??;

        info!("Starting capture on {}", interface);
        *self.shared.stats.write().await = TrafficStats::default();
        *self.shared.observed.write().await = ObservedValues::default();
        *self.shared.state.write().await = SessionState::Running {
            interface: interface.to_string(),
        };

        let queue = Arc::new(CaptureQueue::new(self.capture.max_pending));
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (failure_tx, failure_rx) = watch::channel(None::<String>);

        let producer = {
            let queue = Arc::clone(&queue);
            let running = Arc::clone(&running);
            tokio::task::spawn_blocking(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| produce(capture, &queue, &running)))
                    .unwrap_or_else(|payload| Err(CaptureError::Source(panic_reason(&*payload))));
                running.store(false, Ordering::SeqCst);
                if let Err(e) = &result {
                    error!("Capture failed: {}", e);
                    let _ = failure_tx.send(Some(e.to_string()));
                }
                result
            })
        };

        let consumer = Consumer {
            interface: interface.to_string(),
            queue,
            processor: PacketProcessor::new(self.detection.clone()),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            drain_interval: Duration::from_millis(self.capture.drain_interval_ms.max(1)),
        };
        let consumer = tokio::spawn(consumer.run(shutdown_rx, failure_rx, Arc::clone(&running)));

        self.session = Some(Session {
            running,
            shutdown: shutdown_tx,
            producer,
            consumer,
        });
        Ok(())
    }

    /// Stop the current session
    ///
    /// Returns once the producer has exited and the consumer has delivered
    /// the last batch; nothing is published for the session afterwards.
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        let session = self.session.take().ok_or(CaptureError::NotRunning)?;
        info!("Stopping capture");
        Self::finish(session).await;
        Ok(())
    }

    async fn finish(session: Session) {
        session.running.store(false, Ordering::SeqCst);
        match session.producer.await {
            Ok(Ok(produced)) => info!("Capture producer exited after {} packets", produced),
            Ok(Err(_)) => {}
            Err(e) => error!("Capture producer panicked: {}", e),
        }

        let _ = session.shutdown.send(true);
        if let Err(e) = session.consumer.await {
            error!("Pipeline consumer panicked: {}", e);
        }
    }

    /// Clean up a session that already ended on its own
    async fn reap_finished(&mut self) {
        let finished = self.session.as_ref().map_or(false, Session::has_ended);
        if finished {
            if let Some(session) = self.session.take() {
                Self::finish(session).await;
            }
        }
    }
}

impl Drop for Pipeline {
    // Only signals the producer; it exits on its next read timeout and is
    // not joined here. Call `stop` for an orderly shutdown.
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.running.store(false, Ordering::SeqCst);
        }
    }
}

/// Blocking capture loop; checks `running` after every read
fn produce(
    mut capture: Box<dyn RawCapture>,
    queue: &CaptureQueue,
    running: &AtomicBool,
) -> Result<u64, CaptureError> {
    let mut produced = 0u64;
    while running.load(Ordering::SeqCst) {
        let Some(raw) = capture.next_frame()? else {
            continue;
        };
        match decode(&raw) {
            Some(packet) => {
                if queue.push(packet) {
                    produced += 1;
                    increment_counter!("packet_sentry_packets_captured_total");
                } else {
                    increment_counter!("packet_sentry_packets_overflow_total");
                }
            }
            None => {
                debug!("Dropped undecodable frame ({} bytes)", raw.data.len());
                increment_counter!("packet_sentry_packets_dropped_total");
            }
        }
    }
    Ok(produced)
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("capture thread panicked: {}", message)
}

struct Consumer {
    interface: String,
    queue: Arc<CaptureQueue>,
    processor: PacketProcessor,
    shared: Arc<Shared>,
    events: broadcast::Sender<PipelineEvent>,
    drain_interval: Duration,
}

impl Consumer {
    async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut failure: watch::Receiver<Option<String>>,
        running: Arc<AtomicBool>,
    ) {
        let mut ticker = time::interval(self.drain_interval);
        // A slow batch delays the next drain instead of stacking ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut producer_alive = true;

        let end = loop {
            tokio::select! {
                _ = ticker.tick() => self.drain().await,
                _ = shutdown.changed() => break SessionEnd::Stopped,
                changed = failure.changed(), if producer_alive => {
                    producer_alive = false;
                    let reason = changed.ok().and_then(|_| failure.borrow().clone());
                    if let Some(reason) = reason {
                        break SessionEnd::CaptureFailed(reason);
                    }
                    // Producer gone without a stop request
                    if running.swap(false, Ordering::SeqCst) {
                        error!("Capture producer exited unexpectedly");
                        break SessionEnd::CaptureFailed("capture producer exited unexpectedly".to_string());
                    }
                }
            }
        };

        // Whatever the producer queued before it exited
        self.drain().await;

        let state = match &end {
            SessionEnd::Stopped => SessionState::Stopped {
                interface: self.interface.clone(),
            },
            SessionEnd::CaptureFailed(reason) => SessionState::Failed {
                interface: self.interface.clone(),
                reason: reason.clone(),
            },
        };
        *self.shared.state.write().await = state;
        info!("Capture session on {} ended: {:?}", self.interface, end);
        let _ = self.events.send(PipelineEvent::SessionEnded(end));
    }

    async fn drain(&mut self) {
        self.processor.evict_idle(Instant::now());
        gauge!("packet_sentry_tracked_sources", self.processor.tracked_sources() as f64);

        let batch = self.queue.drain();
        if batch.is_empty() {
            return;
        }

        let batch = Arc::new(batch);
        let _ = self.events.send(PipelineEvent::PacketsReceived(Arc::clone(&batch)));

        let filter = self.shared.filter.read().await.clone();
        let outcome = self.processor.process_batch(&batch, &filter);
        counter!("packet_sentry_packets_accepted_total", outcome.accepted as u64);
        debug!(
            "Processed batch of {} packets ({} accepted, {} failed)",
            batch.len(),
            outcome.accepted,
            outcome.failed
        );

        for alert in outcome.alerts {
            warn!("{}", alert);
            increment_counter!("packet_sentry_alerts_total", "kind" => alert.kind.label());
            let _ = self.events.send(PipelineEvent::Alert(alert));
        }

        *self.shared.stats.write().await = self.processor.stats().clone();
        *self.shared.observed.write().await = self.processor.observed().clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decoder::frames;
    use crate::core::packet_source::{MockPacketSource, RawPacket};
    use crate::models::AlertKind;
    use std::collections::VecDeque;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    struct ScriptedCapture {
        frames: VecDeque<RawPacket>,
        fail_when_empty: Option<String>,
    }

    impl RawCapture for ScriptedCapture {
        fn next_frame(&mut self) -> Result<Option<RawPacket>, CaptureError> {
            if let Some(frame) = self.frames.pop_front() {
                return Ok(Some(frame));
            }
            if let Some(reason) = self.fail_when_empty.take() {
                return Err(CaptureError::Source(reason));
            }
            // Behave like a read timeout
            std::thread::sleep(Duration::from_millis(5));
            Ok(None)
        }
    }

    struct ScriptedSource {
        frames: Vec<RawPacket>,
        fail_with: Option<String>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<RawPacket>) -> Arc<Self> {
            Arc::new(Self { frames, fail_with: None })
        }

        fn failing(frames: Vec<RawPacket>, reason: &str) -> Arc<Self> {
            Arc::new(Self {
                frames,
                fail_with: Some(reason.to_string()),
            })
        }
    }

    impl PacketSource for ScriptedSource {
        fn open_live_capture(&self, _interface: &str) -> Result<Box<dyn RawCapture>, CaptureError> {
            Ok(Box::new(ScriptedCapture {
                frames: self.frames.clone().into(),
                fail_when_empty: self.fail_with.clone(),
            }))
        }
    }

    fn capture_config() -> CaptureConfig {
        CaptureConfig {
            drain_interval_ms: 20,
            ..CaptureConfig::default()
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a pipeline event")
            .expect("event channel closed")
    }

    /// Collect delivered packets until `count` have arrived
    async fn collect_packets(rx: &mut broadcast::Receiver<PipelineEvent>, count: usize) -> Vec<NormalizedPacket> {
        let mut packets = Vec::new();
        while packets.len() < count {
            if let PipelineEvent::PacketsReceived(batch) = next_event(rx).await {
                packets.extend(batch.iter().cloned());
            }
        }
        packets
    }

    async fn wait_for_end(rx: &mut broadcast::Receiver<PipelineEvent>) -> SessionEnd {
        loop {
            if let PipelineEvent::SessionEnded(end) = next_event(rx).await {
                return end;
            }
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order_and_stops_cleanly() {
        let source = ScriptedSource::new(vec![
            frames::tcp("10.0.0.1", "10.0.0.2", 40000, 1, 0),
            frames::arp(),
            frames::tcp("10.0.0.1", "10.0.0.2", 40000, 2, 0),
            frames::tcp("10.0.0.1", "10.0.0.2", 40000, 3, 0),
        ]);
        let mut pipeline = Pipeline::new(source, capture_config(), DetectorConfig::default());
        let mut rx = pipeline.subscribe();

        assert_ok!(pipeline.start("test0").await);
        assert!(pipeline.is_running());
        assert_eq!(
            pipeline.state().await,
            SessionState::Running {
                interface: "test0".to_string()
            }
        );

        let packets = collect_packets(&mut rx, 3).await;
        let ports: Vec<Option<u16>> = packets.iter().map(|p| p.destination_port).collect();
        assert_eq!(ports, vec![Some(1), Some(2), Some(3)]);

        assert_ok!(pipeline.stop().await);
        assert_eq!(wait_for_end(&mut rx).await, SessionEnd::Stopped);
        assert!(rx.try_recv().is_err());
        assert!(!pipeline.is_running());

        let stats = pipeline.stats().await;
        assert_eq!(stats.packet_count, 3);
        assert_eq!(stats.total_bytes, 3 * 54);
        assert_eq!(
            pipeline.state().await,
            SessionState::Stopped {
                interface: "test0".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_capture_failure_ends_session() {
        let source = ScriptedSource::failing(
            vec![frames::udp("10.0.0.1", "10.0.0.2", 5000, 53, 10)],
            "device went away",
        );
        let mut pipeline = Pipeline::new(source, capture_config(), DetectorConfig::default());
        let mut rx = pipeline.subscribe();

        assert_ok!(pipeline.start("test0").await);

        let mut delivered = 0;
        let end = loop {
            match next_event(&mut rx).await {
                PipelineEvent::PacketsReceived(batch) => delivered += batch.len(),
                PipelineEvent::SessionEnded(end) => break end,
                PipelineEvent::Alert(_) => {}
            }
        };
        assert_eq!(delivered, 1);
        assert_eq!(
            end,
            SessionEnd::CaptureFailed("Capture source error: device went away".to_string())
        );
        assert!(matches!(pipeline.state().await, SessionState::Failed { .. }));

        // A failed session does not block a new one
        assert_ok!(pipeline.start("test0").await);
        assert_ok!(pipeline.stop().await);
    }

    #[tokio::test]
    async fn test_session_lifecycle_errors() {
        let mut pipeline = Pipeline::new(ScriptedSource::new(Vec::new()), capture_config(), DetectorConfig::default());

        assert!(matches!(pipeline.stop().await, Err(CaptureError::NotRunning)));

        assert_ok!(pipeline.start("test0").await);
        assert!(matches!(pipeline.start("test0").await, Err(CaptureError::AlreadyRunning)));
        assert_ok!(pipeline.stop().await);
        assert_err!(pipeline.stop().await);

        // Restart after stop
        assert_ok!(pipeline.start("test1").await);
        assert_ok!(pipeline.stop().await);
    }

    #[tokio::test]
    async fn test_open_failure_is_reported_to_caller() {
        let mut source = MockPacketSource::new();
        source
            .expect_open_live_capture()
            .times(1)
            .returning(|name| Err(CaptureError::InterfaceNotFound(name.to_string())));

        let mut pipeline = Pipeline::new(Arc::new(source), capture_config(), DetectorConfig::default());
        let result = pipeline.start("eth9").await;

        assert!(matches!(result, Err(CaptureError::InterfaceNotFound(name)) if name == "eth9"));
        assert!(!pipeline.is_running());
        assert_eq!(pipeline.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_filter_limits_statistics() {
        let source = ScriptedSource::new(vec![
            frames::tcp("10.0.0.1", "10.0.0.2", 40000, 22, 0),
            frames::tcp("10.0.0.3", "10.0.0.2", 40000, 6000, 0),
            frames::udp("10.0.0.4", "10.0.0.53", 5000, 53, 10),
        ]);
        let mut pipeline = Pipeline::new(source, capture_config(), DetectorConfig::default());
        pipeline
            .set_filter(FilterSpec {
                protocol: Some("SSH".to_string()),
                ..FilterSpec::default()
            })
            .await;
        let mut rx = pipeline.subscribe();

        assert_ok!(pipeline.start("test0").await);
        collect_packets(&mut rx, 3).await;
        assert_ok!(pipeline.stop().await);

        let stats = pipeline.stats().await;
        assert_eq!(stats.packet_count, 1);
        assert_eq!(stats.protocol_distribution.get("SSH"), Some(&1));

        let observed = pipeline.observed_values().await;
        assert_eq!(observed.protocols.len(), 3);
        assert_eq!(observed.source_ips.len(), 3);
        assert_eq!(pipeline.filter().await.protocol.as_deref(), Some("SSH"));
    }

    #[tokio::test]
    async fn test_port_scan_alert_is_published() {
        let scan = (1..=11)
            .map(|port| frames::tcp("192.168.1.100", "192.168.1.1", 40000, 9000 + port, 0))
            .collect();
        let mut pipeline = Pipeline::new(ScriptedSource::new(scan), capture_config(), DetectorConfig::default());
        let mut rx = pipeline.subscribe();

        assert_ok!(pipeline.start("test0").await);
        let alert = loop {
            if let PipelineEvent::Alert(alert) = next_event(&mut rx).await {
                break alert;
            }
        };
        assert_ok!(pipeline.stop().await);

        assert_eq!(alert.kind, AlertKind::PortScan { distinct_ports: 11 });
        assert_eq!(alert.source_ip, "192.168.1.100");
    }

    struct PanickingCapture {
        first: Option<RawPacket>,
    }

    impl RawCapture for PanickingCapture {
        fn next_frame(&mut self) -> Result<Option<RawPacket>, CaptureError> {
            match self.first.take() {
                Some(frame) => Ok(Some(frame)),
                None => panic!("driver fault"),
            }
        }
    }

    #[tokio::test]
    async fn test_capture_panic_ends_session() {
        let mut source = MockPacketSource::new();
        source.expect_open_live_capture().returning(|_| {
            let capture: Box<dyn RawCapture> = Box::new(PanickingCapture {
                first: Some(frames::tcp("10.0.0.1", "10.0.0.2", 40000, 80, 0)),
            });
            Ok(capture)
        });
        let mut pipeline = Pipeline::new(Arc::new(source), capture_config(), DetectorConfig::default());
        let mut rx = pipeline.subscribe();

        assert_ok!(pipeline.start("test0").await);
        let end = wait_for_end(&mut rx).await;

        assert_eq!(
            end,
            SessionEnd::CaptureFailed("Capture source error: capture thread panicked: driver fault".to_string())
        );
        assert!(!pipeline.is_running());
        assert!(matches!(pipeline.state().await, SessionState::Failed { .. }));
        assert_eq!(pipeline.stats().await.packet_count, 1);

        // The dead session is reaped on the next start
        assert_ok!(pipeline.start("test0").await);
        assert_ok!(pipeline.stop().await);
    }

    #[test]
    fn test_panicking_packet_is_skipped() {
        let mut processor = PacketProcessor::new(DetectorConfig::default());
        let batch: Vec<NormalizedPacket> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|source| decode(&frames::udp(source, "10.0.0.9", 5000, 6000, 1600)).unwrap())
            .collect();
        let filter = FilterSpec::default();

        let outcome = processor.process_each(&batch, |processor, packet| {
            if packet.source_ip == "10.0.0.2" {
                panic!("malformed record");
            }
            processor.process_packet(packet, &filter)
        });

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.failed, 1);
        let sources: Vec<&str> = outcome.alerts.iter().map(|a| a.source_ip.as_str()).collect();
        assert_eq!(sources, vec!["10.0.0.1", "10.0.0.3"]);
        assert!(outcome
            .alerts
            .iter()
            .all(|a| a.kind == AlertKind::OversizedPacket { length: 1642 }));
        assert_eq!(processor.stats().packet_count, 2);
        assert_eq!(processor.tracked_sources(), 2);
    }

    #[test]
    fn test_processor_keeps_sources_apart() {
        let mut processor = PacketProcessor::new(DetectorConfig::default());
        let mut batch = Vec::new();
        for i in 0..120u16 {
            let source = if i % 2 == 0 { "10.0.0.1" } else { "10.0.0.2" };
            let raw = frames::tcp(source, "10.0.0.9", 40000, 7000 + (i % 10), 0);
            batch.push(decode(&raw).unwrap());
        }

        let outcome = processor.process_batch(&batch, &FilterSpec::default());
        assert_eq!(outcome.accepted, 120);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.alerts.is_empty());
        assert_eq!(processor.tracked_sources(), 2);
        assert_eq!(processor.stats().packet_count, 120);
    }
}
