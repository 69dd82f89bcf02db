//! Hand-off buffer between the capture producer and the pipeline consumer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::NormalizedPacket;

/// FIFO of decoded packets waiting for the next drain
#[derive(Debug, Default)]
pub struct CaptureQueue {
    buffer: Mutex<VecDeque<NormalizedPacket>>,
    /// Maximum pending packets; unbounded when `None`
    capacity: Option<usize>,
}

impl CaptureQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<NormalizedPacket>> {
        // Every critical section is a single push or swap, the buffer is
        // consistent even if a holder panicked.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a packet. Returns `false` if the queue is full and the packet was dropped.
    pub fn push(&self, packet: NormalizedPacket) -> bool {
        let mut buffer = self.lock();
        if let Some(capacity) = self.capacity {
            if buffer.len() >= capacity {
                return false;
            }
        }
        buffer.push_back(packet);
        true
    }

    /// Take everything queued so far, in arrival order
    pub fn drain(&self) -> Vec<NormalizedPacket> {
        let taken = std::mem::take(&mut *self.lock());
        taken.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
