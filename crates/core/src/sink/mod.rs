//! Hand-off of analysis results out of the audio thread.
//!
//! The tap calls [`ResultSink::emit`] synchronously from the render callback,
//! so implementations must return promptly: no locks, no I/O, no unbounded
//! work. [`channel`] builds the default implementation, a wait-free
//! single-producer single-consumer ring.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::AudioAnalysisResult;

/// Receives one result per processed block, in processing order.
pub trait ResultSink {
    fn emit(&mut self, result: AudioAnalysisResult);
}

impl<F> ResultSink for F
where
    F: FnMut(AudioAnalysisResult),
{
    fn emit(&mut self, result: AudioAnalysisResult) {
        self(result)
    }
}

/// Creates a bounded ring between the audio thread and a consumer.
pub fn channel(capacity: usize) -> (RingBufferSink, AnalysisReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        RingBufferSink {
            producer,
            dropped: dropped.clone(),
        },
        AnalysisReceiver { consumer, dropped },
    )
}

/// Producer half. Never blocks: when the ring is full the newest result is
/// discarded and counted.
pub struct RingBufferSink {
    producer: Producer<AudioAnalysisResult>,
    dropped: Arc<AtomicU64>,
}

impl RingBufferSink {
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Free slots left in the ring.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }

    /// `true` when the next `emit` would be dropped.
    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }
}

impl ResultSink for RingBufferSink {
    fn emit(&mut self, result: AudioAnalysisResult) {
        if self.producer.push(result).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for RingBufferSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBufferSink")
            .field("free", &self.producer.slots())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Consumer half, read from a general-purpose thread.
pub struct AnalysisReceiver {
    consumer: Consumer<AudioAnalysisResult>,
    dropped: Arc<AtomicU64>,
}

impl AnalysisReceiver {
    pub fn try_recv(&mut self) -> Option<AudioAnalysisResult> {
        self.consumer.pop().ok()
    }

    /// Pops everything currently queued.
    pub fn drain(&mut self) -> impl Iterator<Item = AudioAnalysisResult> + '_ {
        std::iter::from_fn(move || self.consumer.pop().ok())
    }

    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }

    /// Number of results discarded because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// `true` once the sink has been dropped. Results already queued can still
    /// be drained.
    pub fn is_disconnected(&self) -> bool {
        self.consumer.is_abandoned()
    }
}

impl std::fmt::Debug for AnalysisReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisReceiver")
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .finish()
    }
}
