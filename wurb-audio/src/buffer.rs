//! Lock-free hand-off between the capture thread and the wave writer

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct QueueShared {
    finished: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

/// Bounded single-producer single-consumer queue of interleaved `i16` samples.
///
/// The capture thread owns the [`SampleProducer`] and must never block on disk
/// I/O, so a full queue drops the excess and counts it instead of waiting.
pub struct SampleQueue;

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples.
    ///
    /// # Example
    ///
    /// ```
    /// use wurb_audio::SampleQueue;
    ///
    /// let (mut tx, mut rx) = SampleQueue::with_capacity(8);
    /// tx.push(&[1, 2, 3]);
    /// let mut out = Vec::new();
    /// assert_eq!(rx.drain(&mut out), 3);
    /// ```
    pub fn with_capacity(capacity: usize) -> (SampleProducer, SampleConsumer) {
        let rb = HeapRb::<i16>::new(capacity.max(1));
        let (producer, consumer) = rb.split();
        let shared = Arc::new(QueueShared::default());

        (
            SampleProducer {
                producer,
                shared: Arc::clone(&shared),
            },
            SampleConsumer { consumer, shared },
        )
    }
}

/// Capture side of a [`SampleQueue`]
pub struct SampleProducer {
    producer: HeapProd<i16>,
    shared: Arc<QueueShared>,
}

impl SampleProducer {
    /// Queue `samples`, returning how many fit. The rest are dropped.
    ///
    /// Wait-free: completes in bounded time regardless of the consumer.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let written = self.producer.push_slice(samples);
        self.shared
            .pushed
            .fetch_add(written as u64, Ordering::Relaxed);
        if written < samples.len() {
            self.shared
                .dropped
                .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
        }
        written
    }

    /// Count samples lost upstream of the queue, e.g. in the device callback.
    pub fn record_dropped(&self, samples: u64) {
        self.shared.dropped.fetch_add(samples, Ordering::Relaxed);
    }

    /// Samples dropped so far, by the queue or recorded from upstream.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Signal end of stream. Also happens on drop.
    pub fn finish(&self) {
        self.shared.finished.store(true, Ordering::Release);
    }
}

impl Drop for SampleProducer {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Writer side of a [`SampleQueue`]
pub struct SampleConsumer {
    consumer: HeapCons<i16>,
    shared: Arc<QueueShared>,
}

impl SampleConsumer {
    /// Append everything currently queued to `out`.
    pub fn drain(&mut self, out: &mut Vec<i16>) -> usize {
        let available = self.consumer.occupied_len();
        if available == 0 {
            return 0;
        }

        let start = out.len();
        out.resize(start + available, 0);
        let read = self.consumer.pop_slice(&mut out[start..]);
        out.truncate(start + read);
        read
    }

    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// True once the producer has finished and every sample has been drained.
    pub fn is_finished(&self) -> bool {
        // Acquire pairs with the Release in finish(): all pushes are visible after this.
        self.shared.finished.load(Ordering::Acquire) && self.consumer.is_empty()
    }

    pub fn pushed(&self) -> u64 {
        self.shared.pushed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
