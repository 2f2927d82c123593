//! Bounded frame buffer between the audio source and the wake word gate
//!
//! Single producer, single consumer. A full buffer rejects the push with
//! [`FrameError::Backpressure`] and leaves queued frames untouched; the
//! producer decides whether to drop or slow down. Closing the producer lets
//! the consumer drain everything already queued before it sees
//! [`FrameError::StreamClosed`].

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use super::frame::AudioFrame;

/// Frame buffer failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer is at capacity; nothing was enqueued
    #[error("frame buffer full (capacity {capacity})")]
    Backpressure { capacity: usize },

    /// Stream has been closed and fully drained
    #[error("frame stream closed")]
    StreamClosed,

    /// Frame sequence number did not advance past the last accepted frame
    #[error("frame {sequence} out of order (last accepted {last})")]
    OutOfOrder { sequence: u64, last: u64 },
}

/// Create a frame buffer holding at most `capacity` frames of
/// `frame_samples` samples each
///
/// A zero capacity or frame size is raised to one.
#[must_use]
pub fn frame_buffer(capacity: usize, frame_samples: usize) -> (FrameProducer, FrameConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);

    tracing::debug!(capacity, frame_samples, "frame buffer created");

    (
        FrameProducer {
            tx,
            capacity,
            frame_samples: frame_samples.max(1),
            last_sequence: None,
            pending: Vec::new(),
        },
        FrameConsumer { rx },
    )
}

/// Producing half of the frame buffer
#[derive(Debug)]
pub struct FrameProducer {
    tx: mpsc::Sender<AudioFrame>,
    capacity: usize,
    frame_samples: usize,
    last_sequence: Option<u64>,
    pending: Vec<f32>,
}

impl FrameProducer {
    /// Enqueue a single frame
    ///
    /// # Errors
    ///
    /// Returns `Backpressure` when full, `StreamClosed` when the consumer is
    /// gone, or `OutOfOrder` when the sequence number does not advance
    pub fn push(&mut self, frame: AudioFrame) -> Result<(), FrameError> {
        let sequence = frame.sequence();
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                return Err(FrameError::OutOfOrder { sequence, last });
            }
        }

        match self.tx.try_send(frame) {
            Ok(()) => {
                self.last_sequence = Some(sequence);
                tracing::trace!(sequence, "frame enqueued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(sequence, capacity = self.capacity, "frame buffer full");
                Err(FrameError::Backpressure {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(FrameError::StreamClosed),
        }
    }

    /// Slice raw samples into fixed-size frames and enqueue them
    ///
    /// Samples that do not fill a whole frame are held until the next call.
    /// Either every complete frame is enqueued or none is.
    ///
    /// # Errors
    ///
    /// Returns `Backpressure` when the buffer lacks room for all resulting
    /// frames, or `StreamClosed` when the consumer is gone
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<usize, FrameError> {
        if self.tx.is_closed() {
            return Err(FrameError::StreamClosed);
        }

        let frames = (self.pending.len() + samples.len()) / self.frame_samples;
        // Only the consumer frees slots, so free capacity can only grow
        // between this check and the sends below
        if frames > self.tx.capacity() {
            return Err(FrameError::Backpressure {
                capacity: self.capacity,
            });
        }

        self.pending.extend_from_slice(samples);
        let consumed = frames * self.frame_samples;
        let ready: Vec<f32> = self.pending.drain(..consumed).collect();

        for chunk in ready.chunks_exact(self.frame_samples) {
            let frame = AudioFrame::now(self.next_sequence(), chunk.to_vec());
            self.push(frame)?;
        }

        Ok(frames)
    }

    /// Sequence number the next generated frame will carry
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.last_sequence.map_or(0, |s| s + 1)
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Whether the consuming half has been closed or dropped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close the stream; queued frames are still delivered
    pub fn close(self) {
        tracing::debug!(
            last_sequence = ?self.last_sequence,
            dropped_samples = self.pending.len(),
            "frame producer closed"
        );
    }
}

/// Consuming half of the frame buffer
#[derive(Debug)]
pub struct FrameConsumer {
    rx: mpsc::Receiver<AudioFrame>,
}

impl FrameConsumer {
    /// Wait for the next frame
    ///
    /// # Errors
    ///
    /// Returns `StreamClosed` once the buffer is closed and drained
    pub async fn pop(&mut self) -> Result<AudioFrame, FrameError> {
        self.rx.recv().await.ok_or(FrameError::StreamClosed)
    }

    /// Take the next frame without waiting
    ///
    /// Returns `Ok(None)` when the buffer is momentarily empty.
    ///
    /// # Errors
    ///
    /// Returns `StreamClosed` once the buffer is closed and drained
    pub fn try_pop(&mut self) -> Result<Option<AudioFrame>, FrameError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(FrameError::StreamClosed),
        }
    }

    /// Frames currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Refuse further pushes; queued frames remain poppable
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> AudioFrame {
        AudioFrame::now(sequence, vec![0.0f32; 4])
    }

    #[tokio::test]
    async fn delivers_in_push_order() {
        let (mut producer, mut consumer) = frame_buffer(8, 4);
        for seq in 0..5 {
            producer.push(frame(seq)).unwrap();
        }

        for seq in 0..5 {
            assert_eq!(consumer.pop().await.unwrap().sequence(), seq);
        }
    }

    #[tokio::test]
    async fn full_buffer_rejects_without_corrupting_order() {
        let (mut producer, mut consumer) = frame_buffer(2, 4);
        producer.push(frame(0)).unwrap();
        producer.push(frame(1)).unwrap();

        assert_eq!(
            producer.push(frame(2)),
            Err(FrameError::Backpressure { capacity: 2 })
        );

        assert_eq!(consumer.pop().await.unwrap().sequence(), 0);
        producer.push(frame(2)).unwrap();
        assert_eq!(consumer.pop().await.unwrap().sequence(), 1);
        assert_eq!(consumer.pop().await.unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn close_drains_before_terminal_signal() {
        let (mut producer, mut consumer) = frame_buffer(4, 4);
        producer.push(frame(0)).unwrap();
        producer.push(frame(1)).unwrap();
        producer.close();

        assert_eq!(consumer.pop().await.unwrap().sequence(), 0);
        assert_eq!(consumer.pop().await.unwrap().sequence(), 1);
        assert_eq!(consumer.pop().await.unwrap_err(), FrameError::StreamClosed);
        assert_eq!(consumer.pop().await.unwrap_err(), FrameError::StreamClosed);
    }

    #[tokio::test]
    async fn blocked_pop_wakes_on_close() {
        let (producer, mut consumer) = frame_buffer(4, 4);
        let waiter = tokio::spawn(async move { consumer.pop().await });
        tokio::task::yield_now().await;
        producer.close();

        assert_eq!(waiter.await.unwrap().unwrap_err(), FrameError::StreamClosed);
    }

    #[test]
    fn rejects_non_advancing_sequence() {
        let (mut producer, _consumer) = frame_buffer(4, 4);
        producer.push(frame(5)).unwrap();

        assert_eq!(
            producer.push(frame(5)),
            Err(FrameError::OutOfOrder { sequence: 5, last: 5 })
        );
        assert!(producer.push(frame(9)).is_ok());
        assert_eq!(producer.next_sequence(), 10);
    }

    #[tokio::test]
    async fn push_samples_slices_and_carries_remainder() {
        let (mut producer, mut consumer) = frame_buffer(8, 4);

        assert_eq!(producer.push_samples(&[0.1; 10]).unwrap(), 2);
        assert_eq!(producer.pending_samples(), 2);
        assert_eq!(producer.push_samples(&[0.1; 2]).unwrap(), 1);
        assert_eq!(producer.pending_samples(), 0);

        for seq in 0..3 {
            let f = consumer.pop().await.unwrap();
            assert_eq!(f.sequence(), seq);
            assert_eq!(f.len(), 4);
        }
    }

    #[test]
    fn push_samples_is_all_or_nothing() {
        let (mut producer, consumer) = frame_buffer(2, 4);

        assert_eq!(
            producer.push_samples(&[0.1; 12]),
            Err(FrameError::Backpressure { capacity: 2 })
        );
        assert_eq!(producer.pending_samples(), 0);
        assert!(consumer.is_empty());
    }

    #[test]
    fn push_after_consumer_close_reports_closed() {
        let (mut producer, mut consumer) = frame_buffer(2, 4);
        consumer.close();
        assert_eq!(producer.push(frame(0)), Err(FrameError::StreamClosed));
        assert!(producer.is_closed());
    }
}
