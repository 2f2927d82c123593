//! Audio frames and per-frame features

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Sample rate assumed for incoming audio (16kHz mono speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Default number of samples per frame (32ms at 16kHz)
pub const DEFAULT_FRAME_SAMPLES: usize = 512;

/// A fixed-length block of mono samples
///
/// Immutable once built; cloning shares the sample storage.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    sequence: u64,
    timestamp: DateTime<Utc>,
    samples: Arc<[f32]>,
}

impl AudioFrame {
    /// Create a frame with an explicit sequence number and timestamp
    #[must_use]
    pub fn new(sequence: u64, timestamp: DateTime<Utc>, samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            sequence,
            timestamp,
            samples: samples.into(),
        }
    }

    /// Create a frame stamped with the current time
    #[must_use]
    pub fn now(sequence: u64, samples: impl Into<Arc<[f32]>>) -> Self {
        Self::new(sequence, Utc::now(), samples)
    }

    /// Monotonic sequence number assigned by the producer
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture timestamp
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Features derived from a single frame, kept in the detection window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFeatures {
    /// Sequence number of the source frame
    pub sequence: u64,
    /// RMS energy of the frame
    pub rms: f32,
    /// Absolute peak amplitude
    pub peak: f32,
    /// Fraction of adjacent sample pairs that change sign
    pub zero_crossing_rate: f32,
    /// False when the frame was empty or carried non-finite samples
    pub scoreable: bool,
}

impl FrameFeatures {
    /// Extract features from a frame
    ///
    /// Malformed frames yield zeroed features flagged as unscoreable
    /// instead of an error.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn extract(frame: &AudioFrame) -> Self {
        let samples = frame.samples();

        if samples.is_empty() || samples.iter().any(|s| !s.is_finite()) {
            return Self::unscoreable(frame.sequence());
        }

        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_squares / samples.len() as f32).sqrt();
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        let crossings = samples
            .windows(2)
            .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
            .count();
        let zero_crossing_rate = if samples.len() > 1 {
            crossings as f32 / (samples.len() - 1) as f32
        } else {
            0.0
        };

        Self {
            sequence: frame.sequence(),
            rms,
            peak,
            zero_crossing_rate,
            scoreable: true,
        }
    }

    /// Zeroed features for a frame that could not be analysed
    #[must_use]
    pub const fn unscoreable(sequence: u64) -> Self {
        Self {
            sequence,
            rms: 0.0,
            peak: 0.0,
            zero_crossing_rate: 0.0,
            scoreable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_no_energy() {
        let frame = AudioFrame::now(0, vec![0.0f32; 100]);
        let features = FrameFeatures::extract(&frame);
        assert!(features.scoreable);
        assert!(features.rms < 0.001);
        assert!(features.peak < 0.001);
    }

    #[test]
    fn loud_frame_has_energy() {
        let frame = AudioFrame::now(3, vec![0.5f32; 100]);
        let features = FrameFeatures::extract(&frame);
        assert_eq!(features.sequence, 3);
        assert!(features.rms > 0.4);
        assert!((features.peak - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn alternating_signal_crosses_zero_every_sample() {
        let samples: Vec<f32> = (0..10).map(|i| if i % 2 == 0 { 0.3 } else { -0.3 }).collect();
        let features = FrameFeatures::extract(&AudioFrame::now(0, samples));
        assert!((features.zero_crossing_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn malformed_frames_are_unscoreable() {
        let empty = FrameFeatures::extract(&AudioFrame::now(1, Vec::<f32>::new()));
        assert!(!empty.scoreable);

        let nan = FrameFeatures::extract(&AudioFrame::now(2, vec![0.1, f32::NAN]));
        assert!(!nan.scoreable);
        assert!(nan.rms.abs() < f32::EPSILON);
    }
}
