//! Built-in scoring functions
//!
//! A real keyword-spotting model plugs in through [`Scorer`]; these exist so
//! the gate can run before one is attached.

use super::wake_word::DetectionWindow;

/// Scores the detection window against the target keyword
///
/// Implementations must be cheap: the gate calls this once per frame on the
/// audio path. Returned values outside `[0, 1]` are clamped and non-finite
/// values are treated as 0.
pub trait Scorer: Send + Sync {
    fn score(&self, window: &DetectionWindow, keyword: &str) -> f32;
}

impl<F> Scorer for F
where
    F: Fn(&DetectionWindow, &str) -> f32 + Send + Sync,
{
    fn score(&self, window: &DetectionWindow, keyword: &str) -> f32 {
        self(window, keyword)
    }
}

/// Never detects anything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentScorer;

impl Scorer for SilentScorer {
    fn score(&self, _window: &DetectionWindow, _keyword: &str) -> f32 {
        0.0
    }
}

/// Scores sustained loudness over the most recent frames
///
/// Keyword-agnostic: useful for replaying recordings and for exercising the
/// pipeline end to end, not for production wake detection.
#[derive(Debug, Clone, Copy)]
pub struct EnergyScorer {
    span: usize,
    gain: f32,
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self { span: 5, gain: 4.0 }
    }
}

impl EnergyScorer {
    /// Create a scorer averaging `span` frames and multiplying by `gain`
    #[must_use]
    pub fn new(span: usize, gain: f32) -> Self {
        Self {
            span: span.max(1),
            gain,
        }
    }
}

impl Scorer for EnergyScorer {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, window: &DetectionWindow, _keyword: &str) -> f32 {
        let recent: Vec<f32> = window
            .iter()
            .rev()
            .take(self.span)
            .filter(|f| f.scoreable)
            .map(|f| f.rms)
            .collect();

        if recent.is_empty() {
            return 0.0;
        }

        let mean = recent.iter().sum::<f32>() / recent.len() as f32;
        (mean * self.gain).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{AudioFrame, FrameFeatures};

    fn window_of(levels: &[f32]) -> DetectionWindow {
        let mut window = DetectionWindow::new(8);
        for (seq, level) in levels.iter().enumerate() {
            let frame = AudioFrame::now(seq as u64, vec![*level; 64]);
            window.push(FrameFeatures::extract(&frame));
        }
        window
    }

    #[test]
    fn silent_scorer_never_fires() {
        assert!(SilentScorer.score(&window_of(&[0.9, 0.9]), "unison").abs() < f32::EPSILON);
    }

    #[test]
    fn energy_scorer_tracks_recent_loudness() {
        let scorer = EnergyScorer::new(2, 4.0);
        let quiet = scorer.score(&window_of(&[0.5, 0.5, 0.01, 0.01]), "unison");
        let loud = scorer.score(&window_of(&[0.01, 0.01, 0.2, 0.2]), "unison");

        assert!(quiet < 0.1);
        assert!((loud - 0.8).abs() < 1e-4);
    }

    #[test]
    fn energy_scorer_saturates_at_one() {
        let scorer = EnergyScorer::default();
        assert!((scorer.score(&window_of(&[0.9; 5]), "unison") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn closures_are_scorers() {
        let scorer = |window: &DetectionWindow, keyword: &str| {
            if keyword == "unison" { window.len() as f32 / 10.0 } else { 0.0 }
        };
        assert!((scorer.score(&window_of(&[0.1; 3]), "unison") - 0.3).abs() < 1e-6);
    }
}
