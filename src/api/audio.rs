//! Audio frame ingress

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::post,
};
use parking_lot::Mutex;
use serde::Serialize;

use super::ApiState;
use super::error::ApiError;
use crate::voice::{FrameError, FrameProducer};

/// Shared producing half of the frame buffer
///
/// Requests push through a lock so sequence numbers stay monotonic across
/// concurrent uploads. Closing takes the producer out; later pushes fail
/// with `StreamClosed`.
#[derive(Debug)]
pub struct AudioIngress {
    producer: Mutex<Option<FrameProducer>>,
}

impl AudioIngress {
    #[must_use]
    pub fn new(producer: FrameProducer) -> Self {
        Self {
            producer: Mutex::new(Some(producer)),
        }
    }

    /// Slice `samples` into frames and enqueue them
    ///
    /// # Errors
    ///
    /// See [`FrameProducer::push_samples`]; `StreamClosed` after [`close`](Self::close)
    pub fn push_samples(&self, samples: &[f32]) -> Result<IngressReceipt, FrameError> {
        let mut guard = self.producer.lock();
        let producer = guard.as_mut().ok_or(FrameError::StreamClosed)?;
        let frames = producer.push_samples(samples)?;
        Ok(IngressReceipt {
            frames,
            pending_samples: producer.pending_samples(),
            next_sequence: producer.next_sequence(),
        })
    }

    /// Close the stream; the gate drains what is queued and stops
    pub fn close(&self) {
        if let Some(producer) = self.producer.lock().take() {
            producer.close();
        }
    }
}

/// What an upload produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngressReceipt {
    pub frames: usize,
    pub pending_samples: usize,
    pub next_sequence: u64,
}

/// Build audio router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/audio/frames", post(push_frames))
        .with_state(state)
}

/// Accept little-endian `f32` mono samples
async fn push_frames(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<IngressReceipt>, ApiError> {
    let ingress = state
        .ingress
        .as_ref()
        .ok_or(ApiError::NotReady("audio ingress not running"))?;

    let samples = decode_samples(&body)?;
    let receipt = ingress.push_samples(&samples)?;

    tracing::trace!(frames = receipt.frames, pending = receipt.pending_samples, "audio accepted");
    Ok(Json(receipt))
}

fn decode_samples(body: &[u8]) -> Result<Vec<f32>, ApiError> {
    if body.len() % 4 != 0 {
        return Err(ApiError::BadRequest(format!(
            "body length {} is not a multiple of 4 bytes",
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
