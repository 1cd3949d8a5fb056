//! Sample-rate conversion for the cpal driver.
//!
//! Host input devices run at their native rate (commonly 44.1 or 48 kHz);
//! the microphone configuration asks for a fixed rate such as 256 Hz.
//! `RateConverter` bridges the two on the sampler thread, never in the
//! real-time callback. Equal rates are a passthrough with no rubato session.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{MicError, Result};

/// Converts mono f32 audio between two fixed rates.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input carried over between calls until a full chunk is available.
    pending: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `MicError::AudioStream` if rubato rejects the ratio or chunk size.
    pub fn new(device_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if device_rate == target_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = f64::from(target_rate) / f64::from(device_rate);
        let resampler =
            FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                .map_err(|e| MicError::AudioStream(format!("resampler init: {e}")))?;

        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
        info!(device_rate, target_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Feed `input` and append whatever output is ready to `out`.
    pub fn process_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(input);
            return;
        };

        self.pending.extend_from_slice(input);
        while self.pending.len() >= self.chunk_size {
            let chunk = &self.pending[..self.chunk_size];
            match resampler.process_into_buffer(&[chunk], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    out.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.pending.drain(..self.chunk_size);
        }
    }
}
