//! Microphone driver boundary.
//!
//! The core never touches capture hardware directly. A driver is consumed
//! through three calls (`init`, `set_samples_ready_handler`, `start`) plus
//! the `read_samples` pull that the registered handler performs when the
//! driver reports a filled buffer.
//!
//! # Handler context
//!
//! The handler runs on the driver's own context (interrupt on a board, a
//! driver thread on the host). It may preempt the main loop at any point and
//! must only copy samples out and mark them ready.

pub mod adc;
#[cfg(feature = "audio-cpal")]
pub mod capture;
#[cfg(feature = "audio-cpal")]
pub mod resample;
pub mod synthetic;

use serde::{Deserialize, Serialize};

#[cfg(feature = "audio-cpal")]
pub use capture::CpalMicrophone;
pub use synthetic::SyntheticMicrophone;

/// Driver call succeeded.
pub const STATUS_OK: i32 = 0;
/// Generic driver failure. Any negative status is a failure.
pub const STATUS_ERROR: i32 = -1;

/// Fixed capture configuration handed to `MicrophoneDriver::init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrophoneConfig {
    /// ADC-capable GPIO used as the microphone input (26..=28).
    pub gpio: u8,
    /// Microphone DC bias in volts.
    pub bias_voltage: f32,
    /// Sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Samples per driver buffer; one capture event per filled buffer.
    pub sample_buffer_size: usize,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            gpio: 26,
            bias_voltage: 1.63,
            sample_rate_hz: 256,
            sample_buffer_size: 256,
        }
    }
}

/// Pull access to the samples of the buffer that just filled.
pub trait SampleReader {
    /// Copy up to `out.len()` converted samples into `out`; returns the count.
    fn read_samples(&mut self, out: &mut [i16]) -> usize;
}

/// Callback invoked by the driver each time its internal buffer fills.
pub type SamplesReadyHandler = Box<dyn FnMut(&mut dyn SampleReader) + Send + 'static>;

/// Contract for microphone capture drivers.
///
/// Status returns follow the board SDK convention: negative means failure.
pub trait MicrophoneDriver {
    /// Validate `config` and prepare the capture path. Does not start sampling.
    fn init(&mut self, config: &MicrophoneConfig) -> i32;

    /// Register the buffer-full callback. Replaces any previous handler.
    fn set_samples_ready_handler(&mut self, handler: SamplesReadyHandler);

    /// Begin sampling. Requires a successful `init`.
    fn start(&mut self) -> i32;
}

impl<D: MicrophoneDriver + ?Sized> MicrophoneDriver for Box<D> {
    fn init(&mut self, config: &MicrophoneConfig) -> i32 {
        (**self).init(config)
    }

    fn set_samples_ready_handler(&mut self, handler: SamplesReadyHandler) {
        (**self).set_samples_ready_handler(handler)
    }

    fn start(&mut self) -> i32 {
        (**self).start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_demo_board_wiring() {
        let config = MicrophoneConfig::default();
        assert_eq!(config.gpio, 26);
        assert_eq!(config.sample_rate_hz, 256);
        assert_eq!(config.sample_buffer_size, 256);
        assert!((config.bias_voltage - 1.63).abs() < 1e-6);
    }

    #[test]
    fn config_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(MicrophoneConfig::default()).expect("serialize config");
        assert_eq!(json["gpio"], 26);
        assert_eq!(json["sampleRateHz"], 256);
        assert_eq!(json["sampleBufferSize"], 256);
        let bias = json["biasVoltage"]
            .as_f64()
            .expect("bias should serialize as number");
        assert!((bias - 1.63).abs() < 1e-5);

        let round_trip: MicrophoneConfig =
            serde_json::from_value(json).expect("deserialize config");
        assert_eq!(round_trip, MicrophoneConfig::default());
    }

    #[test]
    fn config_rejects_snake_case_fields() {
        let raw = r#"{"gpio":26,"bias_voltage":1.6,"sample_rate_hz":256,"sample_buffer_size":256}"#;
        assert!(serde_json::from_str::<MicrophoneConfig>(raw).is_err());
    }
}
