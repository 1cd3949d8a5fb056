//! # analog-mic-core
//!
//! Capture loop of the analog microphone demo: raw ADC samples in, one
//! decimal sample per line out.
//!
//! ## Architecture
//!
//! ```text
//! MicrophoneDriver (ADC / cpal / synthetic)
//!         │  buffer full
//!         ▼
//! samples-ready handler → SampleHandoff::on_capture_complete
//!                                │  ready count (atomic)
//!                                ▼
//!                 pipeline loop: drain() → "<sample>\n" → LED blink
//! ```
//!
//! The handler only copies samples and publishes a count. Formatting, output
//! and LED timing all happen on the loop thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod indicator;

// Convenience re-exports for the binary
pub use audio::{MicrophoneConfig, MicrophoneDriver, SampleReader, SyntheticMicrophone};
pub use buffering::SampleHandoff;
pub use engine::{halt, CaptureEngine, EngineConfig, EngineStatus, LedTiming, StopHandle, GREETING};
pub use error::MicError;
pub use indicator::{Indicator, TraceIndicator};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalMicrophone;
