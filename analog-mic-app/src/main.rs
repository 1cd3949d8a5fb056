//! hello analog microphone.
//!
//! Streams every captured sample to stdout as a decimal line and blinks the
//! indicator once per sample. Diagnostics go to stderr so stdout can be
//! piped straight into a plotter.
//!
//! The process never exits on its own: after a fatal error (or if the loop
//! ever returns) the main thread parks forever.

use std::io;

use analog_mic_core::{halt, CaptureEngine, EngineConfig, MicrophoneDriver, TraceIndicator};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "hello_analog_mic=info,analog_mic_core=info";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let config = EngineConfig::default();
    if let Err(e) = log_config(&config) {
        warn!("could not render configuration: {e:#}");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut engine: CaptureEngine<_> = CaptureEngine::new(config, build_driver());
    if engine.start(&mut out).is_err() {
        // The engine already wrote the diagnostic line.
        halt();
    }

    let mut led = TraceIndicator::new();
    if let Err(e) = engine.run(&mut led, &mut out) {
        error!("capture loop ended: {e}");
    }
    halt()
}

fn log_config(config: &EngineConfig) -> anyhow::Result<()> {
    let json = serde_json::to_string(config)?;
    info!(config = %json, "hello analog microphone starting");
    Ok(())
}

fn build_driver() -> Box<dyn MicrophoneDriver> {
    #[cfg(feature = "audio-cpal")]
    {
        info!("using cpal input device");
        Box::new(analog_mic_core::CpalMicrophone::new())
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        info!("using synthetic ADC source");
        Box::new(analog_mic_core::SyntheticMicrophone::default())
    }
}
