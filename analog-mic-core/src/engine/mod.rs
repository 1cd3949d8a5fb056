//! Bring-up and lifecycle of the capture demo.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureEngine::new()
//!     └─► start()   → greeting, driver init, handler registered, driver start
//!         │           status = Listening
//!         │           (init/start failure: one diagnostic line, status = Halted)
//!         └─► run() → LED init, pipeline loop until the stop handle fires
//! ```
//!
//! Failures are terminal. The binary reports them and then calls [`halt`];
//! there is no retry path.
//!
//! ## Shared state
//!
//! The engine owns the single [`SampleHandoff`]. The samples-ready handler
//! registered with the driver captures a clone of the same `Arc`, so the
//! callback and the loop see one buffer and one ready count.

pub mod pipeline;

use std::io::Write;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    audio::{MicrophoneConfig, MicrophoneDriver, SampleReader},
    buffering::{SampleHandoff, DEFAULT_CAPACITY},
    error::{MicError, Result},
    indicator::Indicator,
};

use pipeline::{DiagnosticsSnapshot, PipelineContext, PipelineDiagnostics};

/// First line written to the sample stream.
pub const GREETING: &str = "hello analog microphone";

/// LED blink cadence of the consumer loop. Zero durations skip the sleep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedTiming {
    /// LED on-time after each emitted sample.
    pub blink_on_ms: u64,
    /// LED off-time after each emitted sample.
    pub blink_off_ms: u64,
    /// LED on-time at the end of every loop iteration.
    pub idle_ms: u64,
}

impl LedTiming {
    /// No sleeps at all; used by tests and benchmarks.
    pub const fn immediate() -> Self {
        Self {
            blink_on_ms: 0,
            blink_off_ms: 0,
            idle_ms: 0,
        }
    }
}

impl Default for LedTiming {
    fn default() -> Self {
        Self {
            blink_on_ms: 100,
            blink_off_ms: 100,
            idle_ms: 1_000,
        }
    }
}

/// Compiled-in configuration of the demo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub microphone: MicrophoneConfig,
    pub led: LedTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, `start()` not yet called.
    Idle,
    /// Driver capturing; the loop may run.
    Listening,
    /// Loop left because the stop handle fired.
    Stopped,
    /// Fatal error; nothing further will be emitted.
    Halted,
}

/// Clears the engine's `running` flag from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CaptureEngine<D, const N: usize = DEFAULT_CAPACITY> {
    config: EngineConfig,
    driver: D,
    handoff: Arc<SampleHandoff<N>>,
    running: Arc<AtomicBool>,
    status: EngineStatus,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl<D: MicrophoneDriver, const N: usize> CaptureEngine<D, N> {
    pub fn new(config: EngineConfig, driver: D) -> Self {
        Self {
            config,
            driver,
            handoff: Arc::new(SampleHandoff::new()),
            running: Arc::new(AtomicBool::new(false)),
            status: EngineStatus::Idle,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        }
    }

    /// Greet, then initialise the driver, register the handoff callback and
    /// start capturing.
    ///
    /// # Errors
    /// - `MicError::InitializationFailure` if `init` returns a negative status.
    ///   No handler is registered and `start` is never called.
    /// - `MicError::StartFailure` if `start` returns a negative status.
    ///
    /// Either failure writes exactly one diagnostic line to `out` and leaves
    /// the engine `Halted`.
    pub fn start<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<()> {
        writeln!(out, "{GREETING}")?;
        out.flush()?;

        info!(
            gpio = self.config.microphone.gpio,
            sample_rate = self.config.microphone.sample_rate_hz,
            buffer = self.config.microphone.sample_buffer_size,
            capacity = N,
            "initializing analog microphone"
        );
        let status = self.driver.init(&self.config.microphone);
        if status < 0 {
            return self.fail(MicError::InitializationFailure { status }, out);
        }

        let handoff = Arc::clone(&self.handoff);
        self.driver
            .set_samples_ready_handler(Box::new(move |reader: &mut dyn SampleReader| {
                handoff.on_capture_complete(reader);
            }));

        let status = self.driver.start();
        if status < 0 {
            return self.fail(MicError::StartFailure { status }, out);
        }

        self.running.store(true, Ordering::SeqCst);
        self.status = EngineStatus::Listening;
        info!("analog microphone capturing");
        Ok(())
    }

    /// Initialise the LED and run the consumer loop until stopped.
    ///
    /// # Errors
    /// - `MicError::NotStarted` unless `start()` succeeded.
    /// - `MicError::Indicator` if the LED fails to initialise.
    /// - `MicError::Io` if the sample stream cannot be written.
    pub fn run<I, W>(&mut self, indicator: &mut I, out: &mut W) -> Result<()>
    where
        I: Indicator + ?Sized,
        W: Write + ?Sized,
    {
        if self.status != EngineStatus::Listening {
            return Err(MicError::NotStarted);
        }

        let status = indicator.init();
        if status < 0 {
            error!(status, "indicator LED initialization failed");
            self.status = EngineStatus::Halted;
            return Err(MicError::Indicator { status });
        }

        let ctx = PipelineContext {
            handoff: Arc::clone(&self.handoff),
            running: Arc::clone(&self.running),
            timing: self.config.led.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        match pipeline::run(&ctx, indicator, out) {
            Ok(()) => {
                self.status = EngineStatus::Stopped;
                Ok(())
            }
            Err(e) => {
                error!("sample stream failed: {e}");
                self.status = EngineStatus::Halted;
                Err(e)
            }
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared buffer the driver callback publishes into.
    pub fn handoff(&self) -> &Arc<SampleHandoff<N>> {
        &self.handoff
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot::collect(&self.diagnostics, &self.handoff)
    }

    fn fail<W: Write + ?Sized>(&mut self, err: MicError, out: &mut W) -> Result<()> {
        error!(status = ?err.status(), "{err}");
        self.status = EngineStatus::Halted;
        writeln!(out, "{err}")?;
        out.flush()?;
        Err(err)
    }
}

/// Park the calling thread forever. Used after a fatal error.
pub fn halt() -> ! {
    info!("halted");
    loop {
        std::thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::audio::{SamplesReadyHandler, STATUS_OK};
    use crate::indicator::TraceIndicator;

    #[derive(Clone, Default)]
    struct Probe {
        calls: Arc<Mutex<Vec<&'static str>>>,
        handler: Arc<Mutex<Option<SamplesReadyHandler>>>,
    }

    struct ScriptedDriver {
        init_status: i32,
        start_status: i32,
        probe: Probe,
    }

    impl ScriptedDriver {
        fn new(init_status: i32, start_status: i32) -> (Self, Probe) {
            let probe = Probe::default();
            let driver = Self {
                init_status,
                start_status,
                probe: probe.clone(),
            };
            (driver, probe)
        }
    }

    impl MicrophoneDriver for ScriptedDriver {
        fn init(&mut self, _config: &MicrophoneConfig) -> i32 {
            self.probe.calls.lock().push("init");
            self.init_status
        }

        fn set_samples_ready_handler(&mut self, handler: SamplesReadyHandler) {
            self.probe.calls.lock().push("set_handler");
            *self.probe.handler.lock() = Some(handler);
        }

        fn start(&mut self) -> i32 {
            self.probe.calls.lock().push("start");
            self.start_status
        }
    }

    struct Fixed(Vec<i16>);

    impl SampleReader for Fixed {
        fn read_samples(&mut self, out: &mut [i16]) -> usize {
            let n = out.len().min(self.0.len());
            out[..n].copy_from_slice(&self.0[..n]);
            n
        }
    }

    struct BrokenLed;

    impl Indicator for BrokenLed {
        fn init(&mut self) -> i32 {
            -5
        }

        fn set(&mut self, _on: bool) {
            panic!("LED must not be driven after a failed init");
        }
    }

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            led: LedTiming::immediate(),
            ..EngineConfig::default()
        }
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .expect("utf8 output")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn init_failure_reports_once_and_never_starts() {
        let (driver, probe) = ScriptedDriver::new(-1, STATUS_OK);
        let mut engine: CaptureEngine<_> = CaptureEngine::new(quiet_config(), driver);
        let mut out = Vec::new();

        let err = engine.start(&mut out).unwrap_err();

        assert!(matches!(err, MicError::InitializationFailure { status: -1 }));
        assert_eq!(
            lines(&out),
            vec![GREETING, "analog microphone initialization failed!"]
        );
        assert_eq!(&*probe.calls.lock(), &vec!["init"]);
        assert!(probe.handler.lock().is_none());
        assert_eq!(engine.status(), EngineStatus::Halted);
        assert!(!engine.stop_handle().is_running());
    }

    #[test]
    fn start_failure_reports_once_after_registering_handler() {
        let (driver, probe) = ScriptedDriver::new(STATUS_OK, -2);
        let mut engine: CaptureEngine<_> = CaptureEngine::new(quiet_config(), driver);
        let mut out = Vec::new();

        let err = engine.start(&mut out).unwrap_err();

        assert!(matches!(err, MicError::StartFailure { status: -2 }));
        assert_eq!(err.status(), Some(-2));
        assert_eq!(
            lines(&out),
            vec![GREETING, "analog microphone start failed!"]
        );
        assert_eq!(&*probe.calls.lock(), &vec!["init", "set_handler", "start"]);
        assert_eq!(engine.status(), EngineStatus::Halted);
    }

    #[test]
    fn halted_engine_refuses_to_run() {
        let (driver, _probe) = ScriptedDriver::new(-1, STATUS_OK);
        let mut engine: CaptureEngine<_> = CaptureEngine::new(quiet_config(), driver);
        let mut out = Vec::new();
        let _ = engine.start(&mut out);
        out.clear();

        let mut led = TraceIndicator::new();
        let err = engine.run(&mut led, &mut out).unwrap_err();

        assert!(matches!(err, MicError::NotStarted));
        assert!(out.is_empty());
        assert_eq!(led.times_lit(), 0);
    }

    #[test]
    fn registered_handler_publishes_into_engine_handoff() {
        let (driver, probe) = ScriptedDriver::new(STATUS_OK, STATUS_OK);
        let mut engine: CaptureEngine<_, 8> = CaptureEngine::new(quiet_config(), driver);
        let mut out = Vec::new();

        engine.start(&mut out).expect("start");
        assert_eq!(engine.status(), EngineStatus::Listening);
        assert_eq!(lines(&out), vec![GREETING]);

        let reader: &mut dyn SampleReader = &mut Fixed(vec![4, 5, 6]);
        let mut handler = probe.handler.lock().take().expect("handler registered");
        handler(reader);

        assert_eq!(engine.handoff().ready_count(), 3);
        let drained: Vec<i16> = engine.handoff().drain().iter().map(|(_, s)| s).collect();
        assert_eq!(drained, vec![4, 5, 6]);
    }

    #[test]
    fn indicator_failure_halts_before_emitting() {
        let (driver, _probe) = ScriptedDriver::new(STATUS_OK, STATUS_OK);
        let mut engine: CaptureEngine<_, 8> = CaptureEngine::new(quiet_config(), driver);
        let mut out = Vec::new();
        engine.start(&mut out).expect("start");
        engine.handoff().publish(&[1, 2]);
        out.clear();

        let err = engine.run(&mut BrokenLed, &mut out).unwrap_err();

        assert!(matches!(err, MicError::Indicator { status: -5 }));
        assert!(out.is_empty());
        assert_eq!(engine.status(), EngineStatus::Halted);
        assert_eq!(engine.handoff().ready_count(), 2);
    }

    #[test]
    fn run_returns_when_stop_handle_fired() {
        let (driver, _probe) = ScriptedDriver::new(STATUS_OK, STATUS_OK);
        let mut engine: CaptureEngine<_, 8> = CaptureEngine::new(quiet_config(), driver);
        let mut out = Vec::new();
        engine.start(&mut out).expect("start");
        engine.stop_handle().stop();

        let mut led = TraceIndicator::new();
        engine.run(&mut led, &mut out).expect("run");

        assert_eq!(engine.status(), EngineStatus::Stopped);
    }

    #[test]
    fn boxed_driver_is_driven_through_the_engine() {
        let (driver, probe) = ScriptedDriver::new(STATUS_OK, STATUS_OK);
        let boxed: Box<dyn MicrophoneDriver> = Box::new(driver);
        let mut engine: CaptureEngine<_, 8> = CaptureEngine::new(quiet_config(), boxed);
        let mut out = Vec::new();

        engine.start(&mut out).expect("start");

        assert_eq!(&*probe.calls.lock(), &vec!["init", "set_handler", "start"]);
        assert_eq!(engine.status(), EngineStatus::Listening);
    }

    #[test]
    fn accessors_expose_config_and_driver() {
        let (driver, _probe) = ScriptedDriver::new(-3, STATUS_OK);
        let engine: CaptureEngine<_> = CaptureEngine::new(quiet_config(), driver);

        assert_eq!(engine.config().led, LedTiming::immediate());
        assert_eq!(engine.config().microphone, MicrophoneConfig::default());
        assert_eq!(engine.driver().init_status, -3);
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[test]
    fn engine_config_serializes_nested_camel_case() {
        let json = serde_json::to_value(EngineConfig::default()).expect("serialize config");
        assert_eq!(json["microphone"]["sampleRateHz"], 256);
        assert_eq!(json["led"]["blinkOnMs"], 100);
        assert_eq!(json["led"]["idleMs"], 1000);

        let status = serde_json::to_value(EngineStatus::Halted).expect("serialize status");
        assert_eq!(status, "halted");
    }
}
