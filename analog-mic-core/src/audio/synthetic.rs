//! ADC stand-in that needs no audio hardware.
//!
//! A worker thread paced at the configured sample rate fills a buffer of raw
//! 12-bit readings of a biased sine tone and fires the samples-ready handler
//! once per filled buffer, the way the board's DMA completion interrupt does.

use std::f64::consts::TAU;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::adc::{AdcFrontend, RawBatchReader};
use super::{
    MicrophoneConfig, MicrophoneDriver, SampleReader, SamplesReadyHandler, STATUS_ERROR, STATUS_OK,
};

type HandlerSlot = Arc<Mutex<Option<SamplesReadyHandler>>>;

pub struct SyntheticMicrophone {
    tone_hz: f32,
    amplitude: f32,
    config: Option<(MicrophoneConfig, AdcFrontend)>,
    handler: HandlerSlot,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticMicrophone {
    /// `amplitude` is a normalised level in `[0.0, 1.0]` of ADC half-scale.
    pub fn new(tone_hz: f32, amplitude: f32) -> Self {
        Self {
            tone_hz,
            amplitude: amplitude.clamp(0.0, 1.0),
            config: None,
            handler: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the worker thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                error!("synthetic ADC worker panicked");
            }
        }
    }
}

impl Default for SyntheticMicrophone {
    fn default() -> Self {
        Self::new(8.0, 0.5)
    }
}

impl Drop for SyntheticMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MicrophoneDriver for SyntheticMicrophone {
    fn init(&mut self, config: &MicrophoneConfig) -> i32 {
        match AdcFrontend::new(config) {
            Ok(frontend) => {
                debug!(bias = frontend.bias(), "synthetic ADC configured");
                self.config = Some((config.clone(), frontend));
                STATUS_OK
            }
            Err(e) => {
                warn!("synthetic microphone init rejected config: {e}");
                STATUS_ERROR
            }
        }
    }

    fn set_samples_ready_handler(&mut self, handler: SamplesReadyHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn start(&mut self) -> i32 {
        let Some((config, frontend)) = self.config.clone() else {
            warn!("synthetic microphone started before init");
            return STATUS_ERROR;
        };
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("synthetic microphone already running");
            return STATUS_ERROR;
        }

        let worker = Worker {
            frontend,
            buffer_size: config.sample_buffer_size,
            period: Duration::from_secs_f64(
                config.sample_buffer_size as f64 / config.sample_rate_hz as f64,
            ),
            phase_step: f64::from(self.tone_hz) / f64::from(config.sample_rate_hz),
            amplitude: self.amplitude,
            handler: Arc::clone(&self.handler),
            running: Arc::clone(&self.running),
        };

        match thread::Builder::new()
            .name("synthetic-adc".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                info!(
                    sample_rate = config.sample_rate_hz,
                    buffer = config.sample_buffer_size,
                    tone_hz = self.tone_hz,
                    "synthetic microphone started"
                );
                self.worker = Some(handle);
                STATUS_OK
            }
            Err(e) => {
                error!("failed to spawn synthetic ADC worker: {e}");
                self.running.store(false, Ordering::SeqCst);
                STATUS_ERROR
            }
        }
    }
}

struct Worker {
    frontend: AdcFrontend,
    buffer_size: usize,
    period: Duration,
    phase_step: f64,
    amplitude: f32,
    handler: HandlerSlot,
    running: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        let mut raw = vec![0u16; self.buffer_size];
        let mut phase = 0f64;
        let mut deadline = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            for code in raw.iter_mut() {
                let level = self.amplitude * (TAU * phase).sin() as f32;
                *code = self.frontend.quantize(level);
                phase = (phase + self.phase_step).fract();
            }

            // The buffer is "full" once a period of sampling time has passed.
            deadline += self.period;
            loop {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                match deadline.checked_duration_since(Instant::now()) {
                    Some(wait) if !wait.is_zero() => thread::park_timeout(wait),
                    _ => break,
                }
            }

            if let Some(handler) = self.handler.lock().as_mut() {
                let reader: &mut dyn SampleReader = &mut RawBatchReader::new(&raw, self.frontend);
                handler(reader);
            }
        }
    }
}
