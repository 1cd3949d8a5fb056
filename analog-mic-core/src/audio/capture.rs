//! Host input device driven through cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It only mixes to mono and pushes into an SPSC ring whose `push_slice` is
//! lock-free. Everything that resembles the board's ADC path (rate
//! conversion, 12-bit quantisation around the bias, buffer-full callback)
//! happens on a separate sampler thread:
//!
//! ```text
//! cpal callback → HeapRb<f32> → sampler thread → RateConverter → AdcFrontend
//!                                                    │
//!                                      samples-ready handler (per buffer)
//! ```
//!
//! `cpal::Stream` is `!Send`, so this driver must be created, started and
//! dropped on the same thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use tracing::{error, info, warn};

use super::adc::{AdcFrontend, RawBatchReader};
use super::resample::RateConverter;
use super::{
    MicrophoneConfig, MicrophoneDriver, SampleReader, SamplesReadyHandler, STATUS_ERROR, STATUS_OK,
};
use crate::error::{MicError, Result};

type HandlerSlot = Arc<Mutex<Option<SamplesReadyHandler>>>;

/// Seconds of device audio the ring can hold before the callback drops frames.
const RING_SECONDS: usize = 2;
/// Frames popped from the ring per sampler iteration.
const POP_CHUNK: usize = 1024;
/// Frames mixed to mono per push inside the real-time callback.
const MIX_CHUNK: usize = 256;
/// Sampler back-off when the ring is empty.
const SAMPLER_IDLE_MS: u64 = 2;

struct Prepared {
    device: Device,
    supported: SupportedStreamConfig,
    config: MicrophoneConfig,
    frontend: AdcFrontend,
}

pub struct CpalMicrophone {
    preferred_device: Option<String>,
    prepared: Option<Prepared>,
    handler: HandlerSlot,
    running: Arc<AtomicBool>,
    stream: Option<Stream>,
    sampler: Option<JoinHandle<()>>,
}

impl CpalMicrophone {
    /// Capture from the system default input device.
    pub fn new() -> Self {
        Self::with_preferred_device(None)
    }

    /// Capture from the named input device, falling back to the default.
    pub fn with_preferred_device(name: Option<String>) -> Self {
        Self {
            preferred_device: name,
            prepared: None,
            handler: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            stream: None,
            sampler: None,
        }
    }

    /// Stop the stream and the sampler thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
        if let Some(sampler) = self.sampler.take() {
            if sampler.join().is_err() {
                error!("cpal sampler thread panicked");
            }
        }
    }

    fn prepare(&self, config: &MicrophoneConfig) -> Result<Prepared> {
        let frontend = AdcFrontend::new(config)?;
        let host = cpal::default_host();

        let mut selected = None;
        if let Some(preferred) = self.preferred_device.as_deref() {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => warn!("failed to list input devices: {e}"),
            }
        }

        let device = match selected.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => host
                .input_devices()
                .map_err(|e| MicError::AudioDevice(e.to_string()))?
                .next()
                .ok_or_else(|| MicError::AudioDevice("no input device found".into()))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| MicError::AudioDevice(e.to_string()))?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            device_rate = supported.sample_rate().0,
            channels = supported.channels(),
            "input device selected"
        );

        Ok(Prepared {
            device,
            supported,
            config: config.clone(),
            frontend,
        })
    }

    fn open(&mut self) -> Result<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| MicError::AudioStream("started before init".into()))?;

        let device_rate = prepared.supported.sample_rate().0;
        let channels = prepared.supported.channels() as usize;
        let stream_config = StreamConfig {
            channels: prepared.supported.channels(),
            sample_rate: prepared.supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = HeapRb::<f32>::new(device_rate as usize * RING_SECONDS).split();
        let device = &prepared.device;
        let running = Arc::clone(&self.running);

        let stream = match prepared.supported.sample_format() {
            SampleFormat::F32 => {
                build_mono_input::<f32>(device, &stream_config, channels, producer, running, |s| s)
            }
            SampleFormat::I16 => build_mono_input::<i16>(
                device,
                &stream_config,
                channels,
                producer,
                running,
                |s| s as f32 / 32768.0,
            ),
            SampleFormat::U16 => build_mono_input::<u16>(
                device,
                &stream_config,
                channels,
                producer,
                running,
                |s| (s as f32 - 32768.0) / 32768.0,
            ),
            SampleFormat::U8 => build_mono_input::<u8>(
                device,
                &stream_config,
                channels,
                producer,
                running,
                |s| (s as f32 - 128.0) / 128.0,
            ),
            fmt => {
                return Err(MicError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        let converter = RateConverter::new(
            device_rate,
            prepared.config.sample_rate_hz,
            (device_rate as usize / 100).max(1),
        )?;
        let sampler = Sampler {
            consumer,
            converter,
            frontend: prepared.frontend,
            buffer_size: prepared.config.sample_buffer_size,
            handler: Arc::clone(&self.handler),
            running: Arc::clone(&self.running),
        };
        let handle = thread::Builder::new()
            .name("mic-sampler".into())
            .spawn(move || sampler.run())?;

        stream
            .play()
            .map_err(|e| MicError::AudioStream(e.to_string()))?;

        self.stream = Some(stream);
        self.sampler = Some(handle);
        Ok(())
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MicrophoneDriver for CpalMicrophone {
    fn init(&mut self, config: &MicrophoneConfig) -> i32 {
        match self.prepare(config) {
            Ok(prepared) => {
                self.prepared = Some(prepared);
                STATUS_OK
            }
            Err(e) => {
                error!("cpal microphone init failed: {e}");
                STATUS_ERROR
            }
        }
    }

    fn set_samples_ready_handler(&mut self, handler: SamplesReadyHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn start(&mut self) -> i32 {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("cpal microphone already running");
            return STATUS_ERROR;
        }
        match self.open() {
            Ok(()) => {
                info!("cpal microphone capturing");
                STATUS_OK
            }
            Err(e) => {
                error!("cpal microphone start failed: {e}");
                self.stop();
                STATUS_ERROR
            }
        }
    }
}

fn build_mono_input<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    mut producer: HeapProd<f32>,
    running: Arc<AtomicBool>,
    to_f32: fn(T) -> f32,
) -> Result<Stream>
where
    T: SizedSample,
{
    let channels = channels.max(1);
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                // Fixed-size stack chunk: periods of any length never allocate here.
                let mut mono = [0f32; MIX_CHUNK];
                let mut dropped = 0usize;
                for block in data.chunks(MIX_CHUNK * channels) {
                    let frames = mix_to_mono(block, channels, to_f32, &mut mono);
                    dropped += frames - producer.push_slice(&mono[..frames]);
                }
                if dropped > 0 {
                    warn!("ring buffer full: dropped {dropped} frames");
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| MicError::AudioStream(e.to_string()))
}

/// Average interleaved `block` into `mono`; returns the frame count.
///
/// `block` must hold at most `mono.len()` frames.
fn mix_to_mono<T: Copy>(
    block: &[T],
    channels: usize,
    to_f32: fn(T) -> f32,
    mono: &mut [f32],
) -> usize {
    let mut frames = 0;
    for (dst, frame) in mono.iter_mut().zip(block.chunks(channels)) {
        *dst = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32;
        frames += 1;
    }
    frames
}

struct Sampler {
    consumer: HeapCons<f32>,
    converter: RateConverter,
    frontend: AdcFrontend,
    buffer_size: usize,
    handler: HandlerSlot,
    running: Arc<AtomicBool>,
}

impl Sampler {
    fn run(mut self) {
        let mut scratch = vec![0f32; POP_CHUNK];
        let mut resampled: Vec<f32> = Vec::new();
        let mut raw: Vec<u16> = Vec::with_capacity(self.buffer_size);

        while self.running.load(Ordering::Relaxed) {
            let n = self.consumer.pop_slice(&mut scratch);
            if n == 0 {
                thread::sleep(Duration::from_millis(SAMPLER_IDLE_MS));
                continue;
            }

            resampled.clear();
            self.converter.process_into(&scratch[..n], &mut resampled);
            for &level in &resampled {
                raw.push(self.frontend.quantize(level));
                if raw.len() == self.buffer_size {
                    if let Some(handler) = self.handler.lock().as_mut() {
                        let reader: &mut dyn SampleReader =
                            &mut RawBatchReader::new(&raw, self.frontend);
                        handler(reader);
                    }
                    raw.clear();
                }
            }
        }
    }
}
