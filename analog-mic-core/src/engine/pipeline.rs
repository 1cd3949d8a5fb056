//! Consumer loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. drain() the handoff (never blocks; may be empty)
//! 2. for each sample: write "<value>\n", LED on, sleep, LED off, sleep
//! 3. LED on, idle sleep
//! ```
//!
//! The loop is cooperative and polls at the LED cadence. A capture event
//! that lands while a batch is still being written replaces it; see
//! [`crate::buffering`].

use std::io::Write;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    buffering::{HandoffSnapshot, SampleHandoff},
    engine::LedTiming,
    error::Result,
    indicator::Indicator,
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub polls: AtomicUsize,
    pub empty_polls: AtomicUsize,
    pub samples_emitted: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.polls.store(0, Ordering::Relaxed);
        self.empty_polls.store(0, Ordering::Relaxed);
        self.samples_emitted.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub polls: usize,
    pub empty_polls: usize,
    pub samples_emitted: usize,
    pub handoff: HandoffSnapshot,
}

impl DiagnosticsSnapshot {
    pub fn collect<const N: usize>(
        diagnostics: &PipelineDiagnostics,
        handoff: &SampleHandoff<N>,
    ) -> Self {
        Self {
            polls: diagnostics.polls.load(Ordering::Relaxed),
            empty_polls: diagnostics.empty_polls.load(Ordering::Relaxed),
            samples_emitted: diagnostics.samples_emitted.load(Ordering::Relaxed),
            handoff: handoff.stats().snapshot(),
        }
    }
}

/// Everything the loop needs, bundled so the engine can hand it over in one piece.
pub struct PipelineContext<const N: usize> {
    pub handoff: Arc<SampleHandoff<N>>,
    pub running: Arc<AtomicBool>,
    pub timing: LedTiming,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the loop until `ctx.running` becomes false or the stream fails.
pub fn run<I, W, const N: usize>(
    ctx: &PipelineContext<N>,
    indicator: &mut I,
    out: &mut W,
) -> Result<()>
where
    I: Indicator + ?Sized,
    W: Write + ?Sized,
{
    info!(capacity = N, "pipeline started");

    let result = loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break Ok(());
        }
        if let Err(e) = poll_once(ctx, indicator, out) {
            break Err(e);
        }
    };

    let snap = DiagnosticsSnapshot::collect(&ctx.diagnostics, &ctx.handoff);
    info!(
        polls = snap.polls,
        empty_polls = snap.empty_polls,
        samples_emitted = snap.samples_emitted,
        samples_published = snap.handoff.samples_published,
        samples_overwritten = snap.handoff.samples_overwritten,
        "pipeline stopped: diagnostics"
    );
    result
}

/// One loop iteration. Returns the number of samples claimed by the drain.
///
/// A stop request is honoured between samples, so a batch may be cut short.
pub fn poll_once<I, W, const N: usize>(
    ctx: &PipelineContext<N>,
    indicator: &mut I,
    out: &mut W,
) -> Result<usize>
where
    I: Indicator + ?Sized,
    W: Write + ?Sized,
{
    ctx.diagnostics.polls.fetch_add(1, Ordering::Relaxed);

    let batch = ctx.handoff.drain();
    if batch.is_empty() {
        ctx.diagnostics.empty_polls.fetch_add(1, Ordering::Relaxed);
    } else {
        debug!(count = batch.len(), "draining batch");
    }

    for (_, sample) in &batch {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }
        writeln!(out, "{sample}")?;
        out.flush()?;
        ctx.diagnostics
            .samples_emitted
            .fetch_add(1, Ordering::Relaxed);

        indicator.set(true);
        pause(ctx.timing.blink_on_ms);
        indicator.set(false);
        pause(ctx.timing.blink_off_ms);
    }

    indicator.set(true);
    pause(ctx.timing.idle_ms);
    Ok(batch.len())
}

fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
