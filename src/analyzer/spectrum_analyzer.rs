//! Spectrum Analyzer
//!
//! Render-side aggregate: one [`PathProducer`] per channel, a private
//! [`MonoChain`] for the response curve, and the periodic [`RenderTimer`]
//! that drives everything at the display refresh rate.
//!
//! Nothing here runs on the audio thread. Parameter changes reach the
//! analyzer through a coalescing [`ChangeFlag`] registered as a listener on
//! every parameter; the listeners are removed again when the analyzer is
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::dsp::{
    ChainCoefficients, ChangeFlag, ListenerId, MonoChain, ParameterId, ParameterStore,
    ResponseCurve,
};
use crate::engine::processor::AnalyzerInputs;

use super::fft_data::FftOrder;
use super::path::{AnalyzerPath, PathBuilder, Rect};
use super::path_producer::PathProducer;

/// Minimum spacing between two dropped-frame warnings.
const WARNING_INTERVAL: Duration = Duration::from_secs(1);

/// Channel selector for analyzer output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Analyzer state owned by the render thread.
pub struct SpectrumAnalyzer {
    parameters: Arc<ParameterStore>,
    changed: Arc<ChangeFlag>,
    listener_ids: Vec<ListenerId>,
    producers: [PathProducer; 2],
    sample_rate: f64,
    bounds: Rect,
    response_chain: MonoChain,
    response: ResponseCurve,
    dropped_pending: u64,
    last_warning: Option<Instant>,
}

impl SpectrumAnalyzer {
    /// Creates an analyzer over the FIFO readers handed out by the
    /// processor's `prepare`.
    pub fn new(
        parameters: Arc<ParameterStore>,
        inputs: AnalyzerInputs,
        order: FftOrder,
        builder: PathBuilder,
    ) -> Self {
        let changed = Arc::new(ChangeFlag::new(true));
        let listener_ids = parameters.add_listener_to_all(changed.clone());

        let AnalyzerInputs {
            left,
            right,
            sample_rate,
        } = inputs;

        let mut response_chain = MonoChain::new();
        response_chain.prepare(sample_rate, 0);

        debug!(
            "spectrum analyzer ready: fft_size={}, sample_rate={}",
            order.size(),
            sample_rate
        );

        Self {
            parameters,
            changed,
            listener_ids,
            producers: [
                PathProducer::new(left, order, builder.clone()),
                PathProducer::new(right, order, builder),
            ],
            sample_rate,
            bounds: Rect::default(),
            response_chain,
            response: ResponseCurve::new(),
            dropped_pending: 0,
            last_warning: None,
        }
    }

    /// Sets the rectangle paths are laid out in. Also resamples the
    /// response curve at one point per horizontal unit.
    pub fn set_bounds(&mut self, bounds: Rect) {
        if bounds != self.bounds {
            self.bounds = bounds;
            self.changed.raise();
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// One timer tick: refresh the response curve if parameters changed,
    /// then drain both channels and rebuild their paths.
    pub fn tick(&mut self) {
        if self.changed.consume() {
            self.refresh_response();
        }

        let analyze = self.parameters.get_bool(ParameterId::AnalyzerEnabled);
        for producer in &mut self.producers {
            producer.process(self.bounds, self.sample_rate, analyze);
        }

        self.report_dropped_frames();
    }

    /// Most recently built path for a channel.
    pub fn latest_path(&self, channel: Channel) -> &AnalyzerPath {
        self.producers[channel.index()].path()
    }

    /// Magnitude response of the current settings, one value per column.
    pub fn response_curve(&self) -> &ResponseCurve {
        &self.response
    }

    /// Sample rate of the analyzed audio.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn refresh_response(&mut self) {
        let snapshot = self.parameters.snapshot();
        let coefficients = ChainCoefficients::from_snapshot(&snapshot, self.sample_rate);
        self.response_chain.update(&coefficients, &snapshot);
        let width = self.bounds.width.max(0.0) as usize;
        self.response.compute(&self.response_chain, width);
    }

    fn report_dropped_frames(&mut self) {
        self.dropped_pending += self.producers.iter().map(|p| p.take_dropped()).sum::<u64>();
        if self.dropped_pending == 0 {
            return;
        }
        let now = Instant::now();
        let due = self
            .last_warning
            .map_or(true, |last| now.duration_since(last) >= WARNING_INTERVAL);
        if due {
            warn!(
                "analyzer fell behind: {} frames dropped",
                self.dropped_pending
            );
            self.dropped_pending = 0;
            self.last_warning = Some(now);
        }
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        for id in self.listener_ids.drain(..) {
            self.parameters.remove_listener(id);
        }
    }
}

/// Thread that ticks a shared analyzer at a fixed rate.
///
/// Consumers lock the same mutex to read paths; the audio thread never
/// touches it.
pub struct RenderTimer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RenderTimer {
    /// Starts ticking `analyzer` `refresh_hz` times per second.
    pub fn start(analyzer: Arc<Mutex<SpectrumAnalyzer>>, refresh_hz: f32) -> std::io::Result<Self> {
        let period = Duration::from_secs_f32(1.0 / refresh_hz.max(1.0));
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("analyzer-render".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    let started = Instant::now();
                    analyzer.lock().tick();
                    if let Some(remaining) = period.checked_sub(started.elapsed()) {
                        thread::sleep(remaining);
                    }
                }
            })?;

        debug!("render timer started at {} Hz", refresh_hz);
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Returns true while the thread is running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the timer and waits for the in-flight tick to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("render timer thread panicked");
            }
        }
    }
}

impl Drop for RenderTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
