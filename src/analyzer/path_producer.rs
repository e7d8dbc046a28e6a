//! Per-channel analysis: channel FIFO -> rolling buffer -> FFT -> path.

use crate::engine::channel_fifo::{ChannelFifoReader, FrameReader};

use super::fft_data::{FftDataGenerator, FftOrder};
use super::path::{AnalyzerPath, PathBuilder, Rect};

/// Turns one channel's audio frames into an analyzer path.
///
/// Lives on the render thread. The rolling buffer always holds the most
/// recent `fft_size` samples, so consecutive transforms overlap by
/// `fft_size - frame_size` samples.
pub struct PathProducer {
    fifo: ChannelFifoReader,
    incoming: Vec<f32>,
    rolling: Vec<f32>,
    generator: FftDataGenerator,
    spectrum_fifo: FrameReader,
    spectrum: Vec<f32>,
    builder: PathBuilder,
    path: AnalyzerPath,
}

impl PathProducer {
    /// Creates a producer reading from `fifo`.
    pub fn new(fifo: ChannelFifoReader, order: FftOrder, builder: PathBuilder) -> Self {
        let size = order.size();
        let (generator, spectrum_fifo) = FftDataGenerator::new(order, builder.floor_db());
        Self {
            incoming: vec![0.0; fifo.frame_size()],
            fifo,
            rolling: vec![0.0; size],
            generator,
            spectrum_fifo,
            spectrum: vec![builder.floor_db(); size],
            builder,
            path: AnalyzerPath::new(),
        }
    }

    /// Transform size.
    pub fn fft_size(&self) -> usize {
        self.rolling.len()
    }

    /// Most recently built path.
    pub fn path(&self) -> &AnalyzerPath {
        &self.path
    }

    /// Drains the channel FIFO and, if `analyze` is set, rebuilds the path
    /// from the newest spectrum.
    ///
    /// With `analyze` off the frames are discarded and the path is emptied.
    /// Returns true if a new path was built.
    pub fn process(&mut self, rect: Rect, sample_rate: f64, analyze: bool) -> bool {
        let mut fresh = false;
        while self.fifo.pull(&mut self.incoming) {
            if analyze {
                self.roll_in();
                self.generator.produce(&self.rolling);
                // Drained per frame so the spectrum FIFO never fills up and
                // refuses the newest spectrum.
                fresh |= self.spectrum_fifo.pull_latest(&mut self.spectrum);
            }
        }

        if !analyze {
            self.path.clear();
            while self.spectrum_fifo.pull(&mut self.spectrum) {}
            return false;
        }

        if fresh {
            let fft_size = self.fft_size();
            self.builder
                .build(&mut self.path, &self.spectrum, rect, fft_size, sample_rate);
        }
        fresh
    }

    /// Frames dropped since the last call, on either FIFO.
    pub fn take_dropped(&self) -> u64 {
        self.fifo.take_dropped() + self.spectrum_fifo.take_dropped()
    }

    fn roll_in(&mut self) {
        let size = self.rolling.len();
        let frame = &self.incoming;
        if frame.len() >= size {
            self.rolling.copy_from_slice(&frame[frame.len() - size..]);
        } else {
            self.rolling.copy_within(frame.len().., 0);
            self.rolling[size - frame.len()..].copy_from_slice(frame);
        }
    }
}
