//! FFT Data Generator
//!
//! Turns a block of mono audio into a spectrum frame: Blackman-Harris window,
//! forward real FFT, magnitude normalized by `fft_size / 2`, then decibels
//! clamped to a floor. Frames are published on a [`FrameWriter`] so the
//! render thread can decouple analysis from path building.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::engine::channel_fifo::{frame_fifo, FrameReader, FrameWriter, FIFO_CAPACITY};

/// Lowest level shown by the analyzer.
pub const DEFAULT_FLOOR_DB: f32 = -48.0;

/// Supported FFT sizes, as powers of two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FftOrder {
    #[default]
    Order2048 = 11,
    Order4096 = 12,
    Order8192 = 13,
}

impl FftOrder {
    /// Number of points in the transform.
    pub fn size(self) -> usize {
        1 << (self as u32)
    }

    /// Parses a point count.
    pub fn from_size(size: usize) -> Option<Self> {
        match size {
            2048 => Some(FftOrder::Order2048),
            4096 => Some(FftOrder::Order4096),
            8192 => Some(FftOrder::Order8192),
            _ => None,
        }
    }
}

/// Four-term Blackman-Harris window of `size` points.
pub fn blackman_harris(size: usize) -> Vec<f32> {
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;

    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f64::consts::PI * i as f64 / denom;
            (A0 - A1 * x.cos() + A2 * (2.0 * x).cos() - A3 * (3.0 * x).cos()) as f32
        })
        .collect()
}

/// Converts a linear gain to decibels, never going below `floor_db`.
#[inline]
pub fn gain_to_db(gain: f32, floor_db: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(floor_db)
    } else {
        floor_db
    }
}

/// Windowed FFT producer of spectrum frames.
///
/// Owns the FFT plan and all working storage; after construction
/// [`produce`](Self::produce) does not allocate.
pub struct FftDataGenerator {
    order: FftOrder,
    floor_db: f32,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    frame: Vec<f32>,
    writer: FrameWriter,
}

impl FftDataGenerator {
    /// Creates a generator and the reader of its spectrum FIFO.
    pub fn new(order: FftOrder, floor_db: f32) -> (Self, FrameReader) {
        let size = order.size();
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        let input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let (writer, reader) = frame_fifo(FIFO_CAPACITY, size);

        let generator = Self {
            order,
            floor_db,
            fft,
            window: blackman_harris(size),
            input,
            spectrum,
            scratch,
            frame: vec![floor_db; size],
            writer,
        };
        (generator, reader)
    }

    /// Transform size.
    pub fn order(&self) -> FftOrder {
        self.order
    }

    /// Display floor in dB.
    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Computes the spectrum of `audio` into the internal frame.
    ///
    /// `audio` shorter than the transform is zero-padded. The returned frame
    /// has `fft_size` entries; bins `0..=fft_size/2` hold dB magnitudes and
    /// the rest sit at the floor.
    pub fn analyze(&mut self, audio: &[f32]) -> &[f32] {
        let size = self.order.size();
        let len = audio.len().min(size);
        self.input[..len].copy_from_slice(&audio[..len]);
        self.input[len..].fill(0.0);

        for (sample, w) in self.input.iter_mut().zip(self.window.iter()) {
            *sample *= w;
        }

        if self
            .fft
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .is_err()
        {
            self.frame.fill(self.floor_db);
            return &self.frame;
        }

        let scale = 1.0 / (size as f32 / 2.0);
        for (bin, value) in self.spectrum.iter().enumerate() {
            self.frame[bin] = gain_to_db(value.norm() * scale, self.floor_db);
        }
        self.frame[self.spectrum.len()..].fill(self.floor_db);
        &self.frame
    }

    /// Analyzes `audio` and publishes the frame on the spectrum FIFO.
    ///
    /// Returns false if the FIFO was full and the frame was dropped.
    pub fn produce(&mut self, audio: &[f32]) -> bool {
        self.analyze(audio);
        self.writer.push_slice(&self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fft_order_sizes() {
        assert_eq!(FftOrder::Order2048.size(), 2048);
        assert_eq!(FftOrder::Order8192.size(), 8192);
        assert_eq!(FftOrder::from_size(4096), Some(FftOrder::Order4096));
        assert_eq!(FftOrder::from_size(1000), None);
    }

    #[test]
    fn test_window_shape() {
        let window = blackman_harris(2048);
        assert_eq!(window.len(), 2048);
        assert!(window[0] < 1e-4, "edges should be near zero: {}", window[0]);
        assert_relative_eq!(window[0], window[2047], epsilon = 1e-6);
        let peak = window.iter().cloned().fold(0.0f32, f32::max);
        assert_relative_eq!(peak, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_gain_to_db_floor() {
        assert_eq!(gain_to_db(0.0, -48.0), -48.0);
        assert_eq!(gain_to_db(1e-6, -48.0), -48.0);
        assert_relative_eq!(gain_to_db(0.5, -48.0), -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn test_silence_sits_at_floor() {
        let (mut generator, _reader) = FftDataGenerator::new(FftOrder::Order2048, DEFAULT_FLOOR_DB);
        let frame = generator.analyze(&vec![0.0; 2048]);
        assert_eq!(frame.len(), 2048);
        assert!(frame.iter().all(|&db| db == DEFAULT_FLOOR_DB));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let size = 2048;
        let sample_rate = 48000.0;
        let bin = 64;
        let freq = bin as f64 * sample_rate / size as f64;
        let audio: Vec<f32> = (0..size)
            .map(|n| (2.0 * std::f64::consts::PI * freq * n as f64 / sample_rate).sin() as f32)
            .collect();

        let (mut generator, _reader) = FftDataGenerator::new(FftOrder::Order2048, DEFAULT_FLOOR_DB);
        let frame = generator.analyze(&audio).to_vec();

        let (peak_bin, _) = frame[..size / 2]
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &db)| if db > best.1 { (i, db) } else { best });
        assert_eq!(peak_bin, bin);
        // Blackman-Harris coherent gain is a0, so a full-scale sine reads
        // about 20*log10(0.35875).
        assert_relative_eq!(frame[bin], -8.9, epsilon = 0.2);
        assert!(frame[bin + 20] < -40.0, "far bins should be low: {}", frame[bin + 20]);
    }

    #[test]
    fn test_produce_publishes_frames() {
        let (mut generator, mut reader) = FftDataGenerator::new(FftOrder::Order2048, DEFAULT_FLOOR_DB);
        assert!(generator.produce(&vec![0.1; 2048]));
        assert!(generator.produce(&vec![0.2; 2048]));
        assert_eq!(reader.num_available(), 2);

        let mut frame = Vec::new();
        assert!(reader.pull_latest(&mut frame));
        assert_eq!(frame.len(), 2048);
        assert_eq!(reader.num_available(), 0);
    }
}
