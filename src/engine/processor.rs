//! Block Processor
//!
//! The real-time entry point of the equalizer. Each block it snapshots the
//! parameters, designs fresh coefficients, runs the left and right chains in
//! place and tees the result into the analyzer FIFOs.

use std::sync::Arc;

use log::debug;

use crate::analyzer::FftOrder;
use crate::dsp::{ChainCoefficients, MonoChain, ParameterStore};
use crate::persistence::{self, StateError};

use super::audio_buffer::AudioBuffer;
use super::channel_fifo::{channel_fifo, ChannelFifoReader, ChannelFifoWriter};

/// Render-side ends of the analyzer FIFOs created by [`EqProcessor::prepare`].
pub struct AnalyzerInputs {
    pub left: ChannelFifoReader,
    pub right: ChannelFifoReader,
    pub sample_rate: f64,
}

/// Stereo equalizer processor.
///
/// This struct is moved into the audio callback. The parameter store is
/// shared with the control thread through an `Arc`; everything else is
/// owned exclusively by the audio thread once playback starts.
pub struct EqProcessor {
    /// Shared parameter values.
    parameters: Arc<ParameterStore>,
    /// Left channel chain (also used for mono input).
    left: MonoChain,
    /// Right channel chain.
    right: MonoChain,
    /// Audio-thread ends of the analyzer FIFOs.
    fifo_writers: Option<[ChannelFifoWriter; 2]>,
    /// Render-thread ends, waiting to be claimed.
    analyzer_inputs: Option<AnalyzerInputs>,
    /// FFT size the FIFO frames are sized for.
    fft_order: FftOrder,
    sample_rate: f64,
    max_block_size: usize,
    prepared: bool,
}

impl EqProcessor {
    /// Creates an unprepared processor.
    pub fn new(parameters: Arc<ParameterStore>, fft_order: FftOrder) -> Self {
        Self {
            parameters,
            left: MonoChain::new(),
            right: MonoChain::new(),
            fifo_writers: None,
            analyzer_inputs: None,
            fft_order,
            sample_rate: 0.0,
            max_block_size: 0,
            prepared: false,
        }
    }

    /// Shared parameter store.
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }

    /// Prepares for playback.
    ///
    /// Resets all filter state and preallocates both analyzer FIFOs with
    /// frames of `max_block_size` samples (at most one FFT's worth). Any
    /// readers from a previous `prepare` are disconnected.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.left.prepare(sample_rate, max_block_size);
        self.right.prepare(sample_rate, max_block_size);

        let frame_size = max_block_size.clamp(1, self.fft_order.size());
        let (left_writer, left_reader) = channel_fifo(0, frame_size);
        let (right_writer, right_reader) = channel_fifo(1, frame_size);
        self.fifo_writers = Some([left_writer, right_writer]);
        self.analyzer_inputs = Some(AnalyzerInputs {
            left: left_reader,
            right: right_reader,
            sample_rate,
        });

        // Coefficients are ready before the first block.
        self.refresh();
        self.prepared = true;

        debug!(
            "processor prepared: sample_rate={}, max_block_size={}, frame_size={}",
            sample_rate, max_block_size, frame_size
        );
    }

    /// Hands the render-side FIFO readers to the analyzer. Returns `None` if
    /// they were already taken or the processor is not prepared.
    pub fn take_analyzer_inputs(&mut self) -> Option<AnalyzerInputs> {
        self.analyzer_inputs.take()
    }

    /// Releases playback resources: clears filter state and disconnects the
    /// analyzer. Until the next `prepare`, blocks pass through untouched.
    pub fn release_resources(&mut self) {
        self.left.reset();
        self.right.reset();
        self.fifo_writers = None;
        self.analyzer_inputs = None;
        self.prepared = false;
    }

    /// Returns true between `prepare` and `release_resources`.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Sample rate passed to the last `prepare`.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Largest block `prepare` was told to expect.
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Chain for a channel (0 = left, anything else = right).
    pub fn chain(&self, channel: usize) -> &MonoChain {
        if channel == 0 {
            &self.left
        } else {
            &self.right
        }
    }

    /// Processes one host block in place.
    ///
    /// Channels at or beyond `num_input_channels` are cleared first. A mono
    /// block runs through the left chain only.
    ///
    /// REAL-TIME SAFE: no allocation, locking or I/O.
    pub fn process_block(&mut self, buffer: &mut AudioBuffer, num_input_channels: usize) {
        for channel in num_input_channels..buffer.num_channels() {
            buffer.clear_channel(channel);
        }
        if !self.prepared {
            return;
        }

        self.refresh();

        match num_input_channels.min(buffer.num_channels()) {
            0 => {}
            1 => self.left.process_in_place(buffer.channel_mut(0)),
            _ => {
                let (left, right) = buffer.channel_pair_mut(0, 1);
                self.left.process_in_place(left);
                self.right.process_in_place(right);
            }
        }

        if let Some(writers) = self.fifo_writers.as_mut() {
            for writer in writers.iter_mut() {
                writer.update(buffer);
            }
        }
    }

    /// Serializes the parameter tree.
    pub fn get_state(&self) -> Result<Vec<u8>, StateError> {
        persistence::get_state(&self.parameters)
    }

    /// Restores the parameter tree; the next block picks up the new values.
    pub fn set_state(&self, bytes: &[u8]) -> Result<(), StateError> {
        persistence::set_state(&self.parameters, bytes)
    }

    fn refresh(&mut self) {
        let snapshot = self.parameters.snapshot();
        let coefficients = ChainCoefficients::from_snapshot(&snapshot, self.sample_rate);
        self.left.update(&coefficients, &snapshot);
        self.right.update(&coefficients, &snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Channel, PathBuilder, Rect, SpectrumAnalyzer};
    use crate::dsp::{ChainPosition, ParameterId, ParameterSnapshot, Slope};
    use crate::engine::channel_fifo::FIFO_CAPACITY;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const SR: f64 = 48000.0;
    const BLOCK: usize = 512;

    fn prepared_processor() -> EqProcessor {
        let mut processor = EqProcessor::new(Arc::new(ParameterStore::new()), FftOrder::Order2048);
        processor.prepare(SR, BLOCK);
        processor
    }

    fn bypass_everything_but(parameters: &ParameterStore, keep: &[ParameterId]) {
        for id in [
            ParameterId::LowCutBypassed,
            ParameterId::HighCutBypassed,
            ParameterId::Band1Bypassed,
            ParameterId::Band2Bypassed,
            ParameterId::Band3Bypassed,
        ] {
            parameters.set_bool(id, !keep.contains(&id));
        }
    }

    /// Runs `input` through the processor on both channels, returning the
    /// left output.
    fn run(processor: &mut EqProcessor, input: &[f32]) -> Vec<f32> {
        let mut buffer = AudioBuffer::new(2, BLOCK);
        let mut output = Vec::with_capacity(input.len());
        for block in input.chunks(BLOCK) {
            buffer.set_num_samples(block.len());
            buffer.channel_mut(0).copy_from_slice(block);
            buffer.channel_mut(1).copy_from_slice(block);
            processor.process_block(&mut buffer, 2);
            output.extend_from_slice(buffer.channel(0));
        }
        output
    }

    fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (amplitude * (2.0 * PI * freq * n as f64 / SR).sin()) as f32)
            .collect()
    }

    fn rms(samples: &[f32]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    /// Steady-state gain in dB for a sine at `freq`: skips half a second of
    /// settling, then measures over exactly one second (an integer number
    /// of periods for any integer frequency).
    fn measured_gain_db(processor: &mut EqProcessor, freq: f64) -> f64 {
        let settle = (SR * 0.5) as usize;
        let window = SR as usize;
        let input = sine(freq, 0.5, settle + window);
        let output = run(processor, &input);
        let gain = rms(&output[settle..]) / rms(&input[settle..]);
        20.0 * gain.log10()
    }

    #[test]
    fn test_unity_pass_when_all_bypassed() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        for id in [
            ParameterId::LowCutBypassed,
            ParameterId::HighCutBypassed,
            ParameterId::Band1Bypassed,
            ParameterId::Band2Bypassed,
            ParameterId::Band3Bypassed,
            ParameterId::AllBypassed,
        ] {
            parameters.set_bool(id, true);
        }
        parameters.set(ParameterId::Band2Gain, 12.0);

        let amplitude = 10f64.powf(-6.0 / 20.0);
        let input = sine(1000.0, amplitude, BLOCK * 20);
        let output = run(&mut processor, &input);
        assert_eq!(output, input, "bypassed output must be bit-identical");
    }

    #[test]
    fn test_global_bypass_alone_is_identity() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        parameters.set(ParameterId::Band1Gain, -9.0);
        parameters.set(ParameterId::LowCutFreq, 500.0);
        parameters.set_bool(ParameterId::AllBypassed, true);

        let input = sine(300.0, 0.8, BLOCK * 4);
        assert_eq!(run(&mut processor, &input), input);
    }

    #[test]
    fn test_peak_boost_gain() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        bypass_everything_but(&parameters, &[ParameterId::Band2Bypassed]);
        parameters.set(ParameterId::Band2Freq, 1000.0);
        parameters.set(ParameterId::Band2Gain, 12.0);
        parameters.set(ParameterId::Band2Quality, 1.0);

        let at_center = measured_gain_db(&mut processor, 1000.0);
        assert!(
            (at_center - 12.0).abs() <= 0.1,
            "gain at 1 kHz: {} dB",
            at_center
        );

        processor.prepare(SR, BLOCK);
        let low = measured_gain_db(&mut processor, 20.0);
        assert!(low.abs() <= 0.2, "gain at 20 Hz: {} dB", low);

        processor.prepare(SR, BLOCK);
        let high = measured_gain_db(&mut processor, 20_000.0);
        assert!(high.abs() <= 0.2, "gain at 20 kHz: {} dB", high);
    }

    #[test]
    fn test_highpass_slope() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        bypass_everything_but(&parameters, &[ParameterId::LowCutBypassed]);
        parameters.set(ParameterId::LowCutFreq, 200.0);
        parameters.set_slope(ParameterId::LowCutSlope, Slope::S48);

        let passband = measured_gain_db(&mut processor, 1000.0);
        assert!(passband.abs() <= 0.2, "passband gain at 1 kHz: {} dB", passband);

        processor.prepare(SR, BLOCK);
        let stopband = measured_gain_db(&mut processor, 50.0);
        assert!(
            stopband <= passband - 48.0,
            "attenuation at 50 Hz too small: stopband={} dB, passband={} dB",
            stopband,
            passband
        );

        let active = processor
            .chain(0)
            .cut_cascade(ChainPosition::LowCut)
            .map(|c| c.active_sections());
        assert_eq!(active, Some(4));
    }

    #[test]
    fn test_parameter_sweep_without_glitch() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        let gain_db = 6.0;
        parameters.set(ParameterId::Band1Gain, gain_db);
        parameters.set(ParameterId::Band1Quality, 1.0);

        let blocks = 100;
        let input = sine(1000.0, 0.5, BLOCK * blocks);
        let max_input_slew = input
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);

        let mut buffer = AudioBuffer::new(2, BLOCK);
        let mut output = Vec::with_capacity(input.len());
        for (index, block) in input.chunks(BLOCK).enumerate() {
            let t = index as f32 / (blocks - 1) as f32;
            parameters.set(ParameterId::Band1Freq, 200.0 * 10f32.powf(t));
            buffer.channel_mut(0).copy_from_slice(block);
            buffer.channel_mut(1).copy_from_slice(block);
            processor.process_block(&mut buffer, 2);
            output.extend_from_slice(buffer.channel(0));
        }

        assert!(output.iter().all(|s| s.is_finite()), "sweep produced NaN/Inf");
        let envelope = 10f32.powf(gain_db as f32 / 20.0);
        let bound = 2.0 * envelope * max_input_slew + 0.05;
        let max_output_slew = output
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(
            max_output_slew <= bound,
            "output slew {} exceeds bound {}",
            max_output_slew,
            bound
        );
    }

    #[test]
    fn test_response_matches_measurement() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        parameters.set(ParameterId::LowCutFreq, 40.0);
        parameters.set_slope(ParameterId::LowCutSlope, Slope::S24);
        parameters.set(ParameterId::Band1Freq, 200.0);
        parameters.set(ParameterId::Band1Gain, 6.0);
        parameters.set(ParameterId::Band1Quality, 0.7);
        parameters.set(ParameterId::Band2Freq, 1000.0);
        parameters.set(ParameterId::Band2Gain, -4.0);
        parameters.set(ParameterId::Band3Freq, 6000.0);
        parameters.set(ParameterId::Band3Gain, 3.0);
        parameters.set(ParameterId::Band3Quality, 2.0);
        parameters.set(ParameterId::HighCutFreq, 15000.0);

        for freq in [100.0, 250.0, 1000.0, 6000.0] {
            processor.prepare(SR, BLOCK);
            let measured = measured_gain_db(&mut processor, freq);
            let predicted = 20.0 * processor.chain(0).magnitude(freq).log10();
            assert_abs_diff_eq!(measured, predicted, epsilon = 0.1);
        }
    }

    #[test]
    fn test_analyzer_throughput() {
        let mut processor = prepared_processor();
        let inputs = processor.take_analyzer_inputs().expect("analyzer inputs");
        assert!(processor.take_analyzer_inputs().is_none(), "inputs can only be taken once");

        let parameters = processor.parameters().clone();
        let mut analyzer =
            SpectrumAnalyzer::new(parameters, inputs, FftOrder::Order2048, PathBuilder::default());
        analyzer.set_bounds(Rect::new(0.0, 0.0, 800.0, 400.0));

        let input = sine(440.0, 0.5, BLOCK);
        let mut buffer = AudioBuffer::new(2, BLOCK);
        for block in 0..100 {
            buffer.channel_mut(0).copy_from_slice(&input);
            buffer.channel_mut(1).copy_from_slice(&input);
            processor.process_block(&mut buffer, 2);

            let in_flight = processor
                .fifo_writers
                .as_ref()
                .map_or(0, |w| w[0].frames_in_flight().max(w[1].frames_in_flight()));
            assert!(in_flight <= FIFO_CAPACITY, "FIFO overfilled at block {}", block);

            if block % 4 == 3 {
                analyzer.tick();
            }
        }
        analyzer.tick();

        let expected = FftOrder::Order2048.size() / 4;
        assert_eq!(analyzer.latest_path(Channel::Left).len(), expected);
        assert_eq!(analyzer.latest_path(Channel::Right).len(), expected);
    }

    #[test]
    fn test_state_round_trip() {
        let processor = prepared_processor();
        let parameters = processor.parameters().clone();
        let values = [
            (ParameterId::LowCutFreq, 35.0),
            (ParameterId::HighCutFreq, 16000.0),
            (ParameterId::Band1Freq, 150.0),
            (ParameterId::Band1Gain, 2.5),
            (ParameterId::Band1Quality, 0.75),
            (ParameterId::Band2Freq, 900.0),
            (ParameterId::Band2Gain, -3.2),
            (ParameterId::Band2Quality, 2.5),
            (ParameterId::Band3Freq, 7000.0),
            (ParameterId::Band3Gain, 11.1),
            (ParameterId::Band3Quality, 4.0),
            (ParameterId::LowCutSlope, 2.0),
            (ParameterId::HighCutSlope, 3.0),
            (ParameterId::LowCutBypassed, 1.0),
            (ParameterId::HighCutBypassed, 1.0),
            (ParameterId::Band1Bypassed, 1.0),
            (ParameterId::Band2Bypassed, 1.0),
            (ParameterId::Band3Bypassed, 1.0),
            (ParameterId::AllBypassed, 1.0),
            (ParameterId::AnalyzerEnabled, 0.0),
        ];
        for (id, value) in values {
            parameters.set(id, value);
        }
        let before = parameters.snapshot();
        assert_ne!(before, ParameterSnapshot::default());
        let bits_before: Vec<u32> = ParameterId::ALL.iter().map(|&id| parameters.get(id).to_bits()).collect();

        let blob = processor.get_state().expect("get_state");
        parameters.reset_to_defaults();
        assert_eq!(parameters.snapshot(), ParameterSnapshot::default());
        processor.set_state(&blob).expect("set_state");

        assert_eq!(parameters.snapshot(), before);
        let bits_after: Vec<u32> = ParameterId::ALL.iter().map(|&id| parameters.get(id).to_bits()).collect();
        assert_eq!(bits_after, bits_before, "every value should be restored bit-for-bit");
    }

    #[test]
    fn test_extra_output_channels_are_cleared() {
        let mut processor = prepared_processor();
        let mut buffer = AudioBuffer::new(3, BLOCK);
        buffer.channel_mut(2).fill(0.7);
        buffer.channel_mut(0).fill(0.1);
        processor.process_block(&mut buffer, 2);
        assert!(buffer.channel(2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mono_input_uses_left_chain() {
        let mut processor = prepared_processor();
        let parameters = processor.parameters().clone();
        bypass_everything_but(&parameters, &[ParameterId::Band2Bypassed]);
        parameters.set(ParameterId::Band2Gain, 12.0);

        let mut buffer = AudioBuffer::new(2, BLOCK);
        let input = sine(1000.0, 0.25, BLOCK);
        buffer.channel_mut(0).copy_from_slice(&input);
        buffer.channel_mut(1).copy_from_slice(&input);
        processor.process_block(&mut buffer, 1);

        assert!(buffer.channel(1).iter().all(|&s| s == 0.0), "unused channel is cleared");
        assert_ne!(buffer.channel(0), &input[..], "left channel is filtered");
    }

    #[test]
    fn test_unprepared_processor_passes_through() {
        let mut processor = prepared_processor();
        processor.parameters().set(ParameterId::Band2Gain, 12.0);
        processor.release_resources();
        assert!(!processor.is_prepared());
        assert!(processor.take_analyzer_inputs().is_none());

        let input = sine(1000.0, 0.5, BLOCK);
        assert_eq!(run(&mut processor, &input), input);
    }
}
