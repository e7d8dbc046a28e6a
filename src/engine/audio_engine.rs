//! Audio Engine
//!
//! Manages the cpal output stream and drives an [`EqProcessor`] from the
//! device callback. The equalizer is fed by a built-in white-noise source,
//! which makes the analyzer and the response audible without an input
//! device.
//!
//! The audio callback runs in a separate thread and must be real-time safe.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig};
use log::{info, warn};
use portable_atomic::AtomicF32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::audio_buffer::AudioBuffer;
use super::processor::{AnalyzerInputs, EqProcessor};

/// Channels the processor runs on, independent of the device layout.
const PROCESS_CHANNELS: usize = 2;

/// Errors that can occur during audio engine operation.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    /// No audio output device was found.
    #[error("No audio output device found")]
    NoOutputDevice,
    /// Failed to get device configuration.
    #[error("Failed to get device configuration: {0}")]
    ConfigurationFailed(String),
    /// Failed to create the audio stream.
    #[error("Failed to create audio stream: {0}")]
    StreamCreationFailed(String),
    /// Failed to start/stop playback.
    #[error("Failed to control audio playback: {0}")]
    StreamPlaybackFailed(String),
}

/// Information about an audio output device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the default output device.
    pub is_default: bool,
    /// Index in the device list (for selection).
    pub index: usize,
}

/// Seeded stereo white-noise generator.
pub struct NoiseSource {
    rng: StdRng,
    level: f32,
}

impl NoiseSource {
    /// Creates a source with peak amplitude `level`.
    pub fn new(seed: u64, level: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            level,
        }
    }

    /// Fills every channel of `buffer` with independent noise.
    ///
    /// REAL-TIME SAFE: no allocation.
    pub fn fill(&mut self, buffer: &mut AudioBuffer) {
        for channel in 0..buffer.num_channels() {
            for sample in buffer.channel_mut(channel) {
                *sample = self.rng.random_range(-self.level..=self.level);
            }
        }
    }
}

/// Shared state between audio callback and main thread.
/// All fields use atomics for lock-free access.
struct AudioState {
    /// Whether the noise source feeds the equalizer.
    source_enabled: AtomicBool,
    /// Number of blocks processed since the stream started.
    blocks_processed: AtomicU64,
    /// Loudest channel peak of the last processed block.
    output_peak: AtomicF32,
    /// Loudest channel RMS of the last processed block.
    output_rms: AtomicF32,
}

impl AudioState {
    fn new() -> Self {
        Self {
            source_enabled: AtomicBool::new(true),
            blocks_processed: AtomicU64::new(0),
            output_peak: AtomicF32::new(0.0),
            output_rms: AtomicF32::new(0.0),
        }
    }
}

/// Per-stream state owned by the device callback.
struct CallbackState {
    processor: EqProcessor,
    source: NoiseSource,
    buffer: AudioBuffer,
    state: Arc<AudioState>,
}

impl CallbackState {
    /// Fills one interleaved device buffer, processing in chunks of at most
    /// the prepared block size.
    ///
    /// REAL-TIME SAFE: No allocations, no locks, no blocking.
    fn render(&mut self, data: &mut [f32], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        let block_samples = self.buffer.capacity().max(1) * device_channels;
        let source_enabled = self.state.source_enabled.load(Ordering::Relaxed);

        for chunk in data.chunks_mut(block_samples) {
            let frames = chunk.len() / device_channels;
            self.buffer.set_num_samples(frames);
            if source_enabled {
                self.source.fill(&mut self.buffer);
            } else {
                self.buffer.clear();
            }
            self.processor.process_block(&mut self.buffer, PROCESS_CHANNELS);
            self.buffer.copy_to_interleaved(chunk, device_channels);
            self.update_meter();
            self.state.blocks_processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn update_meter(&self) {
        let (peak, rms) = (0..self.buffer.num_channels()).fold((0.0f32, 0.0f32), |(peak, rms), ch| {
            (peak.max(self.buffer.peak(ch)), rms.max(self.buffer.rms(ch)))
        });
        self.state.output_peak.store(peak, Ordering::Relaxed);
        self.state.output_rms.store(rms, Ordering::Relaxed);
    }
}

/// The main audio engine that manages cpal streams.
pub struct AudioEngine {
    host: Host,
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    state: Arc<AudioState>,
}

impl AudioEngine {
    /// Create a new AudioEngine using the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let config = Self::default_config(&device)?;

        Ok(Self {
            host,
            device,
            config,
            stream: None,
            state: Arc::new(AudioState::new()),
        })
    }

    fn default_config(device: &Device) -> Result<StreamConfig, AudioError> {
        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::ConfigurationFailed(e.to_string()))?;

        Ok(StreamConfig {
            channels: supported_config.channels(),
            sample_rate: SampleRate(supported_config.sample_rate().0),
            buffer_size: cpal::BufferSize::Default,
        })
    }

    /// Get information about all available output devices.
    pub fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());

        self.host
            .output_devices()
            .map(|devices| {
                devices
                    .enumerate()
                    .filter_map(|(index, device)| {
                        device.name().ok().map(|name| DeviceInfo {
                            is_default: Some(&name) == default_name.as_ref(),
                            name,
                            index,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the name of the currently selected device.
    pub fn current_device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Select a different output device by index.
    ///
    /// Stops the current stream if running; the processor goes with it, so
    /// call `start()` with a freshly prepared processor afterwards.
    pub fn select_device(&mut self, index: usize) -> Result<(), AudioError> {
        if self.is_running() {
            self.stop()?;
        }

        let device = self
            .host
            .output_devices()
            .map_err(|e| AudioError::ConfigurationFailed(e.to_string()))?
            .nth(index)
            .ok_or(AudioError::NoOutputDevice)?;

        self.config = Self::default_config(&device)?;
        self.device = device;
        info!("selected output device: {}", self.current_device_name());
        Ok(())
    }

    /// Get the current stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Get the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Get the number of output channels.
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Enable or disable the noise source (disabled feeds silence).
    pub fn set_source_enabled(&self, enabled: bool) {
        self.state.source_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Check if the noise source is enabled.
    pub fn source_enabled(&self) -> bool {
        self.state.source_enabled.load(Ordering::Relaxed)
    }

    /// Number of blocks the callback has processed.
    pub fn blocks_processed(&self) -> u64 {
        self.state.blocks_processed.load(Ordering::Relaxed)
    }

    /// Output level of the last processed block as `(peak, rms)`, taken over
    /// the loudest channel.
    pub fn output_level(&self) -> (f32, f32) {
        (
            self.state.output_peak.load(Ordering::Relaxed),
            self.state.output_rms.load(Ordering::Relaxed),
        )
    }

    /// Start the audio stream.
    ///
    /// Prepares `processor` for the device sample rate and `max_block_size`,
    /// then moves it into the audio callback. Returns the analyzer FIFO
    /// readers, or `None` if the stream was already running.
    pub fn start(
        &mut self,
        mut processor: EqProcessor,
        max_block_size: usize,
        noise_seed: u64,
    ) -> Result<Option<AnalyzerInputs>, AudioError> {
        if self.stream.is_some() {
            return Ok(None);
        }

        let sample_rate = self.config.sample_rate.0 as f64;
        let channels = self.config.channels as usize;
        let max_block_size = max_block_size.max(1);

        processor.prepare(sample_rate, max_block_size);
        let inputs = processor.take_analyzer_inputs();

        self.state.blocks_processed.store(0, Ordering::Relaxed);
        let mut callback = CallbackState {
            processor,
            source: NoiseSource::new(noise_seed, 0.25),
            buffer: AudioBuffer::new(PROCESS_CHANNELS, max_block_size),
            state: Arc::clone(&self.state),
        };

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback.render(data, channels);
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlaybackFailed(e.to_string()))?;

        info!(
            "audio started on '{}': {} Hz, {} channels",
            self.current_device_name(),
            sample_rate,
            channels
        );

        self.stream = Some(stream);
        Ok(inputs)
    }

    /// Stop the audio stream. The processor is dropped with it.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| AudioError::StreamPlaybackFailed(e.to_string()))?;
            info!("audio stopped");
        }
        Ok(())
    }

    /// Check if the audio stream is currently running.
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FftOrder;
    use crate::dsp::{ParameterId, ParameterStore};

    fn callback_state(block: usize) -> CallbackState {
        let mut processor = EqProcessor::new(Arc::new(ParameterStore::new()), FftOrder::Order2048);
        processor.prepare(48000.0, block);
        CallbackState {
            processor,
            source: NoiseSource::new(1, 0.25),
            buffer: AudioBuffer::new(PROCESS_CHANNELS, block),
            state: Arc::new(AudioState::new()),
        }
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::NoOutputDevice;
        assert_eq!(err.to_string(), "No audio output device found");

        let err = AudioError::StreamCreationFailed("test error".to_string());
        assert!(err.to_string().contains("test error"));
    }

    #[test]
    fn test_noise_source_is_seeded_and_bounded() {
        let mut a = AudioBuffer::new(2, 256);
        let mut b = AudioBuffer::new(2, 256);
        NoiseSource::new(9, 0.5).fill(&mut a);
        NoiseSource::new(9, 0.5).fill(&mut b);
        assert_eq!(a.channel(0), b.channel(0));
        assert_ne!(a.channel(0), a.channel(1), "channels should be independent");
        assert!(a.peak(0) <= 0.5);
        assert!(a.rms(0) > 0.1);
    }

    #[test]
    fn test_render_splits_large_device_buffers() {
        let mut callback = callback_state(64);
        let mut data = vec![0.0f32; 200 * 2];
        callback.render(&mut data, 2);

        assert_eq!(callback.state.blocks_processed.load(Ordering::Relaxed), 4);
        assert!(data.iter().all(|s| s.is_finite()));
        assert!(data.iter().any(|&s| s != 0.0), "noise should reach the output");
        let peak = callback.state.output_peak.load(Ordering::Relaxed);
        let rms = callback.state.output_rms.load(Ordering::Relaxed);
        assert!(peak > 0.0 && peak.is_finite());
        assert!(rms > 0.0 && rms <= peak);
    }

    #[test]
    fn test_render_silence_when_source_disabled() {
        let mut callback = callback_state(128);
        callback.processor.parameters().set(ParameterId::Band1Gain, 12.0);
        callback.state.source_enabled.store(false, Ordering::Relaxed);

        let mut data = vec![1.0f32; 128];
        callback.render(&mut data, 1);
        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(callback.state.output_peak.load(Ordering::Relaxed), 0.0);
    }

    #[test]
    fn test_device_info() {
        let info = DeviceInfo {
            name: "Test Device".to_string(),
            is_default: true,
            index: 0,
        };
        assert_eq!(info.name, "Test Device");
        assert!(info.is_default);
        assert_eq!(info.index, 0);
    }
}
