//! Engine module
//!
//! Audio-thread side of the equalizer.
//! Handles cpal integration, the block processor, and the channel FIFOs
//! that carry processed audio to the analyzer.

pub mod audio_buffer;
pub mod audio_engine;
pub mod channel_fifo;
pub mod processor;

pub use audio_buffer::AudioBuffer;
pub use audio_engine::{AudioEngine, AudioError, DeviceInfo, NoiseSource};
pub use channel_fifo::{
    channel_fifo, frame_fifo, ChannelFifoReader, ChannelFifoWriter, FrameReader, FrameWriter,
    FIFO_CAPACITY,
};
pub use processor::{AnalyzerInputs, EqProcessor};
