//! Analyzer module
//!
//! FFT spectrum analysis of the processed audio, run on the render thread.

pub mod fft_data;
pub mod path;
pub mod path_producer;
pub mod spectrum_analyzer;

pub use fft_data::{FftDataGenerator, FftOrder, DEFAULT_FLOOR_DB};
pub use path::{AnalyzerPath, PathBuilder, PathVertex, Rect, DEFAULT_PATH_STRIDE};
pub use path_producer::PathProducer;
pub use spectrum_analyzer::{Channel, RenderTimer, SpectrumAnalyzer};
