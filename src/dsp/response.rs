//! Magnitude response of a configured chain.
//!
//! Drawing is left to the front-end; this only evaluates `|H(f)|` in dB at
//! log-spaced frequencies, one per display column.

use super::filter_chain::MonoChain;

/// Lowest displayed frequency.
pub const MIN_DISPLAY_FREQ: f64 = 20.0;

/// Highest displayed frequency.
pub const MAX_DISPLAY_FREQ: f64 = 20_000.0;

/// Frequency shown at `column` of a `width`-column display.
///
/// Columns map 20 Hz to 20 kHz on a log axis: `f = 20 * 1000^(i / width)`.
pub fn column_frequency(column: usize, width: usize) -> f64 {
    if width == 0 {
        return MIN_DISPLAY_FREQ;
    }
    let proportion = column as f64 / width as f64;
    MIN_DISPLAY_FREQ * (MAX_DISPLAY_FREQ / MIN_DISPLAY_FREQ).powf(proportion)
}

/// Converts a linear magnitude to decibels, flooring silence at -inf.
pub fn magnitude_to_db(magnitude: f64) -> f64 {
    if magnitude > 0.0 {
        20.0 * magnitude.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Sampled magnitude response of one chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseCurve {
    frequencies: Vec<f64>,
    magnitudes_db: Vec<f64>,
}

impl ResponseCurve {
    /// Creates an empty curve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `chain` at `width` log-spaced columns, reusing storage.
    pub fn compute(&mut self, chain: &MonoChain, width: usize) {
        self.frequencies.clear();
        self.magnitudes_db.clear();
        for column in 0..width {
            let freq = column_frequency(column, width);
            self.frequencies.push(freq);
            self.magnitudes_db.push(magnitude_to_db(chain.magnitude(freq)));
        }
    }

    /// Frequency of each column in Hz.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Magnitude of each column in dB.
    pub fn magnitudes_db(&self) -> &[f64] {
        &self.magnitudes_db
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.magnitudes_db.len()
    }

    /// Returns true if nothing has been computed.
    pub fn is_empty(&self) -> bool {
        self.magnitudes_db.is_empty()
    }
}
