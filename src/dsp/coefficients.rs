//! Coefficient synthesis.
//!
//! Pure functions from parameter values to biquad coefficients. Peak bands
//! use the RBJ Audio EQ Cookbook peaking filter; the cut filters are
//! Butterworth designs realised as cascades of second-order sections.

use std::f64::consts::PI;

use arrayvec::ArrayVec;

use super::biquad::BiquadCoefficients;
use super::parameter_store::{ParameterSnapshot, Slope};

/// Maximum number of sections in a cut cascade (48 dB/oct).
pub const MAX_CUT_SECTIONS: usize = 4;

/// Section coefficients of one cut cascade, one entry per active section.
pub type CutCoefficients = ArrayVec<BiquadCoefficients, MAX_CUT_SECTIONS>;

/// Gains closer to 0 dB than this produce a unity peak section.
const UNITY_GAIN_THRESHOLD_DB: f32 = 0.01;

/// Lowest frequency handed to a design.
const MIN_DESIGN_FREQ: f64 = 1.0;

/// Clamps a frequency into the open interval (0, Nyquist).
///
/// Returns `None` when the sample rate itself is unusable.
fn design_frequency(freq: f32, sample_rate: f64) -> Option<f64> {
    if !sample_rate.is_finite() || sample_rate <= 2.0 * MIN_DESIGN_FREQ {
        return None;
    }
    let freq = freq as f64;
    if !freq.is_finite() {
        return None;
    }
    let nyquist = 0.5 * sample_rate;
    Some(freq.clamp(MIN_DESIGN_FREQ, nyquist * 0.999))
}

/// RBJ peaking filter.
///
/// `A = 10^(gain/40)`, `w0 = 2 pi f / fs`, `alpha = sin(w0) / 2Q`.
pub fn make_peak_filter(freq: f32, quality: f32, gain_db: f32, sample_rate: f64) -> BiquadCoefficients {
    if gain_db.abs() < UNITY_GAIN_THRESHOLD_DB || !gain_db.is_finite() {
        return BiquadCoefficients::UNITY;
    }
    let Some(freq) = design_frequency(freq, sample_rate) else {
        return BiquadCoefficients::UNITY;
    };
    let q = (quality as f64).max(1e-3);

    let a = 10.0_f64.powf(gain_db as f64 / 40.0);
    let w0 = 2.0 * PI * freq / sample_rate;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let alpha = sin_w0 / (2.0 * q);

    BiquadCoefficients::normalized(
        1.0 + alpha * a,
        -2.0 * cos_w0,
        1.0 - alpha * a,
        1.0 + alpha / a,
        -2.0 * cos_w0,
        1.0 - alpha / a,
    )
}

/// RBJ second-order high-pass section.
fn make_highpass(freq: f64, q: f64, sample_rate: f64) -> BiquadCoefficients {
    let w0 = 2.0 * PI * freq / sample_rate;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let alpha = sin_w0 / (2.0 * q);

    BiquadCoefficients::normalized(
        (1.0 + cos_w0) / 2.0,
        -(1.0 + cos_w0),
        (1.0 + cos_w0) / 2.0,
        1.0 + alpha,
        -2.0 * cos_w0,
        1.0 - alpha,
    )
}

/// RBJ second-order low-pass section.
fn make_lowpass(freq: f64, q: f64, sample_rate: f64) -> BiquadCoefficients {
    let w0 = 2.0 * PI * freq / sample_rate;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let alpha = sin_w0 / (2.0 * q);

    BiquadCoefficients::normalized(
        (1.0 - cos_w0) / 2.0,
        1.0 - cos_w0,
        (1.0 - cos_w0) / 2.0,
        1.0 + alpha,
        -2.0 * cos_w0,
        1.0 - alpha,
    )
}

/// Quality factor of section `index` in an even-order Butterworth cascade.
///
/// The poles of an order-N Butterworth filter sit at angles
/// `(2i + 1) pi / 2N`; each conjugate pair becomes one section with
/// `Q = 1 / (2 cos(angle))`.
pub fn butterworth_quality(index: usize, order: usize) -> f64 {
    let angle = (2 * index + 1) as f64 * PI / (2 * order) as f64;
    1.0 / (2.0 * angle.cos())
}

fn make_cascade(
    freq: f32,
    slope: Slope,
    sample_rate: f64,
    section: fn(f64, f64, f64) -> BiquadCoefficients,
) -> CutCoefficients {
    let mut cascade = CutCoefficients::new();
    let design_freq = design_frequency(freq, sample_rate);
    let order = slope.order();

    for index in 0..slope.sections() {
        let coefficients = match design_freq {
            Some(f) => section(f, butterworth_quality(index, order), sample_rate),
            None => BiquadCoefficients::UNITY,
        };
        cascade.push(coefficients);
    }
    cascade
}

/// Butterworth high-pass of order `2 * (slope + 1)` as `slope + 1` sections.
pub fn make_highpass_cascade(freq: f32, slope: Slope, sample_rate: f64) -> CutCoefficients {
    make_cascade(freq, slope, sample_rate, make_highpass)
}

/// Butterworth low-pass of order `2 * (slope + 1)` as `slope + 1` sections.
pub fn make_lowpass_cascade(freq: f32, slope: Slope, sample_rate: f64) -> CutCoefficients {
    make_cascade(freq, slope, sample_rate, make_lowpass)
}

/// Every coefficient set a [`MonoChain`] needs for one block.
///
/// [`MonoChain`]: super::filter_chain::MonoChain
#[derive(Clone, Debug, PartialEq)]
pub struct ChainCoefficients {
    pub low_cut: CutCoefficients,
    pub bands: [BiquadCoefficients; 3],
    pub high_cut: CutCoefficients,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
}

impl ChainCoefficients {
    /// Designs all five stages from a snapshot.
    ///
    /// REAL-TIME SAFE: no allocation (cascades live in `ArrayVec`s).
    pub fn from_snapshot(snapshot: &ParameterSnapshot, sample_rate: f64) -> Self {
        Self {
            low_cut: make_highpass_cascade(snapshot.low_cut_freq, snapshot.low_cut_slope, sample_rate),
            bands: [
                make_peak_filter(
                    snapshot.band1_freq,
                    snapshot.band1_quality,
                    snapshot.band1_gain_db,
                    sample_rate,
                ),
                make_peak_filter(
                    snapshot.band2_freq,
                    snapshot.band2_quality,
                    snapshot.band2_gain_db,
                    sample_rate,
                ),
                make_peak_filter(
                    snapshot.band3_freq,
                    snapshot.band3_quality,
                    snapshot.band3_gain_db,
                    sample_rate,
                ),
            ],
            high_cut: make_lowpass_cascade(
                snapshot.high_cut_freq,
                snapshot.high_cut_slope,
                sample_rate,
            ),
            low_cut_slope: snapshot.low_cut_slope,
            high_cut_slope: snapshot.high_cut_slope,
        }
    }
}
