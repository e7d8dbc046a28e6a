//! Second-order IIR sections.
//!
//! Coefficients are designed in `f64` and stored as `f32`; the per-sample
//! path runs in `f32` using the transposed direct form II, which keeps only
//! two state variables per section.

use std::f64::consts::PI;

/// Normalized biquad coefficients (a0 == 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    /// Pass-through section.
    pub const UNITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Normalizes raw cookbook coefficients by `a0`.
    ///
    /// Falls back to [`BiquadCoefficients::UNITY`] when the design is not
    /// finite (degenerate `a0`, NaN frequency and so on).
    pub fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        if a0 == 0.0 || !a0.is_finite() {
            return Self::UNITY;
        }
        let coefficients = Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        };
        if coefficients.is_finite() {
            coefficients
        } else {
            Self::UNITY
        }
    }

    /// Returns true if every coefficient is finite.
    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Returns true for the pass-through section.
    pub fn is_unity(&self) -> bool {
        *self == Self::UNITY
    }

    /// Magnitude of the transfer function at `freq` Hz.
    ///
    /// Evaluates `|H(e^jw)|` in double precision.
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (sin1, cos1) = w.sin_cos();
        let (sin2, cos2) = (2.0 * w).sin_cos();

        let (b0, b1, b2) = (self.b0 as f64, self.b1 as f64, self.b2 as f64);
        let (a1, a2) = (self.a1 as f64, self.a2 as f64);

        // z^-1 = cos w - j sin w
        let num_re = b0 + b1 * cos1 + b2 * cos2;
        let num_im = -(b1 * sin1 + b2 * sin2);
        let den_re = 1.0 + a1 * cos1 + a2 * cos2;
        let den_im = -(a1 * sin1 + a2 * sin2);

        let den = (den_re * den_re + den_im * den_im).sqrt();
        if den == 0.0 {
            return f64::INFINITY;
        }
        (num_re * num_re + num_im * num_im).sqrt() / den
    }
}

impl Default for BiquadCoefficients {
    fn default() -> Self {
        Self::UNITY
    }
}

/// One biquad section with its own sample state.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterStage {
    coefficients: BiquadCoefficients,
    z1: f32,
    z2: f32,
}

impl FilterStage {
    /// Creates a pass-through stage with cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current coefficients.
    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coefficients
    }

    /// Replaces the coefficients by value. State is kept.
    #[inline]
    pub fn set_coefficients(&mut self, coefficients: BiquadCoefficients) {
        self.coefficients = coefficients;
    }

    /// Process a single sample.
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let c = &self.coefficients;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }

    /// Process a buffer in place.
    #[inline]
    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Clears the delay line.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
