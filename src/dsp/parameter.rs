//! Parameter definitions for the equalizer.
//!
//! Parameters are the controllable values exposed to the host and the UI
//! (knobs, choice boxes, bypass switches). A definition only describes a
//! parameter; the live value is held by the [`ParameterStore`].
//!
//! [`ParameterStore`]: super::parameter_store::ParameterStore

/// How a parameter value should be displayed and interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterDisplay {
    /// Frequency in Hz, shown on a skewed (log-feeling) control.
    Frequency,
    /// Gain in decibels.
    Decibels,
    /// Plain number with a unit suffix.
    Linear { unit: &'static str },
    /// Discrete steps with named values.
    Choice { labels: &'static [&'static str] },
    /// On/off toggle switch.
    Toggle,
}

impl ParameterDisplay {
    /// Returns the unit string, if applicable.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::Frequency => Some("Hz"),
            Self::Decibels => Some("dB"),
            Self::Linear { unit } => Some(unit),
            _ => None,
        }
    }

    /// Returns true if values are discrete (choices and toggles).
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Choice { .. } | Self::Toggle)
    }
}

/// A value range with a snapping interval and a skew factor.
///
/// The skew shapes the mapping between the real value and the normalized
/// 0..1 position a host or knob works with. A skew below 1.0 spreads the
/// lower end of the range across more of the control.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterRange {
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Snapping interval. Zero disables snapping.
    pub step: f32,
    /// Skew factor applied to normalized positions.
    pub skew: f32,
}

impl ParameterRange {
    /// Creates a range with linear mapping.
    pub const fn new(min: f32, max: f32, step: f32) -> Self {
        Self {
            min,
            max,
            step,
            skew: 1.0,
        }
    }

    /// Creates a range with the given skew factor.
    pub const fn skewed(min: f32, max: f32, step: f32, skew: f32) -> Self {
        Self {
            min,
            max,
            step,
            skew,
        }
    }

    /// Clamps a value into the range.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Clamps then snaps a value to the nearest legal step.
    pub fn snap(&self, value: f32) -> f32 {
        let clamped = self.clamp(value);
        if self.step <= 0.0 {
            return clamped;
        }
        let steps = ((clamped - self.min) / self.step).round();
        self.clamp(self.min + steps * self.step)
    }

    /// Maps a value to its normalized 0..1 position, applying the skew.
    pub fn to_normalized(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span.abs() < f32::EPSILON {
            return 0.0;
        }
        let proportion = ((self.clamp(value) - self.min) / span).clamp(0.0, 1.0);
        if self.skew == 1.0 || proportion <= 0.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }

    /// Maps a normalized 0..1 position back to a value, inverting the skew.
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let mut proportion = normalized.clamp(0.0, 1.0);
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = proportion.powf(1.0 / self.skew);
        }
        self.min + proportion * (self.max - self.min)
    }
}

/// Definition of a single parameter.
///
/// Each parameter has a host-visible name, valid range and default value.
#[derive(Clone, Debug)]
pub struct ParameterDefinition {
    /// Host-visible name, also used as the key in saved state.
    pub name: &'static str,
    /// Valid range, step and skew.
    pub range: ParameterRange,
    /// Default value.
    pub default: f32,
    /// How to display and interpret the parameter value.
    pub display: ParameterDisplay,
}

impl ParameterDefinition {
    /// Creates a frequency parameter on the skewed 20 Hz..20 kHz range.
    pub const fn frequency(name: &'static str, default: f32) -> Self {
        Self {
            name,
            range: ParameterRange::skewed(20.0, 20_000.0, 1.0, FREQUENCY_SKEW),
            default,
            display: ParameterDisplay::Frequency,
        }
    }

    /// Creates a band gain parameter (-24..+24 dB).
    pub const fn gain(name: &'static str) -> Self {
        Self {
            name,
            range: ParameterRange::new(-24.0, 24.0, 0.1),
            default: 0.0,
            display: ParameterDisplay::Decibels,
        }
    }

    /// Creates a band quality parameter (0.1..10).
    pub const fn quality(name: &'static str) -> Self {
        Self {
            name,
            range: ParameterRange::new(0.1, 10.0, 0.05),
            default: 1.0,
            display: ParameterDisplay::Linear { unit: "" },
        }
    }

    /// Creates a discrete choice parameter.
    pub fn choice(
        name: &'static str,
        labels: &'static [&'static str],
        default_index: usize,
    ) -> Self {
        Self {
            name,
            range: ParameterRange::new(0.0, (labels.len() - 1) as f32, 1.0),
            default: default_index as f32,
            display: ParameterDisplay::Choice { labels },
        }
    }

    /// Creates a toggle (boolean) parameter.
    pub const fn toggle(name: &'static str, default: bool) -> Self {
        Self {
            name,
            range: ParameterRange::new(0.0, 1.0, 1.0),
            default: if default { 1.0 } else { 0.0 },
            display: ParameterDisplay::Toggle,
        }
    }

    /// Brings a raw write into the legal set of values. Non-finite input
    /// yields the default.
    pub fn legalize(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default;
        }
        self.range.snap(value)
    }

    /// Formats a value for display, e.g. "1.2 kHz", "+3.0 dB", "24 dB/Oct".
    pub fn display_value(&self, value: f32) -> String {
        match self.display {
            ParameterDisplay::Frequency => {
                if value >= 1000.0 {
                    format!("{:.1} kHz", value / 1000.0)
                } else {
                    format!("{:.0} Hz", value)
                }
            }
            ParameterDisplay::Decibels => format!("{:+.1} dB", value),
            ParameterDisplay::Linear { unit } if unit.is_empty() => format!("{:.2}", value),
            ParameterDisplay::Linear { unit } => format!("{:.2} {}", value, unit),
            ParameterDisplay::Choice { labels } => {
                let index = (value.round().max(0.0) as usize).min(labels.len() - 1);
                labels[index].to_string()
            }
            ParameterDisplay::Toggle => {
                if value >= 0.5 { "On" } else { "Off" }.to_string()
            }
        }
    }
}

/// Skew factor of every frequency parameter.
pub const FREQUENCY_SKEW: f32 = 0.3;

/// Labels of the cut slope choice parameters.
pub const SLOPE_LABELS: &[&str] = &["12 dB/Oct", "24 dB/Oct", "36 dB/Oct", "48 dB/Oct"];
