//! Thread-safe parameter registry.
//!
//! The store owns one atomic float per parameter. The control thread writes
//! (UI gestures, host automation, state loads); the audio and render threads
//! only read, either one value at a time or as a [`ParameterSnapshot`]
//! captured at a block boundary.
//!
//! Every parameter is independent, so relaxed ordering is enough for both
//! loads and stores.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::AtomicF32;

use super::parameter::{ParameterDefinition, SLOPE_LABELS};

/// Roll-off of a cut filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Slope {
    #[default]
    S12,
    S24,
    S36,
    S48,
}

impl Slope {
    /// All slopes in ordinal order.
    pub const ALL: [Slope; 4] = [Slope::S12, Slope::S24, Slope::S36, Slope::S48];

    /// Converts a choice index into a slope, clamping out-of-range values.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(3)]
    }

    /// Ordinal of the slope (0..=3).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Butterworth order realised by this slope (2, 4, 6 or 8).
    pub fn order(self) -> usize {
        2 * (self.index() + 1)
    }

    /// Number of active biquad sections (1..=4).
    pub fn sections(self) -> usize {
        self.index() + 1
    }

    /// Asymptotic roll-off in dB per octave.
    pub fn db_per_octave(self) -> f32 {
        12.0 * self.sections() as f32
    }
}

/// Identifier of every parameter the equalizer exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterId {
    LowCutFreq,
    HighCutFreq,
    Band1Freq,
    Band1Gain,
    Band1Quality,
    Band2Freq,
    Band2Gain,
    Band2Quality,
    Band3Freq,
    Band3Gain,
    Band3Quality,
    LowCutSlope,
    HighCutSlope,
    LowCutBypassed,
    HighCutBypassed,
    Band1Bypassed,
    Band2Bypassed,
    Band3Bypassed,
    AllBypassed,
    AnalyzerEnabled,
}

impl ParameterId {
    /// Number of parameters.
    pub const COUNT: usize = 20;

    /// All parameters in declaration order.
    pub const ALL: [ParameterId; Self::COUNT] = [
        ParameterId::LowCutFreq,
        ParameterId::HighCutFreq,
        ParameterId::Band1Freq,
        ParameterId::Band1Gain,
        ParameterId::Band1Quality,
        ParameterId::Band2Freq,
        ParameterId::Band2Gain,
        ParameterId::Band2Quality,
        ParameterId::Band3Freq,
        ParameterId::Band3Gain,
        ParameterId::Band3Quality,
        ParameterId::LowCutSlope,
        ParameterId::HighCutSlope,
        ParameterId::LowCutBypassed,
        ParameterId::HighCutBypassed,
        ParameterId::Band1Bypassed,
        ParameterId::Band2Bypassed,
        ParameterId::Band3Bypassed,
        ParameterId::AllBypassed,
        ParameterId::AnalyzerEnabled,
    ];

    /// Position of this parameter in [`ParameterId::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Host-visible name.
    pub fn name(self) -> &'static str {
        match self {
            ParameterId::LowCutFreq => "LowCut Freq",
            ParameterId::HighCutFreq => "HiCut Freq",
            ParameterId::Band1Freq => "Band1 Freq",
            ParameterId::Band1Gain => "Band1 Gain",
            ParameterId::Band1Quality => "Band1 Quality",
            ParameterId::Band2Freq => "Band2 Freq",
            ParameterId::Band2Gain => "Band2 Gain",
            ParameterId::Band2Quality => "Band2 Quality",
            ParameterId::Band3Freq => "Band3 Freq",
            ParameterId::Band3Gain => "Band3 Gain",
            ParameterId::Band3Quality => "Band3 Quality",
            ParameterId::LowCutSlope => "LowCut Slope",
            ParameterId::HighCutSlope => "HiCut Slope",
            ParameterId::LowCutBypassed => "LowCut Bypassed",
            ParameterId::HighCutBypassed => "HiCut Bypassed",
            ParameterId::Band1Bypassed => "Band1 Bypassed",
            ParameterId::Band2Bypassed => "Band2 Bypassed",
            ParameterId::Band3Bypassed => "Band3 Bypassed",
            ParameterId::AllBypassed => "All Bypassed",
            ParameterId::AnalyzerEnabled => "Analyzer Enabled",
        }
    }

    /// Looks a parameter up by its host-visible name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    /// Range, default and display of this parameter.
    pub fn definition(self) -> ParameterDefinition {
        let name = self.name();
        match self {
            ParameterId::LowCutFreq => ParameterDefinition::frequency(name, 20.0),
            ParameterId::HighCutFreq => ParameterDefinition::frequency(name, 20_000.0),
            ParameterId::Band1Freq => ParameterDefinition::frequency(name, 400.0),
            ParameterId::Band2Freq => ParameterDefinition::frequency(name, 1000.0),
            ParameterId::Band3Freq => ParameterDefinition::frequency(name, 5000.0),
            ParameterId::Band1Gain | ParameterId::Band2Gain | ParameterId::Band3Gain => {
                ParameterDefinition::gain(name)
            }
            ParameterId::Band1Quality | ParameterId::Band2Quality | ParameterId::Band3Quality => {
                ParameterDefinition::quality(name)
            }
            ParameterId::LowCutSlope | ParameterId::HighCutSlope => {
                ParameterDefinition::choice(name, SLOPE_LABELS, 0)
            }
            ParameterId::AnalyzerEnabled => ParameterDefinition::toggle(name, true),
            _ => ParameterDefinition::toggle(name, false),
        }
    }
}

/// Value-type capture of every parameter at one instant.
///
/// Frequencies are linear Hz and gains are dB; conversion to linear gain
/// happens inside the peak-filter design.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterSnapshot {
    pub band1_freq: f32,
    pub band1_gain_db: f32,
    pub band1_quality: f32,
    pub band2_freq: f32,
    pub band2_gain_db: f32,
    pub band2_quality: f32,
    pub band3_freq: f32,
    pub band3_gain_db: f32,
    pub band3_quality: f32,
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
    pub low_cut_bypassed: bool,
    pub high_cut_bypassed: bool,
    pub band1_bypassed: bool,
    pub band2_bypassed: bool,
    pub band3_bypassed: bool,
    pub all_bypassed: bool,
    pub analyzer_enabled: bool,
}

impl ParameterSnapshot {
    /// Builds a snapshot from one raw value per parameter. Toggles read as
    /// on at 0.5 and above; slopes round to the nearest choice.
    pub fn from_values(value: impl Fn(ParameterId) -> f32) -> Self {
        use ParameterId::*;

        let toggle = |id| value(id) >= 0.5;
        let slope = |id| Slope::from_index(value(id).round().max(0.0) as usize);

        Self {
            band1_freq: value(Band1Freq),
            band1_gain_db: value(Band1Gain),
            band1_quality: value(Band1Quality),
            band2_freq: value(Band2Freq),
            band2_gain_db: value(Band2Gain),
            band2_quality: value(Band2Quality),
            band3_freq: value(Band3Freq),
            band3_gain_db: value(Band3Gain),
            band3_quality: value(Band3Quality),
            low_cut_freq: value(LowCutFreq),
            high_cut_freq: value(HighCutFreq),
            low_cut_slope: slope(LowCutSlope),
            high_cut_slope: slope(HighCutSlope),
            low_cut_bypassed: toggle(LowCutBypassed),
            high_cut_bypassed: toggle(HighCutBypassed),
            band1_bypassed: toggle(Band1Bypassed),
            band2_bypassed: toggle(Band2Bypassed),
            band3_bypassed: toggle(Band3Bypassed),
            all_bypassed: toggle(AllBypassed),
            analyzer_enabled: toggle(AnalyzerEnabled),
        }
    }
}

impl Default for ParameterSnapshot {
    /// Snapshot of every parameter at its default.
    fn default() -> Self {
        Self::from_values(|id| id.definition().default)
    }
}

/// Receives parameter change notifications on the control thread.
pub trait ParameterListener: Send + Sync {
    /// Called after `id` has been written with its new legal value.
    fn parameter_value_changed(&self, id: ParameterId, value: f32);
}

/// Handle returned by [`ParameterStore::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    parameter: ParameterId,
    listener: Arc<dyn ParameterListener>,
}

/// A coalescing "something changed" flag.
///
/// Any number of change notifications collapse into a single pending flag,
/// which a reader clears with [`ChangeFlag::consume`].
#[derive(Debug, Default)]
pub struct ChangeFlag {
    changed: AtomicBool,
}

impl ChangeFlag {
    /// Creates a flag, optionally already raised.
    pub fn new(raised: bool) -> Self {
        Self {
            changed: AtomicBool::new(raised),
        }
    }

    /// Raises the flag.
    pub fn raise(&self) {
        self.changed.store(true, Ordering::Release);
    }

    /// Clears the flag and returns whether it was raised.
    pub fn consume(&self) -> bool {
        self.changed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Returns whether the flag is raised without clearing it.
    pub fn is_raised(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }
}

impl ParameterListener for ChangeFlag {
    fn parameter_value_changed(&self, _id: ParameterId, _value: f32) {
        self.raise();
    }
}

/// Registry of named, ranged parameters backed by atomics.
pub struct ParameterStore {
    definitions: Vec<ParameterDefinition>,
    values: Vec<AtomicF32>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
}

impl ParameterStore {
    /// Creates a store with every parameter at its default.
    pub fn new() -> Self {
        let definitions: Vec<ParameterDefinition> =
            ParameterId::ALL.iter().map(|id| id.definition()).collect();
        let values = definitions
            .iter()
            .map(|def| AtomicF32::new(def.default))
            .collect();

        Self {
            definitions,
            values,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Definition of a parameter.
    pub fn definition(&self, id: ParameterId) -> &ParameterDefinition {
        &self.definitions[id.index()]
    }

    /// All parameters with their definitions, in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = (ParameterId, &ParameterDefinition)> {
        ParameterId::ALL.iter().copied().zip(self.definitions.iter())
    }

    /// Current value of a parameter.
    ///
    /// REAL-TIME SAFE: a single relaxed atomic load.
    #[inline]
    pub fn get(&self, id: ParameterId) -> f32 {
        self.values[id.index()].load(Ordering::Relaxed)
    }

    /// Current value of a toggle parameter.
    #[inline]
    pub fn get_bool(&self, id: ParameterId) -> bool {
        self.get(id) >= 0.5
    }

    /// Current value of a slope choice parameter.
    #[inline]
    pub fn get_slope(&self, id: ParameterId) -> Slope {
        Slope::from_index(self.get(id).round().max(0.0) as usize)
    }

    /// Current value as a normalized 0..1 position.
    pub fn get_normalized(&self, id: ParameterId) -> f32 {
        self.definition(id).range.to_normalized(self.get(id))
    }

    /// Writes a parameter, clamping and snapping to its range, then notifies
    /// listeners. Returns the value actually stored. Non-finite writes are
    /// ignored and return the current value.
    ///
    /// Control thread only.
    pub fn set(&self, id: ParameterId, value: f32) -> f32 {
        if !value.is_finite() {
            return self.get(id);
        }
        let legal = self.store_value(id, value);
        self.notify(id, legal);
        legal
    }

    /// Writes a parameter from a normalized 0..1 automation value.
    pub fn set_normalized(&self, id: ParameterId, normalized: f32) -> f32 {
        if !normalized.is_finite() {
            return self.get(id);
        }
        let value = self.definition(id).range.from_normalized(normalized);
        self.set(id, value)
    }

    /// Writes a toggle parameter.
    pub fn set_bool(&self, id: ParameterId, value: bool) -> f32 {
        self.set(id, if value { 1.0 } else { 0.0 })
    }

    /// Writes a slope choice parameter.
    pub fn set_slope(&self, id: ParameterId, slope: Slope) -> f32 {
        self.set(id, slope.index() as f32)
    }

    /// Restores every parameter to its default and notifies listeners.
    pub fn reset_to_defaults(&self) {
        for id in ParameterId::ALL {
            let default = self.definition(id).default;
            self.set(id, default);
        }
    }

    /// Replaces several values at once. All values are stored before any
    /// listener runs, so listeners never observe a half-applied state.
    pub fn replace_values(&self, values: &[(ParameterId, f32)]) {
        let stored: Vec<(ParameterId, f32)> = values
            .iter()
            .filter(|(_, value)| value.is_finite())
            .map(|&(id, value)| (id, self.store_value(id, value)))
            .collect();
        for (id, value) in stored {
            self.notify(id, value);
        }
    }

    /// Captures all parameters.
    ///
    /// REAL-TIME SAFE: relaxed loads only, no allocation.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot::from_values(|id| self.get(id))
    }

    /// Registers a listener for one parameter.
    ///
    /// Control thread only.
    pub fn add_listener(
        &self,
        parameter: ParameterId,
        listener: Arc<dyn ParameterListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(ListenerEntry {
            id,
            parameter,
            listener,
        });
        id
    }

    /// Registers a listener for every parameter.
    pub fn add_listener_to_all(&self, listener: Arc<dyn ParameterListener>) -> Vec<ListenerId> {
        ParameterId::ALL
            .iter()
            .map(|&parameter| self.add_listener(parameter, Arc::clone(&listener)))
            .collect()
    }

    /// Unregisters a listener. Returns false if the handle was unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    /// Number of registered listener entries.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn store_value(&self, id: ParameterId, value: f32) -> f32 {
        let legal = self.definition(id).legalize(value);
        self.values[id.index()].store(legal, Ordering::Relaxed);
        legal
    }

    fn notify(&self, id: ParameterId, value: f32) {
        // Listeners run outside the lock so they may (un)register themselves.
        let targets: Vec<Arc<dyn ParameterListener>> = self
            .listeners
            .lock()
            .iter()
            .filter(|entry| entry.parameter == id)
            .map(|entry| Arc::clone(&entry.listener))
            .collect();

        for listener in targets {
            listener.parameter_value_changed(id, value);
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("snapshot", &self.snapshot())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
