//! Per-channel filter cascade.
//!
//! A [`MonoChain`] runs five stages in a fixed order:
//! LowCut, Band1, Band2, Band3, HighCut. The peak bands are single biquads;
//! the cut filters are [`CutCascade`]s of four biquads whose active prefix
//! is chosen by the slope.
//!
//! The stages live in a fixed array of the [`Stage`] sum type, so the audio
//! thread never goes through dynamic dispatch and nothing is allocated after
//! construction.

use super::biquad::{BiquadCoefficients, FilterStage};
use super::coefficients::{ChainCoefficients, CutCoefficients, MAX_CUT_SECTIONS};
use super::parameter_store::{ParameterSnapshot, Slope};

/// Position of a stage inside the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainPosition {
    LowCut,
    Band1,
    Band2,
    Band3,
    HighCut,
}

impl ChainPosition {
    /// All positions in processing order.
    pub const ALL: [ChainPosition; 5] = [
        ChainPosition::LowCut,
        ChainPosition::Band1,
        ChainPosition::Band2,
        ChainPosition::Band3,
        ChainPosition::HighCut,
    ];

    /// Index into the stage array.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Addresses a single biquad inside the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageId {
    Band1,
    Band2,
    Band3,
    /// Section of the low-cut cascade (0..4).
    LowCut(usize),
    /// Section of the high-cut cascade (0..4).
    HighCut(usize),
}

/// Four biquads with independent bypass flags.
#[derive(Clone, Debug)]
pub struct CutCascade {
    sections: [FilterStage; MAX_CUT_SECTIONS],
    bypassed: [bool; MAX_CUT_SECTIONS],
}

impl CutCascade {
    /// Creates a cascade with every section bypassed.
    pub fn new() -> Self {
        Self {
            sections: [FilterStage::new(); MAX_CUT_SECTIONS],
            bypassed: [true; MAX_CUT_SECTIONS],
        }
    }

    /// Coefficients of one section.
    pub fn coefficients(&self, section: usize) -> Option<&BiquadCoefficients> {
        self.sections.get(section).map(FilterStage::coefficients)
    }

    /// Replaces one section's coefficients. Out-of-range indices are ignored.
    pub fn set_coefficients(&mut self, section: usize, coefficients: BiquadCoefficients) {
        debug_assert!(section < MAX_CUT_SECTIONS, "cut section {} out of range", section);
        if let Some(stage) = self.sections.get_mut(section) {
            stage.set_coefficients(coefficients);
        }
    }

    /// Sets one section's bypass flag. Out-of-range indices are ignored.
    pub fn set_bypassed(&mut self, section: usize, bypassed: bool) {
        debug_assert!(section < MAX_CUT_SECTIONS, "cut section {} out of range", section);
        if let Some(flag) = self.bypassed.get_mut(section) {
            *flag = bypassed;
        }
    }

    /// Returns whether a section is bypassed. Unknown sections count as bypassed.
    pub fn is_bypassed(&self, section: usize) -> bool {
        self.bypassed.get(section).copied().unwrap_or(true)
    }

    /// Number of sections currently processing.
    pub fn active_sections(&self) -> usize {
        self.bypassed.iter().filter(|b| !**b).count()
    }

    /// Bypasses everything, then enables sections `slope..=0` in reverse order.
    pub fn apply_slope(&mut self, slope: Slope) {
        self.bypassed = [true; MAX_CUT_SECTIONS];
        for section in (0..slope.sections()).rev() {
            self.bypassed[section] = false;
        }
    }

    /// Loads designed section coefficients and enables the matching prefix.
    pub fn update(&mut self, coefficients: &CutCoefficients, slope: Slope) {
        for (section, c) in coefficients.iter().enumerate() {
            self.set_coefficients(section, *c);
        }
        self.apply_slope(slope);
    }

    /// Runs every non-bypassed section over the buffer.
    #[inline]
    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        for (stage, bypassed) in self.sections.iter_mut().zip(self.bypassed.iter()) {
            if !bypassed {
                stage.process_in_place(buffer);
            }
        }
    }

    /// Combined magnitude of the active sections.
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        self.sections
            .iter()
            .zip(self.bypassed.iter())
            .filter(|(_, bypassed)| !**bypassed)
            .map(|(stage, _)| stage.coefficients().magnitude(freq, sample_rate))
            .product()
    }

    /// Clears every section's state.
    pub fn reset(&mut self) {
        for stage in &mut self.sections {
            stage.reset();
        }
    }
}

impl Default for CutCascade {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot of the chain.
#[derive(Clone, Debug)]
pub enum Stage {
    Peak(FilterStage),
    Cut(CutCascade),
}

impl Stage {
    #[inline]
    fn process_in_place(&mut self, buffer: &mut [f32]) {
        match self {
            Stage::Peak(stage) => stage.process_in_place(buffer),
            Stage::Cut(cascade) => cascade.process_in_place(buffer),
        }
    }

    fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        match self {
            Stage::Peak(stage) => stage.coefficients().magnitude(freq, sample_rate),
            Stage::Cut(cascade) => cascade.magnitude(freq, sample_rate),
        }
    }

    fn reset(&mut self) {
        match self {
            Stage::Peak(stage) => stage.reset(),
            Stage::Cut(cascade) => cascade.reset(),
        }
    }
}

/// The five-stage equalizer for one channel.
#[derive(Clone, Debug)]
pub struct MonoChain {
    stages: [Stage; 5],
    bypassed: [bool; 5],
    all_bypassed: bool,
    sample_rate: f64,
}

impl MonoChain {
    /// Creates a chain of unity stages.
    pub fn new() -> Self {
        Self {
            stages: [
                Stage::Cut(CutCascade::new()),
                Stage::Peak(FilterStage::new()),
                Stage::Peak(FilterStage::new()),
                Stage::Peak(FilterStage::new()),
                Stage::Cut(CutCascade::new()),
            ],
            bypassed: [false; 5],
            all_bypassed: false,
            sample_rate: 44100.0,
        }
    }

    /// Prepares for playback: records the sample rate and clears all state.
    pub fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    /// Sample rate passed to the last [`prepare`](Self::prepare).
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Stage at a position.
    pub fn stage(&self, position: ChainPosition) -> &Stage {
        &self.stages[position.index()]
    }

    /// Cut cascade at `position`, if that position holds one.
    pub fn cut_cascade(&self, position: ChainPosition) -> Option<&CutCascade> {
        match &self.stages[position.index()] {
            Stage::Cut(cascade) => Some(cascade),
            Stage::Peak(_) => None,
        }
    }

    fn cut_cascade_mut(&mut self, position: ChainPosition) -> Option<&mut CutCascade> {
        match &mut self.stages[position.index()] {
            Stage::Cut(cascade) => Some(cascade),
            Stage::Peak(_) => None,
        }
    }

    /// Replaces the coefficients of one biquad by value copy.
    ///
    /// REAL-TIME SAFE: no allocation.
    pub fn set_coefficients(&mut self, id: StageId, coefficients: BiquadCoefficients) {
        let (position, section) = match id {
            StageId::Band1 => (ChainPosition::Band1, None),
            StageId::Band2 => (ChainPosition::Band2, None),
            StageId::Band3 => (ChainPosition::Band3, None),
            StageId::LowCut(section) => (ChainPosition::LowCut, Some(section)),
            StageId::HighCut(section) => (ChainPosition::HighCut, Some(section)),
        };
        match (&mut self.stages[position.index()], section) {
            (Stage::Peak(stage), None) => stage.set_coefficients(coefficients),
            (Stage::Cut(cascade), Some(section)) => cascade.set_coefficients(section, coefficients),
            _ => debug_assert!(false, "stage {:?} does not match chain layout", id),
        }
    }

    /// Bypasses or enables a whole stage.
    pub fn set_bypassed(&mut self, position: ChainPosition, bypassed: bool) {
        self.bypassed[position.index()] = bypassed;
    }

    /// Returns whether a whole stage is bypassed.
    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.bypassed[position.index()]
    }

    /// Sets a single section's bypass flag in a cut cascade.
    ///
    /// Ignored for peak positions.
    pub fn set_cut_bypassed(&mut self, position: ChainPosition, section: usize, bypassed: bool) {
        if let Some(cascade) = self.cut_cascade_mut(position) {
            cascade.set_bypassed(section, bypassed);
        }
    }

    /// Global bypass: the chain leaves buffers untouched.
    pub fn set_all_bypassed(&mut self, bypassed: bool) {
        self.all_bypassed = bypassed;
    }

    /// Returns whether the global bypass is on.
    pub fn is_all_bypassed(&self) -> bool {
        self.all_bypassed
    }

    /// Loads a full block's worth of coefficients.
    ///
    /// Must be called between blocks; the cut slope transition happens here.
    pub fn apply_coefficients(&mut self, coefficients: &ChainCoefficients) {
        if let Some(cascade) = self.cut_cascade_mut(ChainPosition::LowCut) {
            cascade.update(&coefficients.low_cut, coefficients.low_cut_slope);
        }
        self.set_coefficients(StageId::Band1, coefficients.bands[0]);
        self.set_coefficients(StageId::Band2, coefficients.bands[1]);
        self.set_coefficients(StageId::Band3, coefficients.bands[2]);
        if let Some(cascade) = self.cut_cascade_mut(ChainPosition::HighCut) {
            cascade.update(&coefficients.high_cut, coefficients.high_cut_slope);
        }
    }

    /// Copies the bypass flags of a snapshot.
    pub fn apply_bypass(&mut self, snapshot: &ParameterSnapshot) {
        self.set_bypassed(ChainPosition::LowCut, snapshot.low_cut_bypassed);
        self.set_bypassed(ChainPosition::Band1, snapshot.band1_bypassed);
        self.set_bypassed(ChainPosition::Band2, snapshot.band2_bypassed);
        self.set_bypassed(ChainPosition::Band3, snapshot.band3_bypassed);
        self.set_bypassed(ChainPosition::HighCut, snapshot.high_cut_bypassed);
        self.set_all_bypassed(snapshot.all_bypassed);
    }

    /// Coefficients and bypass flags in one call.
    pub fn update(&mut self, coefficients: &ChainCoefficients, snapshot: &ParameterSnapshot) {
        self.apply_coefficients(coefficients);
        self.apply_bypass(snapshot);
    }

    /// Filters a mono buffer in place.
    ///
    /// REAL-TIME SAFE: no allocation, bounded work.
    #[inline]
    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        if self.all_bypassed {
            return;
        }
        for (stage, bypassed) in self.stages.iter_mut().zip(self.bypassed.iter()) {
            if !bypassed {
                stage.process_in_place(buffer);
            }
        }
    }

    /// Magnitude of the whole chain at `freq`, as the product of the
    /// per-stage transfer functions.
    pub fn magnitude(&self, freq: f64) -> f64 {
        if self.all_bypassed {
            return 1.0;
        }
        self.stages
            .iter()
            .zip(self.bypassed.iter())
            .filter(|(_, bypassed)| !**bypassed)
            .map(|(stage, _)| stage.magnitude(freq, self.sample_rate))
            .product()
    }

    /// Clears the state of every stage.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

impl Default for MonoChain {
    fn default() -> Self {
        Self::new()
    }
}
