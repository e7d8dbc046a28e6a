//! DSP module
//!
//! Parameters, coefficient design and the per-channel filter chain.

pub mod biquad;
pub mod coefficients;
pub mod filter_chain;
pub mod parameter;
pub mod parameter_store;
pub mod response;

pub use biquad::{BiquadCoefficients, FilterStage};
pub use coefficients::{
    make_highpass_cascade, make_lowpass_cascade, make_peak_filter, ChainCoefficients,
    CutCoefficients, MAX_CUT_SECTIONS,
};
pub use filter_chain::{ChainPosition, CutCascade, MonoChain, Stage, StageId};
pub use parameter::{ParameterDefinition, ParameterDisplay, ParameterRange};
pub use parameter_store::{
    ChangeFlag, ListenerId, ParameterId, ParameterListener, ParameterSnapshot, ParameterStore,
    Slope,
};
pub use response::ResponseCurve;
