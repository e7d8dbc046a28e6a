//! Persistence module
//!
//! State save/load functionality using serde and JSON.

pub mod state;

pub use state::{
    get_state, load_from_file, save_to_file, set_state, EqState, StateError, STATE_VERSION,
};
