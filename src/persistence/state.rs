//! State serialization for save/load functionality.
//!
//! The equalizer state is the parameter tree: every parameter's host-visible
//! name mapped to its current value, plus a format version. It travels as an
//! opaque JSON byte blob so hosts can store it however they like.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::{ParameterId, ParameterStore};

/// Current state format version.
/// Increment this when making breaking changes to the format.
pub const STATE_VERSION: u32 = 1;

/// Error type for state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// File I/O error.
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    /// The blob is not a valid parameter tree.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The blob was written by a newer format.
    #[error("incompatible state version: found {found}, expected <= {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
    /// A parameter value is not a finite number.
    #[error("invalid value for parameter '{name}': {value}")]
    InvalidValue { name: String, value: f32 },
}

/// Serialized parameter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqState {
    /// State format version for future compatibility.
    pub version: u32,
    /// Parameter values keyed by host-visible name.
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

impl EqState {
    /// Captures the current value of every parameter.
    pub fn capture(store: &ParameterStore) -> Self {
        Self {
            version: STATE_VERSION,
            parameters: ParameterId::ALL
                .iter()
                .map(|&id| (id.name().to_string(), store.get(id)))
                .collect(),
        }
    }

    /// Check if this state version can be loaded.
    pub fn is_compatible(&self) -> bool {
        self.version <= STATE_VERSION
    }

    /// Resolves the tree into one value per parameter.
    ///
    /// Unknown names are ignored and missing names take their defaults.
    pub fn resolve(&self) -> Result<Vec<(ParameterId, f32)>, StateError> {
        if !self.is_compatible() {
            return Err(StateError::IncompatibleVersion {
                found: self.version,
                expected: STATE_VERSION,
            });
        }

        for (name, value) in &self.parameters {
            if !value.is_finite() {
                return Err(StateError::InvalidValue {
                    name: name.clone(),
                    value: *value,
                });
            }
            if ParameterId::from_name(name).is_none() {
                debug!("ignoring unknown parameter '{}' in state", name);
            }
        }

        Ok(ParameterId::ALL
            .iter()
            .map(|&id| {
                let value = self
                    .parameters
                    .get(id.name())
                    .copied()
                    .unwrap_or(id.definition().default);
                (id, value)
            })
            .collect())
    }

    /// Serializes to a JSON byte blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses a JSON byte blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Writes the parameter tree of `store` to a byte blob.
pub fn get_state(store: &ParameterStore) -> Result<Vec<u8>, StateError> {
    EqState::capture(store).to_bytes()
}

/// Replaces the parameters of `store` with those in `bytes`.
///
/// On any error the store is left untouched. On success every listener is
/// notified, so render-side consumers refresh; the audio thread picks the
/// new values up with its next snapshot.
pub fn set_state(store: &ParameterStore, bytes: &[u8]) -> Result<(), StateError> {
    let values = EqState::from_bytes(bytes)
        .and_then(|state| state.resolve())
        .inspect_err(|e| warn!("rejected state blob: {}", e))?;
    store.replace_values(&values);
    Ok(())
}

/// Save the state of `store` to a JSON file.
pub fn save_to_file(store: &ParameterStore, path: &Path) -> Result<(), StateError> {
    std::fs::write(path, get_state(store)?)?;
    Ok(())
}

/// Load a JSON state file into `store`.
pub fn load_from_file(store: &ParameterStore, path: &Path) -> Result<(), StateError> {
    let bytes = std::fs::read(path)?;
    set_state(store, &bytes)
}
