use std::{collections::HashMap, path::PathBuf};

use crate::foundation::{
    core::{Dims3, ValueRange},
    error::{VolserveError, VolserveResult},
};

/// Location, shape and scalar domain of one dataset timestep.
///
/// The file is a flat, headerless array of `f32` samples, first dimension varying fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeDescriptor {
    pub path: PathBuf,
    pub dims: Dims3,
    pub domain: ValueRange,
}

/// Write-once table of `(name, timestep) -> VolumeDescriptor`.
#[derive(Clone, Debug, Default)]
pub struct DatasetRegistry {
    entries: HashMap<(String, i32), VolumeDescriptor>,
}

impl DatasetRegistry {
    pub(crate) fn from_entries(
        entries: impl IntoIterator<Item = (String, i32, VolumeDescriptor)>,
    ) -> VolserveResult<Self> {
        let mut out = HashMap::new();
        for (name, timestep, desc) in entries {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(VolserveError::validation(format!(
                    "dataset name '{name}' must be a non-empty single token"
                )));
            }
            if out.insert((name.clone(), timestep), desc).is_some() {
                return Err(VolserveError::validation(format!(
                    "duplicate dataset entry '{name}' timestep {timestep}"
                )));
            }
        }
        Ok(Self { entries: out })
    }

    pub fn lookup(&self, name: &str, timestep: i32) -> VolserveResult<&VolumeDescriptor> {
        self.entries
            .get(&(name.to_string(), timestep))
            .ok_or_else(|| {
                VolserveError::lookup(format!("unknown volume '{name}' timestep {timestep}"))
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted `(name, timestep)` pairs, for diagnostics.
    pub fn keys(&self) -> Vec<(String, i32)> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
