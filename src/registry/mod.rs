//! Process-wide lookup tables loaded once before the command loop starts.
//!
//! A [`Registry`] is immutable after construction: it is either built from the compiled-in tables
//! ([`Registry::builtin`]) or from a JSON registry file ([`Registry::load`]).

mod builtin;
pub mod dataset;
pub mod palette;

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::foundation::{
    core::{Dims3, ValueRange},
    error::{VolserveError, VolserveResult},
};

pub use builtin::DEFAULT_DATA_ROOT;
pub use dataset::{DatasetRegistry, VolumeDescriptor};
pub use palette::{ColorCurve, OpacityCurve, PaletteRegistry};

/// Serialized dataset entry.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetDef {
    pub name: String,
    #[serde(default)]
    pub timestep: i32,
    pub path: PathBuf,
    pub dimensions: [u64; 3],
    pub domain: [f32; 2],
}

/// Serialized registry: the on-disk form of the startup tables.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegistryDef {
    #[serde(default)]
    pub datasets: Vec<DatasetDef>,
    #[serde(default)]
    pub color_maps: BTreeMap<String, Vec<[f32; 3]>>,
    #[serde(default)]
    pub opacity_maps: BTreeMap<String, Vec<f32>>,
}

/// Immutable dataset and palette lookup tables.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    datasets: DatasetRegistry,
    palettes: PaletteRegistry,
}

impl Registry {
    /// Validate a [`RegistryDef`] and freeze it.
    ///
    /// Relative dataset paths are resolved against `root`.
    pub fn from_def(def: RegistryDef, root: &Path) -> VolserveResult<Self> {
        let mut entries = Vec::with_capacity(def.datasets.len());
        for d in def.datasets {
            let [d1, d2, d3] = d.dimensions;
            let dims = Dims3::new(d1, d2, d3)
                .map_err(|e| VolserveError::validation(format!("dataset '{}': {e}", d.name)))?;
            let domain = ValueRange::new(d.domain[0], d.domain[1])
                .map_err(|e| VolserveError::validation(format!("dataset '{}': {e}", d.name)))?;
            let path = if d.path.is_absolute() {
                d.path
            } else {
                root.join(d.path)
            };
            entries.push((
                d.name,
                d.timestep,
                VolumeDescriptor { path, dims, domain },
            ));
        }

        let mut colors = BTreeMap::new();
        for (name, points) in def.color_maps {
            let curve = ColorCurve::new(points)
                .map_err(|e| VolserveError::validation(format!("color map '{name}': {e}")))?;
            colors.insert(name, curve);
        }

        let mut opacities = BTreeMap::new();
        for (name, points) in def.opacity_maps {
            let curve = OpacityCurve::new(points)
                .map_err(|e| VolserveError::validation(format!("opacity map '{name}': {e}")))?;
            opacities.insert(name, curve);
        }

        Ok(Self {
            datasets: DatasetRegistry::from_entries(entries)?,
            palettes: PaletteRegistry::new(colors, opacities),
        })
    }

    /// Compiled-in tables with dataset files under `data_root`.
    pub fn builtin(data_root: impl AsRef<Path>) -> VolserveResult<Self> {
        let root = data_root.as_ref();
        Self::from_def(builtin::builtin_def(), root)
    }

    /// Load a JSON registry file. Relative dataset paths resolve against the file's directory.
    pub fn load(path: &Path) -> VolserveResult<Self> {
        let f = File::open(path)
            .with_context(|| format!("open registry file '{}'", path.display()))?;
        let def: RegistryDef = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse registry file '{}'", path.display()))?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_def(def, root)
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    pub fn palettes(&self) -> &PaletteRegistry {
        &self.palettes
    }

    pub fn volume(&self, name: &str, timestep: i32) -> VolserveResult<&VolumeDescriptor> {
        self.datasets.lookup(name, timestep)
    }

    pub fn color(&self, name: &str) -> VolserveResult<&ColorCurve> {
        self.palettes.color(name)
    }

    pub fn opacity(&self, name: &str) -> VolserveResult<&OpacityCurve> {
        self.palettes.opacity(name)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/registry/registry.rs"]
mod tests;
