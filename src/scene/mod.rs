//! Scene graph construction: registry entries plus cached engine objects into a renderable world.
//!
//! A world is either a volumetric model (volume + transfer function) or an isosurface model
//! (volume + iso-values + fixed opaque material), selected by whether the request carries
//! iso-values. Either model is wrapped as group -> instance -> world with one ambient light.

use std::{cell::RefCell, path::Path, rc::Rc, sync::Arc};

use anyhow::Context as _;

use crate::{
    cache::{ImmutableCache, ResourceCache, TransferFunctionKey, VolumeKey, WorldKey},
    engine::{Engine, ObjectKind, ObjectRef, Param, SharedGrid},
    foundation::{
        core::{Dims3, Vec3},
        error::{VolserveError, VolserveResult},
    },
    registry::{ColorCurve, OpacityCurve, Registry, VolumeDescriptor},
};

const ISOSURFACE_KD: Vec3 = [0.8, 0.8, 0.8];

/// Placement of a structured grid in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GridConvention {
    /// Centered at the origin, spacing `1/d` per axis.
    #[default]
    UnitCube,
    /// Origin at zero, one world unit per voxel.
    Voxel,
}

impl GridConvention {
    /// `(gridOrigin, gridSpacing)` for a grid of `dims`.
    pub fn placement(self, dims: Dims3) -> (Vec3, Vec3) {
        match self {
            GridConvention::UnitCube => {
                let [d1, d2, d3] = dims.0;
                (
                    [-0.5, -0.5, -0.5],
                    [1.0 / d1 as f32, 1.0 / d2 as f32, 1.0 / d3 as f32],
                )
            }
            GridConvention::Voxel => ([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
        }
    }
}

impl std::str::FromStr for GridConvention {
    type Err = VolserveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unit-cube" => Ok(Self::UnitCube),
            "voxel" => Ok(Self::Voxel),
            other => Err(VolserveError::validation(format!(
                "unknown grid convention '{other}' (expected unit-cube or voxel)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Volumetric,
    Isosurface,
}

/// Arguments of one `world` command.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldRequest {
    pub volume: String,
    pub timestep: i32,
    pub color_map: String,
    pub opacity_map: String,
    pub isovalues: Vec<f32>,
}

impl WorldRequest {
    pub fn mode(&self) -> RenderMode {
        if self.isovalues.is_empty() {
            RenderMode::Volumetric
        } else {
            RenderMode::Isosurface
        }
    }

    pub fn key(&self) -> WorldKey {
        WorldKey {
            volume: self.volume.clone(),
            timestep: self.timestep,
            color_map: self.color_map.clone(),
            opacity_map: self.opacity_map.clone(),
            isosurface: self.mode() == RenderMode::Isosurface,
        }
    }
}

struct IsoBinding {
    geometry: ObjectRef,
    values: RefCell<Vec<f32>>,
}

/// A committed world and what it was built from.
pub struct BuiltWorld {
    world: ObjectRef,
    mode: RenderMode,
    iso: Option<IsoBinding>,
}

impl BuiltWorld {
    pub fn world(&self) -> &ObjectRef {
        &self.world
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Iso-values currently set on the surface, `None` in volumetric mode.
    pub fn isovalues(&self) -> Option<Vec<f32>> {
        self.iso.as_ref().map(|iso| iso.values.borrow().clone())
    }

    /// Overwrite the surface's iso-values when a request with the same key asks for other values.
    fn replace_isovalues(&self, values: &[f32]) -> VolserveResult<()> {
        let Some(iso) = &self.iso else {
            return Ok(());
        };
        if iso.values.borrow().as_slice() == values {
            return Ok(());
        }
        tracing::debug!(?values, "replacing iso-values on cached world");
        iso.geometry
            .set("isovalue", Param::Floats(Arc::from(values)))?;
        iso.geometry.commit()?;
        self.world.commit()?;
        *iso.values.borrow_mut() = values.to_vec();
        Ok(())
    }
}

/// Read a flat little-endian `f32` grid of `dims` samples.
pub fn load_samples(path: &Path, dims: Dims3) -> VolserveResult<Arc<[f32]>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read volume file '{}'", path.display()))?;
    let expected = dims.f32_byte_len();
    if bytes.len() as u64 != expected {
        return Err(VolserveError::validation(format!(
            "volume file '{}' holds {} bytes, dimensions {:?} need {expected}",
            path.display(),
            bytes.len(),
            dims.0
        )));
    }
    tracing::info!(path = %path.display(), bytes = bytes.len(), "loaded volume samples");
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Resolved registry inputs for one world, gathered before any engine work.
enum ModelInputs<'r> {
    Volumetric {
        color_map: &'r ColorCurve,
        opacity_map: &'r OpacityCurve,
    },
    Isosurface,
}

pub struct SceneBuilder<'a> {
    engine: &'a Rc<dyn Engine>,
    registry: &'a Registry,
    grid: GridConvention,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(engine: &'a Rc<dyn Engine>, registry: &'a Registry, grid: GridConvention) -> Self {
        Self {
            engine,
            registry,
            grid,
        }
    }

    /// Fetch or build the world for `req`.
    ///
    /// Unknown volume or curve names fail with a recoverable error before any engine object is
    /// created or any cache entry is inserted.
    #[tracing::instrument(skip(self, cache), fields(volume = %req.volume, timestep = req.timestep))]
    pub fn world<'c>(
        &self,
        cache: &'c mut ResourceCache,
        req: &WorldRequest,
    ) -> VolserveResult<&'c BuiltWorld> {
        let desc = self.registry.volume(&req.volume, req.timestep)?;
        let inputs = match req.mode() {
            RenderMode::Volumetric => ModelInputs::Volumetric {
                color_map: self.registry.color(&req.color_map)?,
                opacity_map: self.registry.opacity(&req.opacity_map)?,
            },
            RenderMode::Isosurface => ModelInputs::Isosurface,
        };

        let ResourceCache {
            volumes,
            transfer_functions,
            worlds,
            ..
        } = cache;

        let built = worlds.get_or_try_insert_with(req.key(), || {
            tracing::debug!(mode = ?req.mode(), "building world");
            let volume = self.volume(volumes, req, desc)?;
            match inputs {
                ModelInputs::Volumetric {
                    color_map,
                    opacity_map,
                } => {
                    let tf = self.transfer_function(
                        transfer_functions,
                        req,
                        desc,
                        color_map,
                        opacity_map,
                    )?;
                    let model = self.object(ObjectKind::VolumetricModel, "volumetric")?;
                    model.set_object("volume", &volume)?;
                    model.set_object("transferFunction", &tf)?;
                    model.commit()?;
                    Ok(BuiltWorld {
                        world: self.wrap("volume", &model)?,
                        mode: RenderMode::Volumetric,
                        iso: None,
                    })
                }
                ModelInputs::Isosurface => {
                    let geometry = self.object(ObjectKind::Geometry, "isosurface")?;
                    geometry.set_object("volume", &volume)?;
                    geometry.set("isovalue", Param::Floats(Arc::from(req.isovalues.as_slice())))?;
                    geometry.commit()?;

                    let material = self.object(ObjectKind::Material, "obj")?;
                    material.set("kd", Param::Vec3(ISOSURFACE_KD))?;
                    material.commit()?;

                    let model = self.object(ObjectKind::GeometricModel, "geometric")?;
                    model.set_object("geometry", &geometry)?;
                    model.set_object("material", &material)?;
                    model.commit()?;

                    Ok(BuiltWorld {
                        world: self.wrap("geometry", &model)?,
                        mode: RenderMode::Isosurface,
                        iso: Some(IsoBinding {
                            geometry,
                            values: RefCell::new(req.isovalues.clone()),
                        }),
                    })
                }
            }
        })?;

        built.replace_isovalues(&req.isovalues)?;
        Ok(built)
    }

    fn object(&self, kind: ObjectKind, type_tag: &str) -> VolserveResult<ObjectRef> {
        ObjectRef::construct(self.engine, kind, type_tag)
    }

    fn volume(
        &self,
        volumes: &mut ImmutableCache<VolumeKey, ObjectRef>,
        req: &WorldRequest,
        desc: &VolumeDescriptor,
    ) -> VolserveResult<ObjectRef> {
        let key = VolumeKey {
            name: req.volume.clone(),
            timestep: req.timestep,
        };
        let volume = volumes.get_or_try_insert_with(key, || {
            let samples = load_samples(&desc.path, desc.dims)?;
            let (origin, spacing) = self.grid.placement(desc.dims);
            let v = self.object(ObjectKind::Volume, "structuredRegular")?;
            v.set(
                "data",
                Param::Grid(SharedGrid {
                    samples,
                    dims: desc.dims,
                }),
            )?;
            v.set("gridOrigin", Param::Vec3(origin))?;
            v.set("gridSpacing", Param::Vec3(spacing))?;
            v.commit()?;
            Ok(v)
        })?;
        Ok(volume.clone())
    }

    fn transfer_function(
        &self,
        transfer_functions: &mut ImmutableCache<TransferFunctionKey, ObjectRef>,
        req: &WorldRequest,
        desc: &VolumeDescriptor,
        color_map: &ColorCurve,
        opacity_map: &OpacityCurve,
    ) -> VolserveResult<ObjectRef> {
        let key = TransferFunctionKey {
            color_map: req.color_map.clone(),
            opacity_map: req.opacity_map.clone(),
            domain: desc.domain.key_bits(),
        };
        let tf = transfer_functions.get_or_try_insert_with(key, || {
            let tf = self.object(ObjectKind::TransferFunction, "piecewiseLinear")?;
            tf.set("color", Param::Vec3s(Arc::clone(color_map.points())))?;
            tf.set("opacity", Param::Floats(Arc::clone(opacity_map.points())))?;
            tf.set("value", Param::Box1(desc.domain.as_box1()))?;
            tf.commit()?;
            Ok(tf)
        })?;
        Ok(tf.clone())
    }

    /// group -> instance -> world, with the world's ambient light.
    fn wrap(&self, slot: &str, model: &ObjectRef) -> VolserveResult<ObjectRef> {
        let group = self.object(ObjectKind::Group, "group")?;
        group.set_objects(slot, &[model])?;
        group.commit()?;

        let instance = self.object(ObjectKind::Instance, "instance")?;
        instance.set_object("group", &group)?;
        instance.commit()?;

        let light = self.object(ObjectKind::Light, "ambient")?;
        light.set("color", Param::Vec3([1.0, 1.0, 1.0]))?;
        light.set("intensity", Param::Float(1.0))?;
        light.commit()?;

        let world = self.object(ObjectKind::World, "world")?;
        world.set_objects("instance", &[&instance])?;
        world.set_objects("light", &[&light])?;
        world.commit()?;
        Ok(world)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/scene.rs"]
mod tests;
