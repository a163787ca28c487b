use std::{collections::BTreeMap, sync::Arc};

use glam::{FloatExt, Vec2, Vec3, Vec4};
use rayon::prelude::*;

use super::Store;
use crate::{
    engine::{FrameBufferDesc, ObjectId, ObjectKind, Param},
    foundation::{
        core::{Dims3, ValueRange},
        error::{VolserveError, VolserveResult},
        math,
    },
    registry::palette::sample_curve,
};

const MAX_STEPS: usize = 1 << 16;
const OPAQUE_ALPHA: f32 = 0.99;
const DEFAULT_KD: Vec3 = Vec3::splat(0.8);

type Params = BTreeMap<String, Param>;

fn committed(store: &Store, id: ObjectId, kind: ObjectKind) -> VolserveResult<&Params> {
    let slot = store.slot(id)?;
    if slot.kind != kind {
        return Err(VolserveError::engine(format!(
            "handle {} is a {:?} ('{}'), expected {kind:?}",
            id.0, slot.kind, slot.type_tag
        )));
    }
    slot.committed.as_ref().ok_or_else(|| {
        VolserveError::engine(format!("{kind:?} handle {} was never committed", id.0))
    })
}

fn get<'a, T>(
    params: &'a Params,
    name: &str,
    extract: impl Fn(&'a Param) -> Option<T>,
) -> VolserveResult<Option<T>> {
    match params.get(name) {
        None => Ok(None),
        Some(p) => extract(p)
            .map(Some)
            .ok_or_else(|| VolserveError::engine(format!("parameter '{name}' has the wrong type"))),
    }
}

fn required<T>(v: VolserveResult<Option<T>>, name: &str) -> VolserveResult<T> {
    v?.ok_or_else(|| VolserveError::engine(format!("missing required parameter '{name}'")))
}

fn float(params: &Params, name: &str, default: f32) -> VolserveResult<f32> {
    Ok(get(params, name, |p| match p {
        Param::Float(v) => Some(*v),
        _ => None,
    })?
    .unwrap_or(default))
}

fn int(params: &Params, name: &str, default: i32) -> VolserveResult<i32> {
    Ok(get(params, name, |p| match p {
        Param::Int(v) => Some(*v),
        _ => None,
    })?
    .unwrap_or(default))
}

fn vec2(params: &Params, name: &str, default: Vec2) -> VolserveResult<Vec2> {
    Ok(get(params, name, |p| match p {
        Param::Vec2(v) | Param::Box1(v) => Some(Vec2::from_array(*v)),
        _ => None,
    })?
    .unwrap_or(default))
}

fn vec3(params: &Params, name: &str, default: Vec3) -> VolserveResult<Vec3> {
    Ok(get(params, name, |p| match p {
        Param::Vec3(v) => Some(Vec3::from_array(*v)),
        _ => None,
    })?
    .unwrap_or(default))
}

fn vec4(params: &Params, name: &str, default: Vec4) -> VolserveResult<Vec4> {
    Ok(get(params, name, |p| match p {
        Param::Vec4(v) => Some(Vec4::from_array(*v)),
        _ => None,
    })?
    .unwrap_or(default))
}

fn object(params: &Params, name: &str) -> VolserveResult<Option<ObjectId>> {
    get(params, name, |p| match p {
        Param::Object(id) => Some(*id),
        _ => None,
    })
}

fn objects(params: &Params, name: &str) -> VolserveResult<Vec<ObjectId>> {
    Ok(get(params, name, |p| match p {
        Param::Objects(ids) => Some(ids.clone()),
        Param::Object(id) => Some(vec![*id]),
        _ => None,
    })?
    .unwrap_or_default())
}

#[derive(Clone)]
struct Grid {
    samples: Arc<[f32]>,
    dims: Dims3,
    origin: Vec3,
    spacing: Vec3,
}

impl Grid {
    fn resolve(store: &Store, id: ObjectId) -> VolserveResult<Self> {
        let p = committed(store, id, ObjectKind::Volume)?;
        let data = required(
            get(p, "data", |p| match p {
                Param::Grid(g) => Some(g.clone()),
                _ => None,
            }),
            "data",
        )?;
        if data.samples.len() as u64 != data.dims.voxel_count() {
            return Err(VolserveError::engine(format!(
                "volume data holds {} samples, dimensions {:?} need {}",
                data.samples.len(),
                data.dims.0,
                data.dims.voxel_count()
            )));
        }
        let spacing = vec3(p, "gridSpacing", Vec3::ONE)?;
        if !spacing.is_finite() || spacing.min_element() <= 0.0 {
            return Err(VolserveError::engine("gridSpacing must be positive"));
        }
        Ok(Self {
            samples: data.samples,
            dims: data.dims,
            origin: vec3(p, "gridOrigin", Vec3::ZERO)?,
            spacing,
        })
    }

    fn upper(&self) -> Vec3 {
        let cells = Vec3::from_array(self.dims.0.map(|d| (d.max(2) - 1) as f32));
        self.origin + self.spacing * cells
    }

    fn min_spacing(&self) -> f32 {
        self.spacing.min_element()
    }

    fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.origin - 1e-6).all() && p.cmple(self.upper() + 1e-6).all()
    }

    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<(f32, f32)> {
        let hi = self.upper();
        let mut t0 = f32::NEG_INFINITY;
        let mut t1 = f32::INFINITY;
        for a in 0..3 {
            if dir[a].abs() < 1e-12 {
                if origin[a] < self.origin[a] || origin[a] > hi[a] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[a];
            let (mut near, mut far) = ((self.origin[a] - origin[a]) * inv, (hi[a] - origin[a]) * inv);
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
        }
        (t0 <= t1 && t1 >= 0.0).then_some((t0.max(0.0), t1))
    }

    fn sample(&self, p: Vec3) -> f32 {
        let mut i0 = [0u64; 3];
        let mut i1 = [0u64; 3];
        let mut f = [0f32; 3];
        for a in 0..3 {
            let d = self.dims.0[a];
            let local = ((p[a] - self.origin[a]) / self.spacing[a]).clamp(0.0, (d - 1) as f32);
            let base = (local.floor() as u64).min(d.saturating_sub(2));
            i0[a] = base;
            i1[a] = (base + 1).min(d - 1);
            f[a] = (local - base as f32).clamp(0.0, 1.0);
        }
        let at = |x: u64, y: u64, z: u64| self.samples[self.dims.index(x, y, z)];
        let c00 = FloatExt::lerp(at(i0[0], i0[1], i0[2]), at(i1[0], i0[1], i0[2]), f[0]);
        let c10 = FloatExt::lerp(at(i0[0], i1[1], i0[2]), at(i1[0], i1[1], i0[2]), f[0]);
        let c01 = FloatExt::lerp(at(i0[0], i0[1], i1[2]), at(i1[0], i0[1], i1[2]), f[0]);
        let c11 = FloatExt::lerp(at(i0[0], i1[1], i1[2]), at(i1[0], i1[1], i1[2]), f[0]);
        FloatExt::lerp(
            FloatExt::lerp(c00, c10, f[1]),
            FloatExt::lerp(c01, c11, f[1]),
            f[2],
        )
    }

    /// Central differences, one cell wide along each axis.
    fn gradient(&self, p: Vec3) -> Vec3 {
        let axis = |unit: Vec3| {
            let h = unit * self.spacing;
            (self.sample(p + h) - self.sample(p - h)) / (2.0 * h.length())
        };
        Vec3::new(axis(Vec3::X), axis(Vec3::Y), axis(Vec3::Z))
    }
}

struct TransferFn {
    colors: Vec<Vec3>,
    opacities: Arc<[f32]>,
    range: ValueRange,
}

impl TransferFn {
    fn resolve(store: &Store, id: ObjectId) -> VolserveResult<Self> {
        let p = committed(store, id, ObjectKind::TransferFunction)?;
        let colors = required(
            get(p, "color", |p| match p {
                Param::Vec3s(v) => Some(Arc::clone(v)),
                _ => None,
            }),
            "color",
        )?;
        let opacities = required(
            get(p, "opacity", |p| match p {
                Param::Floats(v) => Some(Arc::clone(v)),
                _ => None,
            }),
            "opacity",
        )?;
        if colors.is_empty() || opacities.is_empty() {
            return Err(VolserveError::engine(
                "transfer function color and opacity must be non-empty",
            ));
        }
        let value = vec2(p, "value", Vec2::new(0.0, 1.0))?;
        let range = ValueRange::new(value.x, value.y)
            .map_err(|e| VolserveError::engine(e.to_string()))?;
        Ok(Self {
            colors: colors.iter().copied().map(Vec3::from_array).collect(),
            opacities,
            range,
        })
    }

    fn eval(&self, v: f32) -> (Vec3, f32) {
        let t = self.range.normalize(v);
        (
            sample_curve(&self.colors, t, Vec3::lerp),
            sample_curve(&self.opacities, t, <f32 as FloatExt>::lerp).clamp(0.0, 1.0),
        )
    }
}

struct VolumeModel {
    grid: Grid,
    tf: TransferFn,
}

struct Surface {
    grid: Grid,
    isovalues: Arc<[f32]>,
    kd: Vec3,
}

struct CameraParams {
    position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    tan_half_fovy: f32,
    image_start: Vec2,
    image_end: Vec2,
}

impl CameraParams {
    fn resolve(store: &Store, id: ObjectId) -> VolserveResult<Self> {
        let p = committed(store, id, ObjectKind::Camera)?;
        let forward = vec3(p, "direction", Vec3::Z)?
            .try_normalize()
            .ok_or_else(|| VolserveError::engine("camera direction must be non-zero"))?;
        let right = forward
            .cross(vec3(p, "up", Vec3::Y)?)
            .try_normalize()
            .ok_or_else(|| VolserveError::engine("camera up must not be parallel to direction"))?;
        let fovy = float(p, "fovy", 60.0)?;
        Ok(Self {
            position: vec3(p, "position", Vec3::ZERO)?,
            forward,
            right,
            up: right.cross(forward),
            tan_half_fovy: (fovy.to_radians() * 0.5).tan(),
            image_start: vec2(p, "imageStart", Vec2::ZERO)?,
            image_end: vec2(p, "imageEnd", Vec2::ONE)?,
        })
    }

    /// Ray direction through normalized frame coordinates, `t = 0` at the bottom edge.
    /// The image plane is square; `imageStart`/`imageEnd` select the visible region.
    fn ray(&self, s: f32, t: f32) -> Vec3 {
        let uv = self.image_start + (self.image_end - self.image_start) * Vec2::new(s, t);
        let plane = (2.0 * uv - Vec2::ONE) * self.tan_half_fovy;
        (self.forward + self.right * plane.x + self.up * plane.y)
            .try_normalize()
            .unwrap_or(self.forward)
    }
}

pub(super) struct Scene {
    camera: CameraParams,
    background: Vec4,
    pixel_samples: u32,
    step: f32,
    step_ratio: f32,
    ambient: Vec3,
    volumes: Vec<VolumeModel>,
    surfaces: Vec<Surface>,
}

impl Scene {
    pub(super) fn resolve(
        store: &Store,
        renderer: ObjectId,
        camera: ObjectId,
        world: ObjectId,
    ) -> VolserveResult<Self> {
        let r = committed(store, renderer, ObjectKind::Renderer)?;
        let background = vec4(r, "backgroundColor", Vec4::ZERO)?;
        let pixel_samples = int(r, "pixelSamples", 1)?.max(1) as u32;
        let sampling_rate = float(r, "volumeSamplingRate", 1.0)?;
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(VolserveError::engine("volumeSamplingRate must be positive"));
        }

        let camera = CameraParams::resolve(store, camera)?;

        let w = committed(store, world, ObjectKind::World)?;
        let mut volumes = Vec::new();
        let mut surfaces = Vec::new();
        for inst in objects(w, "instance")? {
            let ip = committed(store, inst, ObjectKind::Instance)?;
            let group = required(object(ip, "group"), "group")?;
            let gp = committed(store, group, ObjectKind::Group)?;

            for model in objects(gp, "volume")? {
                let mp = committed(store, model, ObjectKind::VolumetricModel)?;
                let vol = required(object(mp, "volume"), "volume")?;
                let tf = required(object(mp, "transferFunction"), "transferFunction")?;
                volumes.push(VolumeModel {
                    grid: Grid::resolve(store, vol)?,
                    tf: TransferFn::resolve(store, tf)?,
                });
            }

            for model in objects(gp, "geometry")? {
                let mp = committed(store, model, ObjectKind::GeometricModel)?;
                let geom = required(object(mp, "geometry"), "geometry")?;
                let kd = match object(mp, "material")? {
                    Some(m) => vec3(committed(store, m, ObjectKind::Material)?, "kd", DEFAULT_KD)?,
                    None => DEFAULT_KD,
                };
                let geo = committed(store, geom, ObjectKind::Geometry)?;
                let vol = required(object(geo, "volume"), "volume")?;
                let isovalues = required(
                    get(geo, "isovalue", |p| match p {
                        Param::Floats(v) => Some(Arc::clone(v)),
                        Param::Float(v) => Some(Arc::from([*v])),
                        _ => None,
                    }),
                    "isovalue",
                )?;
                surfaces.push(Surface {
                    grid: Grid::resolve(store, vol)?,
                    isovalues,
                    kd,
                });
            }
        }

        let mut ambient = Vec3::ZERO;
        let lights = objects(w, "light")?;
        for light in &lights {
            let lp = committed(store, *light, ObjectKind::Light)?;
            ambient += vec3(lp, "color", Vec3::ONE)? * float(lp, "intensity", 1.0)?;
        }
        if lights.is_empty() {
            ambient = Vec3::ONE;
        }

        let base_step = volumes
            .iter()
            .map(|v| v.grid.min_spacing())
            .chain(surfaces.iter().map(|s| s.grid.min_spacing()))
            .fold(f32::INFINITY, f32::min);

        Ok(Self {
            camera,
            background,
            pixel_samples,
            step: base_step / sampling_rate,
            step_ratio: 1.0 / sampling_rate,
            ambient,
            volumes,
            surfaces,
        })
    }

    pub(super) fn render(&self, desc: FrameBufferDesc) -> Vec<u8> {
        let w = desc.width as usize;
        let h = desc.height as usize;
        let mut out = vec![0u8; desc.byte_len()];

        out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let c = self.shade_pixel(x, y, w, h);
                for (dst, v) in px.iter_mut().zip(c.to_array()) {
                    *dst = math::unorm_to_u8(v);
                }
            }
        });

        out
    }

    fn shade_pixel(&self, x: usize, y: usize, w: usize, h: usize) -> Vec4 {
        let n = self.pixel_samples;
        let mut acc = Vec4::ZERO;
        for k in 0..n {
            let ox = (k as f32 + 0.5) / n as f32;
            let oy = (((k * 5 + 1) % n) as f32 + 0.5) / n as f32;
            let s = (x as f32 + ox) / w as f32;
            let t = 1.0 - (y as f32 + oy) / h as f32;
            let dir = self.camera.ray(s, t);
            let c = self.trace(self.camera.position, dir);
            acc += c + (1.0 - c.w) * self.background;
        }
        acc / n as f32
    }

    /// Front-to-back compositing along one ray. Returns premultiplied color and alpha.
    fn trace(&self, origin: Vec3, dir: Vec3) -> Vec4 {
        let mut t_near = f32::INFINITY;
        let mut t_far = f32::NEG_INFINITY;
        for grid in self
            .volumes
            .iter()
            .map(|v| &v.grid)
            .chain(self.surfaces.iter().map(|s| &s.grid))
        {
            if let Some((a, b)) = grid.intersect(origin, dir) {
                t_near = t_near.min(a);
                t_far = t_far.max(b);
            }
        }
        if t_near > t_far || !self.step.is_finite() || self.step <= 0.0 {
            return Vec4::ZERO;
        }

        let mut color = Vec3::ZERO;
        let mut alpha = 0f32;
        let mut prev: Vec<Option<f32>> = vec![None; self.surfaces.len()];
        let mut t = t_near;

        for _ in 0..MAX_STEPS {
            if t > t_far {
                break;
            }
            let p = origin + dir * t;

            for (i, s) in self.surfaces.iter().enumerate() {
                if !s.grid.contains(p) {
                    prev[i] = None;
                    continue;
                }
                let v = s.grid.sample(p);
                if let Some(pv) = prev[i]
                    && let Some(iso) = s.isovalues.iter().copied().find(|iso| crosses(pv, v, *iso))
                {
                    let frac = ((iso - pv) / (v - pv)).clamp(0.0, 1.0);
                    let hit = origin + dir * (t - self.step * (1.0 - frac));
                    let shade = self.shade_surface(s, hit, dir);
                    return (color + (1.0 - alpha) * shade).extend(1.0);
                }
                prev[i] = Some(v);
            }

            for vm in &self.volumes {
                if !vm.grid.contains(p) {
                    continue;
                }
                let (c, a) = vm.tf.eval(vm.grid.sample(p));
                let a = 1.0 - (1.0 - a).powf(self.step_ratio);
                let inv = 1.0 - alpha;
                color += inv * a * c;
                alpha += inv * a;
            }

            if alpha >= OPAQUE_ALPHA {
                break;
            }
            t += self.step;
        }

        color.extend(alpha)
    }

    fn shade_surface(&self, s: &Surface, p: Vec3, dir: Vec3) -> Vec3 {
        let n = s.grid.gradient(p).try_normalize().unwrap_or(-dir);
        let k = 0.3 + 0.7 * n.dot(dir).abs();
        (s.kd * self.ambient * k).clamp(Vec3::ZERO, Vec3::ONE)
    }
}

fn crosses(a: f32, b: f32, iso: f32) -> bool {
    (a < iso && b >= iso) || (a >= iso && b < iso)
}
