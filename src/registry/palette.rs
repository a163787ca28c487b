use std::{collections::BTreeMap, sync::Arc};

use crate::foundation::{
    core::Vec3,
    error::{VolserveError, VolserveResult},
};

/// Ordered RGB control points, evenly spaced over the transfer function domain.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorCurve {
    points: Arc<[Vec3]>,
}

impl ColorCurve {
    pub fn new(points: Vec<Vec3>) -> VolserveResult<Self> {
        if points.is_empty() {
            return Err(VolserveError::validation("color curve must be non-empty"));
        }
        if points.iter().flatten().any(|c| !c.is_finite()) {
            return Err(VolserveError::validation(
                "color curve components must be finite",
            ));
        }
        Ok(Self {
            points: points.into(),
        })
    }

    pub fn points(&self) -> &Arc<[Vec3]> {
        &self.points
    }
}

/// Ordered opacity control points, evenly spaced over the transfer function domain.
#[derive(Clone, Debug, PartialEq)]
pub struct OpacityCurve {
    points: Arc<[f32]>,
}

impl OpacityCurve {
    pub fn new(points: Vec<f32>) -> VolserveResult<Self> {
        if points.is_empty() {
            return Err(VolserveError::validation("opacity curve must be non-empty"));
        }
        if points.iter().any(|a| !a.is_finite()) {
            return Err(VolserveError::validation("opacity values must be finite"));
        }
        Ok(Self {
            points: points.into(),
        })
    }

    pub fn points(&self) -> &Arc<[f32]> {
        &self.points
    }
}

/// Named color and opacity curves.
#[derive(Clone, Debug, Default)]
pub struct PaletteRegistry {
    colors: BTreeMap<String, ColorCurve>,
    opacities: BTreeMap<String, OpacityCurve>,
}

impl PaletteRegistry {
    pub(crate) fn new(
        colors: BTreeMap<String, ColorCurve>,
        opacities: BTreeMap<String, OpacityCurve>,
    ) -> Self {
        Self { colors, opacities }
    }

    pub fn color(&self, name: &str) -> VolserveResult<&ColorCurve> {
        self.colors
            .get(name)
            .ok_or_else(|| VolserveError::lookup(format!("unknown color map '{name}'")))
    }

    pub fn opacity(&self, name: &str) -> VolserveResult<&OpacityCurve> {
        self.opacities
            .get(name)
            .ok_or_else(|| VolserveError::lookup(format!("unknown opacity map '{name}'")))
    }

    pub fn color_names(&self) -> impl Iterator<Item = &str> {
        self.colors.keys().map(String::as_str)
    }

    pub fn opacity_names(&self) -> impl Iterator<Item = &str> {
        self.opacities.keys().map(String::as_str)
    }
}

/// Piecewise-linear sample of evenly spaced control points at `t` in `[0, 1]`.
pub(crate) fn sample_curve<T: Copy>(points: &[T], t: f32, lerp: impl Fn(T, T, f32) -> T) -> T {
    debug_assert!(!points.is_empty());
    if points.len() == 1 {
        return points[0];
    }
    let x = t.clamp(0.0, 1.0) * (points.len() - 1) as f32;
    let i = (x.floor() as usize).min(points.len() - 2);
    lerp(points[i], points[i + 1], x - i as f32)
}
