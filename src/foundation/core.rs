use crate::foundation::error::{VolserveError, VolserveResult};

/// Two-component float vector.
pub type Vec2 = [f32; 2];
/// Three-component float vector.
pub type Vec3 = [f32; 3];
/// Four-component float vector.
pub type Vec4 = [f32; 4];

/// Grid dimensions of a structured volume, first dimension varying fastest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Dims3(pub [u64; 3]);

impl Dims3 {
    pub fn new(d1: u64, d2: u64, d3: u64) -> VolserveResult<Self> {
        if d1 == 0 || d2 == 0 || d3 == 0 {
            return Err(VolserveError::validation(format!(
                "volume dimensions must be non-zero, got {d1}x{d2}x{d3}"
            )));
        }
        Ok(Self([d1, d2, d3]))
    }

    pub fn voxel_count(self) -> u64 {
        self.0[0]
            .saturating_mul(self.0[1])
            .saturating_mul(self.0[2])
    }

    /// Expected size in bytes of a headerless `f32` sample file.
    pub fn f32_byte_len(self) -> u64 {
        self.voxel_count().saturating_mul(4)
    }

    pub fn index(self, x: u64, y: u64, z: u64) -> usize {
        (x + self.0[0] * (y + self.0[1] * z)) as usize
    }
}

/// Closed scalar interval `[lo, hi]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValueRange {
    pub lo: f32,
    pub hi: f32,
}

impl ValueRange {
    pub fn new(lo: f32, hi: f32) -> VolserveResult<Self> {
        if !lo.is_finite() || !hi.is_finite() {
            return Err(VolserveError::validation("value range must be finite"));
        }
        if lo > hi {
            return Err(VolserveError::validation(format!(
                "value range lo must be <= hi, got [{lo}, {hi}]"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Bit-exact identity usable inside hashed cache keys.
    pub fn key_bits(self) -> [u32; 2] {
        [self.lo.to_bits(), self.hi.to_bits()]
    }

    pub fn as_box1(self) -> Vec2 {
        [self.lo, self.hi]
    }

    /// Normalized position of `v` within the range, clamped to `[0, 1]`.
    pub fn normalize(self, v: f32) -> f32 {
        let span = self.hi - self.lo;
        if span <= 0.0 {
            return 0.0;
        }
        ((v - self.lo) / span).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
