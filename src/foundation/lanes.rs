use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Number of lanes processed together by one engine pass.
pub const VEC_WIDTH: usize = 8;

/// Bit pattern stored for a `true` boolean lane.
pub(crate) const TRUE_BITS: u32 = u32::MAX;

/// One vector-width register: a lane-wise bit pattern.
///
/// The same storage is read as `f32`, `i32` or `u32` depending on the instruction that
/// consumes it. Views reinterpret bits; they never convert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Value([u32; VEC_WIDTH]);

impl Value {
    /// All lanes zero (`0.0`, `0`, `false`).
    pub const ZERO: Self = Self([0; VEC_WIDTH]);

    /// Broadcast a raw bit pattern to every lane.
    pub const fn splat_bits(bits: u32) -> Self {
        Self([bits; VEC_WIDTH])
    }

    /// Broadcast a float to every lane.
    pub fn splat_f32(v: f32) -> Self {
        Self::splat_bits(v.to_bits())
    }

    /// Broadcast a signed integer to every lane.
    pub fn splat_i32(v: i32) -> Self {
        Self::splat_bits(v as u32)
    }

    /// Build a value from per-lane signed integers.
    pub fn from_i32s(lanes: [i32; VEC_WIDTH]) -> Self {
        Self(lanes.map(|v| v as u32))
    }

    /// Raw bits of `lane`.
    pub fn bits(self, lane: usize) -> u32 {
        self.0[lane]
    }

    /// `lane` read as a float.
    pub fn f32(self, lane: usize) -> f32 {
        f32::from_bits(self.0[lane])
    }

    /// `lane` read as a signed integer.
    pub fn i32(self, lane: usize) -> i32 {
        self.0[lane] as i32
    }

    /// `lane` read as an unsigned integer.
    pub fn u32(self, lane: usize) -> u32 {
        self.0[lane]
    }

    /// Overwrite the raw bits of `lane`.
    pub fn set_bits(&mut self, lane: usize, bits: u32) {
        self.0[lane] = bits;
    }

    /// Overwrite `lane` with a float.
    pub fn set_f32(&mut self, lane: usize, v: f32) {
        self.0[lane] = v.to_bits();
    }

    /// Lanes whose bit pattern is non-zero.
    pub fn truthy(self) -> Mask {
        Mask(self.0.map(|b| b != 0))
    }

    /// Lane-wise `if mask { a } else { b }`.
    pub fn select(mask: Mask, a: Self, b: Self) -> Self {
        let mut out = b;
        for lane in mask.active() {
            out.0[lane] = a.0[lane];
        }
        out
    }

    pub(crate) fn map_f32(self, f: impl Fn(f32) -> f32) -> Self {
        Self(self.0.map(|b| f(f32::from_bits(b)).to_bits()))
    }

    pub(crate) fn map_i32(self, f: impl Fn(i32) -> i32) -> Self {
        Self(self.0.map(|b| f(b as i32) as u32))
    }

    pub(crate) fn map_u32(self, f: impl Fn(u32) -> u32) -> Self {
        Self(self.0.map(f))
    }

    pub(crate) fn zip_f32(self, rhs: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut out = [0u32; VEC_WIDTH];
        for (lane, o) in out.iter_mut().enumerate() {
            *o = f(self.f32(lane), rhs.f32(lane)).to_bits();
        }
        Self(out)
    }

    pub(crate) fn zip_i32(self, rhs: Self, f: impl Fn(i32, i32) -> i32) -> Self {
        let mut out = [0u32; VEC_WIDTH];
        for (lane, o) in out.iter_mut().enumerate() {
            *o = f(self.i32(lane), rhs.i32(lane)) as u32;
        }
        Self(out)
    }

    pub(crate) fn zip_u32(self, rhs: Self, f: impl Fn(u32, u32) -> u32) -> Self {
        let mut out = [0u32; VEC_WIDTH];
        for (lane, o) in out.iter_mut().enumerate() {
            *o = f(self.u32(lane), rhs.u32(lane));
        }
        Self(out)
    }

    /// Lane-wise predicate producing canonical booleans (`0` / all ones).
    pub(crate) fn test(self, rhs: Self, f: impl Fn(Self, Self, usize) -> bool) -> Self {
        let mut out = [0u32; VEC_WIDTH];
        for (lane, o) in out.iter_mut().enumerate() {
            *o = if f(self, rhs, lane) { TRUE_BITS } else { 0 };
        }
        Self(out)
    }
}

/// Per-lane predicate gating side effects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mask([bool; VEC_WIDTH]);

impl Mask {
    /// Every lane active.
    pub const ALL: Self = Self([true; VEC_WIDTH]);
    /// No lane active.
    pub const NONE: Self = Self([false; VEC_WIDTH]);

    /// Build a mask from explicit lanes.
    pub const fn from_lanes(lanes: [bool; VEC_WIDTH]) -> Self {
        Self(lanes)
    }

    /// The first `n` lanes active (`lane < n`).
    pub fn first(n: usize) -> Self {
        let mut lanes = [false; VEC_WIDTH];
        for (lane, l) in lanes.iter_mut().enumerate() {
            *l = lane < n;
        }
        Self(lanes)
    }

    /// Whether `lane` is active.
    pub fn lane(self, lane: usize) -> bool {
        self.0[lane]
    }

    /// `true` when at least one lane is active.
    pub fn any(self) -> bool {
        self.0.iter().any(|&l| l)
    }

    /// Indices of active lanes, ascending.
    pub fn active(self) -> impl Iterator<Item = usize> {
        (0..VEC_WIDTH).filter(move |&lane| self.0[lane])
    }

    /// Canonical boolean register (`0` / all ones per lane).
    pub fn to_value(self) -> Value {
        Value(self.0.map(|l| if l { TRUE_BITS } else { 0 }))
    }
}

impl BitAnd for Mask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        let mut out = self;
        out &= rhs;
        out
    }
}

impl BitAndAssign for Mask {
    fn bitand_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a &= b;
        }
    }
}

impl BitOr for Mask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        let mut out = self;
        out |= rhs;
        out
    }
}

impl BitOrAssign for Mask {
    fn bitor_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a |= b;
        }
    }
}

impl Not for Mask {
    type Output = Self;

    fn not(self) -> Self {
        Self(self.0.map(|l| !l))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/lanes.rs"]
mod tests;
