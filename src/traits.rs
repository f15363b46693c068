use std::fmt::Debug;

use half::{bf16, f16};

/// Core element trait for the GEMV kernels.
///
/// Provides a unified scalar interface across precisions (f32, f64, f16, bf16).
/// Compile-time monomorphization, zero runtime overhead.
pub trait Element:
    Debug
    + Clone
    + Copy
    + Send
    + Sync
    + Default
    + 'static
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + PartialEq
    + PartialOrd
{
    const ZERO: Self;
    const ONE: Self;

    fn from_f32(v: f32) -> Self;
    fn to_f32(self) -> f32;

    /// Fused multiply-add: `self + a * b`.
    fn mul_add(self, a: Self, b: Self) -> Self;

    fn max(self, other: Self) -> Self;

    /// Zero-cost reinterpretation as an f32 slice when `Self == f32`.
    /// Returns `None` for every other element type (callers fall back to the
    /// generic CPU path).
    fn as_f32_slice(s: &[Self]) -> Option<&[f32]>;

    /// Zero-cost reinterpretation as a mutable f32 slice when `Self == f32`.
    fn as_f32_slice_mut(s: &mut [Self]) -> Option<&mut [f32]>;
}

impl Element for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        v
    }
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        f32::mul_add(a, b, self)
    }
    #[inline(always)]
    fn max(self, other: Self) -> Self {
        f32::max(self, other)
    }

    #[inline(always)]
    fn as_f32_slice(s: &[Self]) -> Option<&[f32]> {
        Some(s)
    }
    #[inline(always)]
    fn as_f32_slice_mut(s: &mut [Self]) -> Option<&mut [f32]> {
        Some(s)
    }
}

impl Element for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        v as f64
    }
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        f64::mul_add(a, b, self)
    }
    #[inline(always)]
    fn max(self, other: Self) -> Self {
        f64::max(self, other)
    }

    #[inline(always)]
    fn as_f32_slice(_s: &[Self]) -> Option<&[f32]> {
        None
    }
    #[inline(always)]
    fn as_f32_slice_mut(_s: &mut [Self]) -> Option<&mut [f32]> {
        None
    }
}

impl Element for f16 {
    const ZERO: Self = f16::ZERO;
    const ONE: Self = f16::ONE;

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        f16::from_f32(f32::mul_add(a.to_f32(), b.to_f32(), self.to_f32()))
    }
    #[inline(always)]
    fn max(self, other: Self) -> Self {
        if self.to_f32() >= other.to_f32() {
            self
        } else {
            other
        }
    }

    #[inline(always)]
    fn as_f32_slice(_s: &[Self]) -> Option<&[f32]> {
        None
    }
    #[inline(always)]
    fn as_f32_slice_mut(_s: &mut [Self]) -> Option<&mut [f32]> {
        None
    }
}

impl Element for bf16 {
    const ZERO: Self = bf16::ZERO;
    const ONE: Self = bf16::ONE;

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }
    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        bf16::from_f32(f32::mul_add(a.to_f32(), b.to_f32(), self.to_f32()))
    }
    #[inline(always)]
    fn max(self, other: Self) -> Self {
        if self.to_f32() >= other.to_f32() {
            self
        } else {
            other
        }
    }

    #[inline(always)]
    fn as_f32_slice(_s: &[Self]) -> Option<&[f32]> {
        None
    }
    #[inline(always)]
    fn as_f32_slice_mut(_s: &mut [Self]) -> Option<&mut [f32]> {
        None
    }
}

/// Backend-portable epilogue applied to every output element before it is
/// stored. The CPU entry points additionally accept arbitrary
/// `Fn(T, usize) -> T` closures; this enum is the subset every backend can
/// specialize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Epilogue {
    #[default]
    Identity,
    /// Clamp negative values to zero.
    Relu,
    /// `v * sigmoid(v)`.
    Silu,
}

impl Epilogue {
    /// Apply the epilogue to one output element. The flat output index is
    /// accepted for signature parity with the closure form; none of the
    /// built-in epilogues depend on it.
    #[inline(always)]
    pub fn apply<T: Element>(self, value: T, _index: usize) -> T {
        match self {
            Epilogue::Identity => value,
            Epilogue::Relu => value.max(T::ZERO),
            Epilogue::Silu => {
                let v = value.to_f32();
                T::from_f32(v / (1.0 + (-v).exp()))
            }
        }
    }

    /// Discriminant handed to the WGSL kernel.
    pub(crate) fn shader_id(self) -> u32 {
        match self {
            Epilogue::Identity => 0,
            Epilogue::Relu => 1,
            Epilogue::Silu => 2,
        }
    }
}
