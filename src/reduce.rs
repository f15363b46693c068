//! Group-wide dot-product reduction over per-lane chunks.
//!
//! Each lane of an execution group holds one chunk of a matrix row and the
//! matching chunk of the shared input vector; the reducer combines the
//! per-lane partial products into a single scalar through a tree reduction
//! over a typed scratch region.

use crate::traits::Element;
use crate::vectorized::VecChunk;

/// Shared scratch for one execution group's reductions: one partial slot
/// per lane, plus one broadcast slot allocated only when the group may
/// request broadcasting. Allocated once at launch and reused for every
/// reduction the group performs.
#[derive(Debug)]
pub struct ReduceScratch<T> {
    partials: Vec<T>,
    broadcast_slot: Option<T>,
}

impl<T: Element> ReduceScratch<T> {
    pub fn new(lane_count: usize, broadcast: bool) -> Self {
        Self {
            partials: vec![T::ZERO; lane_count],
            broadcast_slot: broadcast.then_some(T::ZERO),
        }
    }

    /// Bytes of scratch a group of `lane_count` lanes needs. The broadcast
    /// slot is part of the sizing contract only when broadcasting may be
    /// requested; the batched kernel never does.
    pub fn required_bytes(lane_count: usize, broadcast: bool) -> usize {
        let slot = std::mem::size_of::<T>();
        lane_count * slot + if broadcast { slot } else { 0 }
    }

    pub fn lane_count(&self) -> usize {
        self.partials.len()
    }

    /// Last value published through the broadcast slot, if any.
    pub fn broadcast_value(&self) -> Option<T> {
        self.broadcast_slot
    }

    fn tree_reduce(&mut self) -> T {
        let lanes = self.partials.len();
        let mut stride = lanes.next_power_of_two() / 2;
        while stride > 0 {
            for lane in 0..stride {
                if lane + stride < lanes {
                    let other = self.partials[lane + stride];
                    self.partials[lane] = self.partials[lane] + other;
                }
            }
            stride /= 2;
        }
        self.partials[0]
    }
}

/// Dot product between two vectors spread chunk-wise across the lanes of a
/// group. `len` is the number of meaningful scalar elements; lanes whose
/// index range starts at or past `len` contribute zero, which the loaders
/// enforce by zero-padding rather than by masking the arithmetic.
///
/// Accumulation happens in `T`, no implicit widening. With
/// `broadcast == false` only the returned value (lane 0's view) is
/// meaningful; with `broadcast == true` the result is also published
/// through the scratch broadcast slot, which must have been sized in.
pub fn dot_product<T: Element, const L: usize>(
    a: &[VecChunk<T, L>],
    x: &[VecChunk<T, L>],
    len: usize,
    scratch: &mut ReduceScratch<T>,
    broadcast: bool,
) -> T {
    debug_assert_eq!(a.len(), x.len());
    debug_assert_eq!(a.len(), scratch.lane_count());
    debug_assert!(!broadcast || scratch.broadcast_slot.is_some());

    for (lane, (ca, cx)) in a.iter().zip(x.iter()).enumerate() {
        let mut partial = T::ZERO;
        if lane * L < len {
            for k in 0..L {
                partial = partial.mul_add(ca.data[k], cx.data[k]);
            }
        }
        scratch.partials[lane] = partial;
    }

    let dot = scratch.tree_reduce();
    if broadcast {
        scratch.broadcast_slot = Some(dot);
    }
    dot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks_of(values: &[f32]) -> Vec<VecChunk<f32, 2>> {
        values
            .chunks(2)
            .map(|c| {
                let mut chunk = VecChunk::<f32, 2>::filled(0.0);
                chunk.load_prefix(c, 0, c.len());
                chunk
            })
            .collect()
    }

    #[test]
    fn reduces_across_lanes() {
        let a = chunks_of(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let x = chunks_of(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let mut scratch = ReduceScratch::new(a.len(), false);
        let dot = dot_product(&a, &x, 6, &mut scratch, false);
        assert_eq!(dot, 21.0);
    }

    #[test]
    fn non_power_of_two_lane_count() {
        // 5 lanes of 2 elements, len = 10.
        let a = chunks_of(&[1.0; 10]);
        let x = chunks_of(&[2.0; 10]);
        let mut scratch = ReduceScratch::new(5, false);
        assert_eq!(dot_product(&a, &x, 10, &mut scratch, false), 20.0);
    }

    #[test]
    fn padded_lanes_contribute_zero() {
        // len = 3: lane 1's second slot and lane 2 entirely are padding.
        let a = chunks_of(&[1.0, 1.0, 1.0]);
        let x = chunks_of(&[4.0, 5.0, 6.0]);
        let mut scratch = ReduceScratch::new(a.len(), false);
        assert_eq!(dot_product(&a, &x, 3, &mut scratch, false), 15.0);
    }

    #[test]
    fn broadcast_publishes_through_slot() {
        let a = chunks_of(&[2.0, 2.0]);
        let x = chunks_of(&[3.0, 4.0]);
        let mut scratch = ReduceScratch::new(1, true);
        let dot = dot_product(&a, &x, 2, &mut scratch, true);
        assert_eq!(dot, 14.0);
        assert_eq!(scratch.broadcast_value(), Some(14.0));
    }

    #[test]
    fn scratch_sizing_contract() {
        assert_eq!(ReduceScratch::<f32>::required_bytes(8, false), 32);
        assert_eq!(ReduceScratch::<f32>::required_bytes(8, true), 36);
        assert_eq!(ReduceScratch::<f64>::required_bytes(4, true), 40);
    }
}
