//! Fixed-width aligned loads and stores over contiguous memory.
//!
//! Every other component treats an `L`-wide chunk as the atomic unit of
//! transfer; widths are chosen so that `L * size_of::<T>()` is one of the
//! transaction sizes in [`WIDTH_TABLE_BYTES`].

use crate::traits::Element;

/// Byte widths of one memory transaction, scanned in descending order.
/// The 1-byte entry guarantees a terminal scalar fallback.
pub const WIDTH_TABLE_BYTES: [usize; 5] = [16, 8, 4, 2, 1];

/// Widest vectorization factor (in elements) that keeps every chunk of a
/// `dim`-element vector aligned to one table entry: the first byte width
/// that divides `dim * size_of::<T>()` wins.
pub fn vec_len<T: Element>(dim: usize) -> usize {
    let elem = std::mem::size_of::<T>();
    let bytes = dim * elem;
    for width in WIDTH_TABLE_BYTES {
        if width >= elem && bytes % width == 0 {
            return width / elem;
        }
    }
    1
}

/// A register-like chunk of `L` contiguous elements.
#[derive(Debug, Clone, Copy)]
pub struct VecChunk<T, const L: usize> {
    pub data: [T; L],
}

impl<T: Element, const L: usize> VecChunk<T, L> {
    pub fn filled(value: T) -> Self {
        Self { data: [value; L] }
    }

    /// Set all lanes to a scalar; used to zero-pad chunks that would
    /// otherwise read out of bounds.
    #[inline(always)]
    pub fn fill(&mut self, value: T) {
        self.data = [value; L];
    }

    /// Read `L` contiguous elements starting at `offset`. The caller
    /// guarantees `offset` is a multiple of `L`.
    #[inline(always)]
    pub fn load(&mut self, base: &[T], offset: usize) {
        self.data.copy_from_slice(&base[offset..offset + L]);
    }

    /// Write `L` contiguous elements starting at `offset`; symmetric to
    /// [`VecChunk::load`].
    #[inline(always)]
    pub fn store(&self, base: &mut [T], offset: usize) {
        base[offset..offset + L].copy_from_slice(&self.data);
    }

    /// Read only the first `count` lanes; the rest keep their value.
    /// Tail-masking path, used when a caller-supplied width does not divide
    /// the problem dimension.
    #[inline(always)]
    pub fn load_prefix(&mut self, base: &[T], offset: usize, count: usize) {
        let count = count.min(L);
        self.data[..count].copy_from_slice(&base[offset..offset + count]);
    }

    /// Write only the first `count` lanes.
    #[inline(always)]
    pub fn store_prefix(&self, base: &mut [T], offset: usize, count: usize) {
        let count = count.min(L);
        base[offset..offset + count].copy_from_slice(&self.data[..count]);
    }
}
