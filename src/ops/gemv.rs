//! Batched small-matrix GEMV, CPU backend.
//!
//! Computes `y_b = epilogue(alpha * A_b * x_b + beta * z_b)` for a batch of
//! independent systems sharing `(m, n)` and the scalars. One execution
//! group owns one batch element; groups run in parallel under rayon and
//! never share state. Within a group, the columns are spread chunk-wise
//! across lanes and every row becomes one group-wide dot-product reduction.
//!
//! This works well when each matrix in the batch is small enough for a
//! single group; there is no multi-group tiling.

use rayon::prelude::*;

use crate::error::{LaunchError, LaunchResult};
use crate::reduce::{dot_product, ReduceScratch};
use crate::traits::Element;
use crate::vectorized::{vec_len, VecChunk};

/// Lane limit for one execution group, mirroring the device limits the GPU
/// backends enforce at launch.
pub const MAX_LANES_PER_GROUP: usize = 1024;

/// On-chip scratch budget per group.
pub const MAX_SCRATCH_BYTES: usize = 48 * 1024;

/// Batched GEMV with the identity epilogue.
///
/// `y`/`z` are `batch_size * m` elements, `x` is `batch_size * n`, `a` is
/// `batch_size * m * n` row-major matrices. `z` may be `None` whenever
/// `beta == 0`; it is never dereferenced in that case.
#[allow(clippy::too_many_arguments)]
pub fn batched_gemv<T: Element>(
    y: &mut [T],
    a: &[T],
    x: &[T],
    z: Option<&[T]>,
    alpha: T,
    beta: T,
    m: usize,
    n: usize,
    batch_size: usize,
) -> LaunchResult<()> {
    batched_gemv_with(y, a, x, z, alpha, beta, m, n, batch_size, |v, _| v)
}

/// Batched GEMV with a caller-supplied epilogue applied to every output
/// element before it is stored. The epilogue receives the flat output index
/// `b * m + i` and must be insensitive to call order.
#[allow(clippy::too_many_arguments)]
pub fn batched_gemv_with<T, F>(
    y: &mut [T],
    a: &[T],
    x: &[T],
    z: Option<&[T]>,
    alpha: T,
    beta: T,
    m: usize,
    n: usize,
    batch_size: usize,
    epilogue: F,
) -> LaunchResult<()>
where
    T: Element,
    F: Fn(T, usize) -> T + Sync,
{
    validate(
        y.len(),
        a.len(),
        x.len(),
        z.map(<[T]>::len),
        beta == T::ZERO,
        m,
        n,
        batch_size,
    )?;
    let vec_ax = vec_len::<T>(n);
    let vec_y = vec_len::<T>(m);
    dispatch_ax(
        vec_ax,
        vec_y,
        GemvArgs {
            y,
            a,
            x,
            z,
            alpha,
            beta,
            m,
            n,
            epilogue: &epilogue,
        },
    )
}

/// Shared precondition checks, also used by the wgpu backend.
#[allow(clippy::too_many_arguments)]
pub(crate) fn validate(
    y_len: usize,
    a_len: usize,
    x_len: usize,
    z_len: Option<usize>,
    beta_is_zero: bool,
    m: usize,
    n: usize,
    batch_size: usize,
) -> LaunchResult<()> {
    if m == 0 || n == 0 || batch_size == 0 {
        return Err(LaunchError::InvalidConfig(format!(
            "dimensions must be non-zero, got m={m} n={n} batch_size={batch_size}"
        )));
    }
    let a_expected = batch_size
        .checked_mul(m)
        .and_then(|v| v.checked_mul(n))
        .ok_or_else(|| LaunchError::InvalidConfig("matrix size overflow".into()))?;
    if a_len != a_expected {
        return Err(LaunchError::InvalidConfig(format!(
            "A has {a_len} elements, expected {a_expected}"
        )));
    }
    if x_len != batch_size * n {
        return Err(LaunchError::InvalidConfig(format!(
            "x has {x_len} elements, expected {}",
            batch_size * n
        )));
    }
    if y_len != batch_size * m {
        return Err(LaunchError::InvalidConfig(format!(
            "y has {y_len} elements, expected {}",
            batch_size * m
        )));
    }
    match z_len {
        Some(len) if len != batch_size * m => Err(LaunchError::InvalidConfig(format!(
            "z has {len} elements, expected {}",
            batch_size * m
        ))),
        None if !beta_is_zero => Err(LaunchError::InvalidConfig(
            "beta is non-zero but no z vector was supplied".into(),
        )),
        _ => Ok(()),
    }
}

struct GemvArgs<'a, T, F> {
    y: &'a mut [T],
    a: &'a [T],
    x: &'a [T],
    z: Option<&'a [T]>,
    alpha: T,
    beta: T,
    m: usize,
    n: usize,
    epilogue: &'a F,
}

fn dispatch_ax<T, F>(vec_ax: usize, vec_y: usize, args: GemvArgs<'_, T, F>) -> LaunchResult<()>
where
    T: Element,
    F: Fn(T, usize) -> T + Sync,
{
    match vec_ax {
        16 => dispatch_y::<T, 16, F>(vec_y, args),
        8 => dispatch_y::<T, 8, F>(vec_y, args),
        4 => dispatch_y::<T, 4, F>(vec_y, args),
        2 => dispatch_y::<T, 2, F>(vec_y, args),
        _ => dispatch_y::<T, 1, F>(vec_y, args),
    }
}

fn dispatch_y<T, const AX: usize, F>(vec_y: usize, args: GemvArgs<'_, T, F>) -> LaunchResult<()>
where
    T: Element,
    F: Fn(T, usize) -> T + Sync,
{
    match vec_y {
        16 => launch::<T, AX, 16, F>(args),
        8 => launch::<T, AX, 8, F>(args),
        4 => launch::<T, AX, 4, F>(args),
        2 => launch::<T, AX, 2, F>(args),
        _ => launch::<T, AX, 1, F>(args),
    }
}

fn launch<T, const AX: usize, const Y: usize, F>(args: GemvArgs<'_, T, F>) -> LaunchResult<()>
where
    T: Element,
    F: Fn(T, usize) -> T + Sync,
{
    let GemvArgs {
        y,
        a,
        x,
        z,
        alpha,
        beta,
        m,
        n,
        epilogue,
    } = args;

    let lanes = n.div_ceil(AX);
    if lanes > MAX_LANES_PER_GROUP {
        return Err(LaunchError::TooManyLanes {
            required: lanes,
            limit: MAX_LANES_PER_GROUP,
        });
    }
    let scratch_bytes = ReduceScratch::<T>::required_bytes(lanes, false);
    if scratch_bytes > MAX_SCRATCH_BYTES {
        return Err(LaunchError::ScratchOverflow {
            required: scratch_bytes,
            limit: MAX_SCRATCH_BYTES,
        });
    }

    y.par_chunks_mut(m).enumerate().for_each(|(b, y_b)| {
        let a_b = &a[b * m * n..(b + 1) * m * n];
        let x_b = &x[b * n..(b + 1) * n];
        let z_b = z.map(|z| &z[b * m..(b + 1) * m]);
        gemv_group::<T, AX, Y, F>(y_b, a_b, x_b, z_b, alpha, beta, m, n, b * m, lanes, epilogue);
    });
    Ok(())
}

/// Kernel body for one execution group (one batch element).
#[allow(clippy::too_many_arguments)]
fn gemv_group<T, const AX: usize, const Y: usize, F>(
    y_b: &mut [T],
    a_b: &[T],
    x_b: &[T],
    z_b: Option<&[T]>,
    alpha: T,
    beta: T,
    m: usize,
    n: usize,
    out_base: usize,
    lanes: usize,
    epilogue: &F,
) where
    T: Element,
    F: Fn(T, usize) -> T + Sync,
{
    // Group-lifetime state: the reduction scratch and the per-lane chunk
    // registers. Nothing is allocated past this point.
    let mut scratch = ReduceScratch::<T>::new(lanes, false);
    let mut x_chunks = vec![VecChunk::<T, AX>::filled(T::ZERO); lanes];
    let mut a_chunks = vec![VecChunk::<T, AX>::filled(T::ZERO); lanes];

    // Load x once; columns at or past n stay zero-filled and are never read.
    for (lane, chunk) in x_chunks.iter_mut().enumerate() {
        let col = lane * AX;
        if col + AX <= n {
            chunk.load(x_b, col);
        } else if col < n {
            chunk.load_prefix(x_b, col, n - col);
        }
    }

    let mut y_chunk = VecChunk::<T, Y>::filled(T::ZERO);
    let mut z_chunk = VecChunk::<T, Y>::filled(T::ZERO);
    let mut i = 0;
    while i < m {
        // Sub-rows past m are masked out, never read or written.
        let rows = Y.min(m - i);
        for j in 0..rows {
            let row_off = (i + j) * n;
            for (lane, chunk) in a_chunks.iter_mut().enumerate() {
                let col = lane * AX;
                chunk.fill(T::ZERO);
                if col + AX <= n {
                    chunk.load(a_b, row_off + col);
                } else if col < n {
                    chunk.load_prefix(a_b, row_off + col, n - col);
                }
            }
            // The scratch region is reused by the next sub-row's reduction.
            y_chunk.data[j] = dot_product(&a_chunks, &x_chunks, n, &mut scratch, false);
        }

        // Lane 0 alone reads z and performs the group's only y write.
        z_chunk.fill(T::ZERO);
        if beta != T::ZERO {
            if let Some(z_b) = z_b {
                if rows == Y {
                    z_chunk.load(z_b, i);
                } else {
                    z_chunk.load_prefix(z_b, i, rows);
                }
            }
        }
        for j in 0..rows {
            let value = alpha * y_chunk.data[j] + beta * z_chunk.data[j];
            y_chunk.data[j] = epilogue(value, out_base + i + j);
        }
        if rows == Y {
            y_chunk.store(y_b, i);
        } else {
            y_chunk.store_prefix(y_b, i, rows);
        }
        i += Y;
    }
}
