//! End-to-end properties of the batched GEMV primitive on the CPU path.

use gemv_kernels::{
    batched_gemv, batched_gemv_with, vec_len, BackendType, Epilogue, GemvDispatcher,
};
use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rand_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

/// Scalar reference: y[b*m + i] = alpha * dot(A_b[i], x_b) + beta * z_b[i].
fn reference_gemv(
    a: &[f32],
    x: &[f32],
    z: Option<&[f32]>,
    alpha: f32,
    beta: f32,
    m: usize,
    n: usize,
    batch_size: usize,
) -> Vec<f32> {
    let mut y = vec![0.0f32; batch_size * m];
    for b in 0..batch_size {
        for i in 0..m {
            let mut dot = 0.0f32;
            for j in 0..n {
                dot += a[b * m * n + i * n + j] * x[b * n + j];
            }
            let zv = z.map_or(0.0, |z| z[b * m + i]);
            y[b * m + i] = alpha * dot + beta * zv;
        }
    }
    y
}

fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (got, want)) in actual.iter().zip(expected).enumerate() {
        let scale = want.abs().max(1.0);
        assert!(
            (got - want).abs() <= tol * scale,
            "mismatch at {i}: got {got}, expected {want}"
        );
    }
}

#[test]
fn single_element_system() {
    let mut y = vec![0.0f32];
    batched_gemv(&mut y, &[3.0], &[4.0], None, 1.0, 0.0, 1, 1, 1).unwrap();
    assert_eq!(y, vec![12.0]);
}

#[test]
fn concrete_two_by_two() {
    let a = vec![1.0f32, 2.0, 3.0, 4.0];
    let x = vec![1.0f32, 1.0];
    let mut y = vec![0.0f32; 2];
    batched_gemv(&mut y, &a, &x, None, 1.0, 0.0, 2, 2, 1).unwrap();
    assert_eq!(y, vec![3.0, 7.0]);
}

#[test]
fn alpha_zero_ignores_a_and_x() {
    let mut rng = StdRng::seed_from_u64(7);
    let (m, n, batch) = (5, 9, 3);
    let a = rand_vec(&mut rng, batch * m * n);
    let x = rand_vec(&mut rng, batch * n);
    let z = rand_vec(&mut rng, batch * m);
    let beta = 2.5f32;
    let mut y = vec![0.0f32; batch * m];
    batched_gemv(&mut y, &a, &x, Some(&z), 0.0, beta, m, n, batch).unwrap();
    let expected: Vec<f32> = z.iter().map(|v| beta * v).collect();
    assert_close(&y, &expected, 1e-6);
}

#[test]
fn beta_zero_never_needs_z() {
    let mut rng = StdRng::seed_from_u64(11);
    let (m, n, batch) = (4, 8, 2);
    let a = rand_vec(&mut rng, batch * m * n);
    let x = rand_vec(&mut rng, batch * n);
    let mut y = vec![0.0f32; batch * m];
    // No z at all: must succeed and match alpha * A x.
    batched_gemv(&mut y, &a, &x, None, 1.5, 0.0, m, n, batch).unwrap();
    let expected = reference_gemv(&a, &x, None, 1.5, 0.0, m, n, batch);
    assert_close(&y, &expected, 1e-4);
}

#[test]
fn linearity_on_random_inputs() {
    let mut rng = StdRng::seed_from_u64(42);
    for &(m, n, batch) in &[(1, 1, 1), (3, 3, 2), (8, 8, 4), (7, 13, 3), (16, 64, 2)] {
        let a = rand_vec(&mut rng, batch * m * n);
        let x = rand_vec(&mut rng, batch * n);
        let z = rand_vec(&mut rng, batch * m);
        let (alpha, beta) = (0.75f32, -1.25f32);
        let mut y = vec![0.0f32; batch * m];
        batched_gemv(&mut y, &a, &x, Some(&z), alpha, beta, m, n, batch).unwrap();
        let expected = reference_gemv(&a, &x, Some(&z), alpha, beta, m, n, batch);
        assert_close(&y, &expected, 1e-4);
    }
}

#[test]
fn batch_elements_are_independent() {
    let mut rng = StdRng::seed_from_u64(23);
    let (m, n, batch) = (6, 10, 4);
    let a = rand_vec(&mut rng, batch * m * n);
    let x = rand_vec(&mut rng, batch * n);
    let z = rand_vec(&mut rng, batch * m);
    let mut y = vec![0.0f32; batch * m];
    batched_gemv(&mut y, &a, &x, Some(&z), 1.0, 1.0, m, n, batch).unwrap();

    // Reverse the batch order of every operand; each slot's result must
    // travel with its own system.
    let perm: Vec<usize> = (0..batch).rev().collect();
    let mut a_p = vec![0.0f32; a.len()];
    let mut x_p = vec![0.0f32; x.len()];
    let mut z_p = vec![0.0f32; z.len()];
    for (dst, &src) in perm.iter().enumerate() {
        a_p[dst * m * n..(dst + 1) * m * n].copy_from_slice(&a[src * m * n..(src + 1) * m * n]);
        x_p[dst * n..(dst + 1) * n].copy_from_slice(&x[src * n..(src + 1) * n]);
        z_p[dst * m..(dst + 1) * m].copy_from_slice(&z[src * m..(src + 1) * m]);
    }
    let mut y_p = vec![0.0f32; batch * m];
    batched_gemv(&mut y_p, &a_p, &x_p, Some(&z_p), 1.0, 1.0, m, n, batch).unwrap();
    for (dst, &src) in perm.iter().enumerate() {
        assert_eq!(&y_p[dst * m..(dst + 1) * m], &y[src * m..(src + 1) * m]);
    }
}

#[test]
fn width_selection_follows_the_table() {
    // 8 f32 columns = 32 bytes: the widest transaction (16 bytes) divides.
    assert_eq!(vec_len::<f32>(8) * 4, 16);
    // 3 f32 columns = 12 bytes: must fall back to the 4-byte entry.
    assert_eq!(vec_len::<f32>(3) * 4, 4);
}

#[test]
fn closure_epilogue_clamps_negatives() {
    let mut rng = StdRng::seed_from_u64(31);
    let (m, n, batch) = (5, 7, 3);
    let a = rand_vec(&mut rng, batch * m * n);
    let x = rand_vec(&mut rng, batch * n);
    let z = rand_vec(&mut rng, batch * m);
    let mut y = vec![0.0f32; batch * m];
    batched_gemv_with(&mut y, &a, &x, Some(&z), 1.0, 1.0, m, n, batch, |v: f32, _| {
        v.max(0.0)
    })
    .unwrap();
    assert!(y.iter().all(|v| *v >= 0.0));
    // The unclamped reference must actually contain negatives for this to
    // mean anything.
    let raw = reference_gemv(&a, &x, Some(&z), 1.0, 1.0, m, n, batch);
    assert!(raw.iter().any(|v| *v < 0.0));
}

#[test]
fn epilogue_sees_flat_output_indices() {
    let (m, n, batch) = (3, 2, 2);
    let a = vec![0.0f32; batch * m * n];
    let x = vec![0.0f32; batch * n];
    let mut y = vec![0.0f32; batch * m];
    batched_gemv_with(&mut y, &a, &x, None, 1.0, 0.0, m, n, batch, |_, idx| idx as f32).unwrap();
    let expected: Vec<f32> = (0..batch * m).map(|i| i as f32).collect();
    assert_eq!(y, expected);
}

#[test]
fn dispatcher_cpu_backend_matches_reference() {
    let dispatcher = GemvDispatcher::with_backend(BackendType::Cpu).unwrap();
    assert_eq!(dispatcher.backend(), BackendType::Cpu);

    let mut rng = StdRng::seed_from_u64(57);
    let (m, n, batch) = (6, 6, 2);
    let a = rand_vec(&mut rng, batch * m * n);
    let x = rand_vec(&mut rng, batch * n);
    let z = rand_vec(&mut rng, batch * m);
    let mut y = vec![0.0f32; batch * m];
    dispatcher
        .batched_gemv(&mut y, &a, &x, Some(&z), 1.0, 1.0, m, n, batch, Epilogue::Relu)
        .unwrap();
    let expected: Vec<f32> = reference_gemv(&a, &x, Some(&z), 1.0, 1.0, m, n, batch)
        .iter()
        .map(|v| v.max(0.0))
        .collect();
    assert_close(&y, &expected, 1e-4);
}

#[test]
fn f16_small_system() {
    let a: Vec<f16> = [1.0f32, 2.0, 3.0, 4.0].iter().map(|v| f16::from_f32(*v)).collect();
    let x = vec![f16::ONE; 2];
    let mut y = vec![f16::ZERO; 2];
    batched_gemv(&mut y, &a, &x, None, f16::ONE, f16::ZERO, 2, 2, 1).unwrap();
    assert_eq!(y[0].to_f32(), 3.0);
    assert_eq!(y[1].to_f32(), 7.0);
}

#[test]
fn f64_matches_reference() {
    let mut rng = StdRng::seed_from_u64(91);
    let (m, n, batch) = (4, 6, 2);
    let a: Vec<f64> = (0..batch * m * n).map(|_| rng.gen::<f64>() - 0.5).collect();
    let x: Vec<f64> = (0..batch * n).map(|_| rng.gen::<f64>() - 0.5).collect();
    let mut y = vec![0.0f64; batch * m];
    batched_gemv(&mut y, &a, &x, None, 2.0, 0.0, m, n, batch).unwrap();
    for b in 0..batch {
        for i in 0..m {
            let dot: f64 = (0..n).map(|j| a[b * m * n + i * n + j] * x[b * n + j]).sum();
            assert!((y[b * m + i] - 2.0 * dot).abs() < 1e-12);
        }
    }
}
