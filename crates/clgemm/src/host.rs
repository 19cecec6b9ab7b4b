//! Host GEMM used when the accelerator is not ready.
//!
//! Rows of C are independent, so they are split across the rayon pool. Within
//! a row the reduction over `p` always runs in ascending order, which keeps the
//! result bit-for-bit deterministic regardless of thread count.

use rayon::prelude::*;

use crate::error::GemmError;
use crate::matrix::{conform, MatrixView, MatrixViewMut};

/// Rows per rayon task. Small problems stay on the calling thread.
const ROWS_PER_TASK: usize = 16;

/// `C := alpha·A·B + C` on the host.
pub fn gemm_nn(
    alpha: f32,
    a: &MatrixView<'_>,
    b: &MatrixView<'_>,
    c: &mut MatrixViewMut<'_>,
) -> Result<(), GemmError> {
    let dims = conform(a, b, c)?;
    if dims.is_empty() {
        return Ok(());
    }

    let ldc = c.ld();
    let n = dims.n;
    let out = c.as_mut_slice();

    if dims.m <= ROWS_PER_TASK {
        for (i, row) in out.chunks_mut(ldc).enumerate() {
            row_update(alpha, a, b, i, &mut row[..n]);
        }
    } else {
        out.par_chunks_mut(ldc)
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, row)| row_update(alpha, a, b, i, &mut row[..n]));
    }
    Ok(())
}

/// Accumulate row `i` of `alpha·A·B` into `row`.
#[inline]
fn row_update(alpha: f32, a: &MatrixView<'_>, b: &MatrixView<'_>, i: usize, row: &mut [f32]) {
    let b_data = b.as_slice();
    let ldb = b.ld();
    let n = row.len();
    for p in 0..a.cols() {
        let a_part = alpha * a.get(i, p);
        let b_row = &b_data[p * ldb..p * ldb + n];
        for (cj, &bj) in row.iter_mut().zip(b_row) {
            *cj += a_part * bj;
        }
    }
}
