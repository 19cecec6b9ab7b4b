//! Borrowed row-major matrix views and GEMM argument validation.

use crate::error::GemmError;

/// Number of addressable elements of a `rows × cols` matrix with row stride `ld`.
pub fn extent(rows: usize, cols: usize, ld: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * ld + cols
    }
}

fn check_layout(name: &str, len: usize, rows: usize, cols: usize, ld: usize) -> Result<(), GemmError> {
    if ld < cols {
        return Err(GemmError::InvalidArgument(format!(
            "leading dimension of {} ({}) is smaller than its row length ({})",
            name, ld, cols
        )));
    }
    let needed = extent(rows, cols, ld);
    if len < needed {
        return Err(GemmError::InvalidArgument(format!(
            "{} holds {} elements but a {}x{} matrix with ld={} needs {}",
            name, len, rows, cols, ld, needed
        )));
    }
    Ok(())
}

/// Read-only view of a row-major matrix owned by the caller.
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a> {
    data: &'a [f32],
    rows: usize,
    cols: usize,
    ld: usize,
}

impl<'a> MatrixView<'a> {
    pub fn new(data: &'a [f32], rows: usize, cols: usize, ld: usize) -> Result<Self, GemmError> {
        check_layout("matrix", data.len(), rows, cols, ld)?;
        Ok(Self { data, rows, cols, ld })
    }

    /// Densely packed view (`ld == cols`).
    pub fn dense(data: &'a [f32], rows: usize, cols: usize) -> Result<Self, GemmError> {
        Self::new(data, rows, cols, cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn ld(&self) -> usize {
        self.ld
    }

    pub fn extent(&self) -> usize {
        extent(self.rows, self.cols, self.ld)
    }

    /// The addressable part of the backing slice.
    pub fn as_slice(&self) -> &'a [f32] {
        &self.data[..self.extent()]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.ld + col]
    }
}

/// Mutable view of a row-major matrix owned by the caller.
#[derive(Debug)]
pub struct MatrixViewMut<'a> {
    data: &'a mut [f32],
    rows: usize,
    cols: usize,
    ld: usize,
}

impl<'a> MatrixViewMut<'a> {
    pub fn new(data: &'a mut [f32], rows: usize, cols: usize, ld: usize) -> Result<Self, GemmError> {
        check_layout("matrix", data.len(), rows, cols, ld)?;
        Ok(Self { data, rows, cols, ld })
    }

    pub fn dense(data: &'a mut [f32], rows: usize, cols: usize) -> Result<Self, GemmError> {
        Self::new(data, rows, cols, cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn ld(&self) -> usize {
        self.ld
    }

    pub fn extent(&self) -> usize {
        extent(self.rows, self.cols, self.ld)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.extent()]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        let n = self.extent();
        &mut self.data[..n]
    }

    /// Reborrow with a shorter lifetime.
    pub fn reborrow(&mut self) -> MatrixViewMut<'_> {
        MatrixViewMut { data: &mut *self.data, rows: self.rows, cols: self.cols, ld: self.ld }
    }
}

/// Problem sizes of one `C := alpha·A·B + C` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmDims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl GemmDims {
    /// Whether there is no arithmetic to perform.
    pub fn is_empty(&self) -> bool {
        self.m == 0 || self.n == 0 || self.k == 0
    }
}

/// Check that A (M×K), B (K×N) and C (M×N) agree and return the sizes.
pub fn conform(a: &MatrixView<'_>, b: &MatrixView<'_>, c: &MatrixViewMut<'_>) -> Result<GemmDims, GemmError> {
    let dims = GemmDims { m: a.rows(), n: b.cols(), k: a.cols() };
    if b.rows() != dims.k {
        return Err(GemmError::InvalidArgument(format!(
            "A is {}x{} but B has {} rows",
            a.rows(),
            a.cols(),
            b.rows()
        )));
    }
    if c.rows() != dims.m || c.cols() != dims.n {
        return Err(GemmError::InvalidArgument(format!(
            "C is {}x{} but A·B is {}x{}",
            c.rows(),
            c.cols(),
            dims.m,
            dims.n
        )));
    }
    Ok(dims)
}

/// Convert a C-style `int` size into `usize`, rejecting negatives.
pub(crate) fn non_negative(name: &str, value: i32) -> Result<usize, GemmError> {
    usize::try_from(value)
        .map_err(|_| GemmError::InvalidArgument(format!("{} must be non-negative, got {}", name, value)))
}

/// Convert a size into the kernel's `int` argument type.
pub(crate) fn kernel_int(name: &str, value: usize) -> Result<i32, GemmError> {
    i32::try_from(value)
        .map_err(|_| GemmError::InvalidArgument(format!("{} = {} does not fit the kernel's int argument", name, value)))
}
