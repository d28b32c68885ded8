// ============================================================================
// DENSE KERNELS
// Strided sgemm over flat f32 buffers + SIMD-friendly slice helpers.
// ============================================================================

/// Where a logical `rows x cols` matrix lives inside a flat buffer.
///
/// Transposes and per-timestep slices of `(batch, time, dim)` tensors are
/// just different strides over the same storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub offset: usize,
    pub row_stride: usize,
    pub col_stride: usize,
}

impl Layout {
    /// Dense row-major matrix with `cols` columns.
    pub fn row_major(cols: usize) -> Self {
        Layout { offset: 0, row_stride: cols, col_stride: 1 }
    }

    /// Transpose of a dense row-major matrix stored with `stored_cols` columns.
    pub fn transposed(stored_cols: usize) -> Self {
        Layout { offset: 0, row_stride: 1, col_stride: stored_cols }
    }

    /// One past the largest index touched by a `rows x cols` access.
    fn extent(&self, rows: usize, cols: usize) -> usize {
        if rows == 0 || cols == 0 {
            return 0;
        }
        self.offset + (rows - 1) * self.row_stride + (cols - 1) * self.col_stride + 1
    }
}

/// `C = alpha * A[m,k] @ B[k,n] + beta * C[m,n]` with arbitrary strides.
///
/// Panics if a layout reaches outside its buffer; callers derive layouts
/// from already validated tensor shapes.
#[allow(clippy::too_many_arguments)]
pub fn sgemm(
    m: usize, k: usize, n: usize,
    alpha: f32,
    a: &[f32], la: Layout,
    b: &[f32], lb: Layout,
    beta: f32,
    c: &mut [f32], lc: Layout,
) {
    if m == 0 || n == 0 {
        return;
    }
    assert!(la.extent(m, k) <= a.len(), "sgemm: A {m}x{k} {la:?} exceeds {}", a.len());
    assert!(lb.extent(k, n) <= b.len(), "sgemm: B {k}x{n} {lb:?} exceeds {}", b.len());
    assert!(lc.extent(m, n) <= c.len(), "sgemm: C {m}x{n} {lc:?} exceeds {}", c.len());
    assert!(lc.col_stride > 0 && lc.row_stride >= n * lc.col_stride, "sgemm: C layout aliases");

    // SAFETY: every element read or written lies within the asserted extents,
    // and the C layout maps distinct (row, col) pairs to distinct elements.
    unsafe {
        matrixmultiply::sgemm(
            m, k, n,
            alpha,
            a.as_ptr().add(la.offset), la.row_stride as isize, la.col_stride as isize,
            b.as_ptr().add(lb.offset), lb.row_stride as isize, lb.col_stride as isize,
            beta,
            c.as_mut_ptr().add(lc.offset), lc.row_stride as isize, lc.col_stride as isize,
        );
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn vec_add_inplace(a: &mut [f32], b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter_mut().zip(b.iter()) { *x += y; }
}

#[inline]
pub fn vec_scale_inplace(a: &mut [f32], s: f32) {
    for x in a.iter_mut() { *x *= s; }
}

#[inline]
pub fn vec_max(a: &[f32]) -> f32 {
    a.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
}

/// Sum of squares, accumulated in f64.
#[inline]
pub fn sum_squares(a: &[f32]) -> f64 {
    a.iter().map(|&x| (x as f64) * (x as f64)).sum()
}

/// Adds every `cols`-wide row of `rows` into `acc`.
#[inline]
pub fn add_row_sums(acc: &mut [f32], rows: &[f32], cols: usize) {
    debug_assert_eq!(acc.len(), cols);
    for row in rows.chunks_exact(cols) {
        vec_add_inplace(acc, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgemm_row_major_product() {
        // [2,3] @ [3,2]
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut c = [0.0; 4];
        sgemm(2, 3, 2, 1.0, &a, Layout::row_major(3), &b, Layout::row_major(2), 0.0, &mut c, Layout::row_major(2));
        assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn sgemm_transposed_views_and_accumulate() {
        // A^T @ B where A is stored [2,3]: result [3,2]
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [1.0, 0.0, 0.0, 1.0];
        let mut c = [1.0; 6];
        sgemm(3, 2, 2, 1.0, &a, Layout::transposed(3), &b, Layout::row_major(2), 1.0, &mut c, Layout::row_major(2));
        assert_eq!(c, [2.0, 5.0, 3.0, 6.0, 4.0, 7.0]);
    }

    #[test]
    fn sgemm_strided_timestep_slice() {
        // (batch=2, time=2, dim=2); take t=1 rows and multiply by identity
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let eye = [1.0, 0.0, 0.0, 1.0];
        let mut out = [0.0; 4];
        let lx = Layout { offset: 2, row_stride: 4, col_stride: 1 };
        sgemm(2, 2, 2, 1.0, &x, lx, &eye, Layout::row_major(2), 0.0, &mut out, Layout::row_major(2));
        assert_eq!(out, [3.0, 4.0, 7.0, 8.0]);
    }

    #[test]
    #[should_panic(expected = "sgemm: A")]
    fn sgemm_rejects_out_of_bounds_layout() {
        let a = [0.0; 3];
        let b = [0.0; 4];
        let mut c = [0.0; 4];
        sgemm(2, 2, 2, 1.0, &a, Layout::row_major(2), &b, Layout::row_major(2), 0.0, &mut c, Layout::row_major(2));
    }

    #[test]
    fn row_sums_accumulate() {
        let mut acc = [1.0, 1.0];
        add_row_sums(&mut acc, &[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(acc, [5.0, 7.0]);
    }
}
