//! Small dense linear algebra for band-space statistics
//!
//! Matrices here are d x d with d the number of selected bands, so plain
//! loops over `Array2` are all that is needed.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Per-band mean of a pixels x bands table
pub(crate) fn mean(samples: ArrayView2<'_, f64>) -> Array1<f64> {
    let n = samples.nrows() as f64;
    samples
        .columns()
        .into_iter()
        .map(|column| column.iter().fold(0.0, |acc, &v| acc + v) / n)
        .collect()
}

/// Unbiased sample covariance of a pixels x bands table.
///
/// Requires at least two samples.
pub(crate) fn covariance(samples: ArrayView2<'_, f64>, mean: ArrayView1<'_, f64>) -> Array2<f64> {
    let (n, d) = samples.dim();
    let centred: Vec<Vec<f64>> = (0..d)
        .map(|band| samples.column(band).iter().map(|&v| v - mean[band]).collect())
        .collect();
    let norm = 1.0 / (n - 1) as f64;

    Array2::from_shape_fn((d, d), |(i, j)| {
        let acc = centred[i]
            .iter()
            .zip(&centred[j])
            .fold(0.0, |acc: f64, (&a, &b)| a.mul_add(b, acc));
        acc * norm
    })
}

/// LU factorisation with partial pivoting, `P A = L U`.
///
/// `L` (unit diagonal) and `U` share one matrix.
#[derive(Debug, Clone)]
pub(crate) struct Lu {
    lu: Array2<f64>,
    perm: Vec<usize>,
}

impl Lu {
    /// Factorise a square matrix column by column.
    ///
    /// Returns `None` when a pivot is exactly zero or not finite.
    pub(crate) fn decompose(a: &Array2<f64>) -> Option<Self> {
        let n = a.nrows();
        let mut lu = a.clone();
        let mut perm: Vec<usize> = (0..n).collect();

        for j in 0..n {
            for i in 0..n {
                let kmax = i.min(j);
                let mut s = 0.0;
                for k in 0..kmax {
                    s += lu[[i, k]] * lu[[k, j]];
                }
                lu[[i, j]] -= s;
            }

            let mut p = j;
            for i in (j + 1)..n {
                if lu[[i, j]].abs() > lu[[p, j]].abs() {
                    p = i;
                }
            }
            let pivot = lu[[p, j]];
            if pivot == 0.0 || !pivot.is_finite() {
                return None;
            }
            if p != j {
                for k in 0..n {
                    lu.swap([p, k], [j, k]);
                }
                perm.swap(p, j);
            }

            let r = 1.0 / lu[[j, j]];
            for i in (j + 1)..n {
                lu[[i, j]] *= r;
            }
        }

        Some(Self { lu, perm })
    }

    /// Explicit inverse, solved one identity column at a time
    pub(crate) fn inverse(&self) -> Array2<f64> {
        let n = self.perm.len();
        let lu = &self.lu;
        let mut inv = Array2::zeros((n, n));
        let mut y = vec![0.0; n];

        for col in 0..n {
            for (i, yi) in y.iter_mut().enumerate() {
                *yi = if self.perm[i] == col { 1.0 } else { 0.0 };
            }
            for i in 0..n {
                let mut s = 0.0;
                for j in 0..i {
                    s += lu[[i, j]] * y[j];
                }
                y[i] -= s;
            }
            for i in (0..n).rev() {
                let mut s = 0.0;
                for j in (i + 1)..n {
                    s += lu[[i, j]] * y[j];
                }
                y[i] = (y[i] - s) / lu[[i, i]];
            }
            for i in 0..n {
                inv[[i, col]] = y[i];
            }
        }
        inv
    }
}

/// Quadratic form `dᵀ M d`
pub(crate) fn quadratic_form(d: &[f64], m: &Array2<f64>) -> f64 {
    let n = d.len();
    let mut q = 0.0;
    for j in 0..n {
        let mut t = 0.0;
        for i in 0..n {
            t += d[i] * m[[i, j]];
        }
        q += d[j] * t;
    }
    q
}

/// Dot product with fused multiply-add accumulation
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).fold(0.0, |acc: f64, (&x, &y)| x.mul_add(y, acc))
}

/// Lower Cholesky factor of a symmetric matrix, `None` if it is not
/// positive definite.
pub(crate) fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for j in 0..n {
        let row_j: Vec<f64> = (0..j).map(|k| l[[j, k]]).collect();
        let s = a[[j, j]] - dot(&row_j, &row_j);
        if !(s > 0.0) {
            return None;
        }
        let ljj = s.sqrt();
        l[[j, j]] = ljj;
        let r = 1.0 / ljj;
        for i in (j + 1)..n {
            let row_i: Vec<f64> = (0..j).map(|k| l[[i, k]]).collect();
            l[[i, j]] = (a[[i, j]] - dot(&row_i, &row_j)) * r;
        }
    }
    Some(l)
}

/// Inverse of a lower triangular matrix with non-zero diagonal, solved one
/// identity column at a time
pub(crate) fn lower_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::zeros((n, n));
    let mut b = vec![0.0; n];
    for col in 0..n {
        for (i, bi) in b.iter_mut().enumerate() {
            *bi = if i == col { 1.0 } else { 0.0 };
        }
        for k in 0..n {
            if b[k] != 0.0 {
                b[k] *= 1.0 / l[[k, k]];
                for i in (k + 1)..n {
                    b[i] -= b[k] * l[[i, k]];
                }
            }
        }
        for i in 0..n {
            inv[[i, col]] = b[i];
        }
    }
    inv
}

/// Upper triangular `P = L⁻ᵀ` with `P Pᵀ` the inverse of `a`, so that
/// `(x - mu)ᵀ a⁻¹ (x - mu) = |xP - muP|²`. `None` if `a` is not positive
/// definite.
pub(crate) fn precision_cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    cholesky(a).map(|l| lower_inverse(&l).reversed_axes())
}

/// Row vector times matrix column, `Σ_a x[a] m[a, col]`
pub(crate) fn dot_column(x: &[f64], m: &Array2<f64>, col: usize) -> f64 {
    x.iter()
        .enumerate()
        .fold(0.0, |acc: f64, (a, &v)| v.mul_add(m[[a, col]], acc))
}
