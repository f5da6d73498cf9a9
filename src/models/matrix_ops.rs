//! Dense symmetric positive-definite factorizations behind a pluggable solver.
//!
//! The posterior only ever needs a Cholesky-type factor: solves against it,
//! its log-determinant, and occasionally the explicit inverse of a small
//! matrix. Two backends are provided; both reject matrices that are not
//! numerically positive definite instead of regularizing them.

use std::fmt;

use faer::linalg::solvers::{Llt as FaerLlt, Solve as FaerSolve};
use faer::{Mat, Side};

use crate::utils::{matrix_is_finite, symmetrize_in_place};

/// Capability to factor a symmetric positive-definite matrix.
pub trait DenseSolver: Send + Sync + fmt::Debug {
    /// Short backend name for logs and reports.
    fn name(&self) -> &'static str;

    /// Factor `matrix`, returning `None` if it is not numerically positive definite.
    fn factor(&self, matrix: &Mat<f64>) -> Option<CholeskyFactor>;
}

/// Lower-triangular Cholesky factor produced by a [`DenseSolver`].
pub enum CholeskyFactor {
    Native(NativeFactor),
    Faer(FaerLlt<f64>),
}

impl CholeskyFactor {
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Self::Native(native) => native.lower.nrows(),
            Self::Faer(llt) => llt.L().nrows(),
        }
    }

    /// `ln det(A) = 2 Σ ln L_ii`.
    #[must_use]
    pub fn log_det(&self) -> f64 {
        match self {
            Self::Native(native) => native.log_det,
            Self::Faer(llt) => {
                let factor = llt.L();
                2.0 * (0..factor.nrows())
                    .map(|i| factor.get(i, i).ln())
                    .sum::<f64>()
            }
        }
    }

    /// Solve `A X = rhs`.
    #[must_use]
    pub fn solve(&self, rhs: &Mat<f64>) -> Mat<f64> {
        match self {
            Self::Native(native) => {
                let mut out = rhs.clone();
                native.solve_in_place(&mut out);
                out
            }
            Self::Faer(llt) => llt.solve(rhs.as_ref()),
        }
    }

    /// Symmetrized explicit inverse.
    #[must_use]
    pub fn inverse(&self) -> Mat<f64> {
        let dim = self.dim();
        let identity = Mat::from_fn(dim, dim, |i, j| if i == j { 1.0 } else { 0.0 });
        let mut inverse = self.solve(&identity);
        symmetrize_in_place(&mut inverse);
        inverse
    }

    /// Copy of the lower-triangular factor `L` with `A = L Lᵀ`.
    #[must_use]
    pub fn lower(&self) -> Mat<f64> {
        match self {
            Self::Native(native) => native.lower.clone(),
            Self::Faer(llt) => {
                let factor = llt.L();
                Mat::from_fn(factor.nrows(), factor.ncols(), |i, j| {
                    if j <= i { *factor.get(i, j) } else { 0.0 }
                })
            }
        }
    }
}

/// Column-by-column factor that accumulates `ln det` while it pivots.
pub struct NativeFactor {
    lower: Mat<f64>,
    log_det: f64,
}

impl NativeFactor {
    /// Factor a symmetric matrix read from its lower triangle. Fails on the
    /// first pivot that is not strictly positive or on any non-finite entry.
    fn factor(matrix: &Mat<f64>) -> Option<Self> {
        let dim = matrix.nrows();
        if matrix.ncols() != dim {
            return None;
        }
        let mut lower = Mat::<f64>::zeros(dim, dim);
        let mut log_det = 0.0;
        for pivot_col in 0..dim {
            let pivot = matrix[(pivot_col, pivot_col)]
                - (0..pivot_col)
                    .map(|k| lower[(pivot_col, k)].powi(2))
                    .sum::<f64>();
            if !(pivot.is_finite() && pivot > 0.0) {
                return None;
            }
            let diag = pivot.sqrt();
            lower[(pivot_col, pivot_col)] = diag;
            log_det += pivot.ln();
            for below in (pivot_col + 1)..dim {
                let overlap: f64 = (0..pivot_col)
                    .map(|k| lower[(below, k)] * lower[(pivot_col, k)])
                    .sum();
                let entry = (matrix[(below, pivot_col)] - overlap) / diag;
                if !entry.is_finite() {
                    return None;
                }
                lower[(below, pivot_col)] = entry;
            }
        }
        Some(Self { lower, log_det })
    }

    /// Overwrite `rhs` with `A⁻¹ rhs`: `L y = b` downwards, then `Lᵀ x = y` upwards.
    fn solve_in_place(&self, rhs: &mut Mat<f64>) {
        let dim = self.lower.nrows();
        let lower = &self.lower;
        for col in 0..rhs.ncols() {
            for i in 0..dim {
                let known: f64 = (0..i).map(|k| lower[(i, k)] * rhs[(k, col)]).sum();
                rhs[(i, col)] = (rhs[(i, col)] - known) / lower[(i, i)];
            }
            for i in (0..dim).rev() {
                let known: f64 = ((i + 1)..dim).map(|k| lower[(k, i)] * rhs[(k, col)]).sum();
                rhs[(i, col)] = (rhs[(i, col)] - known) / lower[(i, i)];
            }
        }
    }
}

/// Left-looking Cholesky–Crout factorization.
#[derive(Debug, Clone, Copy, Default)]
pub struct CholeskySolver;

impl DenseSolver for CholeskySolver {
    fn name(&self) -> &'static str {
        "native-cholesky"
    }

    fn factor(&self, matrix: &Mat<f64>) -> Option<CholeskyFactor> {
        NativeFactor::factor(matrix).map(CholeskyFactor::Native)
    }
}

/// Blocked factorization from `faer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerCholeskySolver;

impl DenseSolver for FaerCholeskySolver {
    fn name(&self) -> &'static str {
        "faer-llt"
    }

    fn factor(&self, matrix: &Mat<f64>) -> Option<CholeskyFactor> {
        if matrix.nrows() != matrix.ncols() || !matrix_is_finite(matrix) {
            return None;
        }
        FaerLlt::new(matrix.as_ref(), Side::Lower)
            .ok()
            .map(CholeskyFactor::Faer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd_matrix() -> Mat<f64> {
        Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 5.0,
            (2, 2) => 6.0,
            (0, 1) | (1, 0) => 1.0,
            (1, 2) | (2, 1) => 0.5,
            _ => 0.25,
        })
    }

    #[test]
    fn cholesky_reconstructs_matrix() {
        let matrix = spd_matrix();
        let lower = CholeskySolver.factor(&matrix).expect("spd").lower();
        let rebuilt = &lower * lower.transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rebuilt[(i, j)], matrix[(i, j)], epsilon = 1.0e-12);
            }
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_and_nan() {
        let indefinite = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 2.0 });
        assert!(CholeskySolver.factor(&indefinite).is_none());
        let nan = Mat::from_fn(2, 2, |i, j| if i == j { f64::NAN } else { 0.0 });
        assert!(CholeskySolver.factor(&nan).is_none());
        let off_diagonal_nan = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { f64::NAN });
        assert!(CholeskySolver.factor(&off_diagonal_nan).is_none());
        let rectangular = Mat::<f64>::zeros(2, 3);
        assert!(CholeskySolver.factor(&rectangular).is_none());
    }

    #[test]
    fn native_log_det_matches_triangular_diagonal() {
        let matrix = spd_matrix();
        let factor = CholeskySolver.factor(&matrix).expect("spd");
        let lower = factor.lower();
        let from_diagonal: f64 = (0..3).map(|i| 2.0 * lower[(i, i)].ln()).sum();
        assert_relative_eq!(factor.log_det(), from_diagonal, epsilon = 1.0e-12);
        assert_relative_eq!(factor.log_det(), 112.9375_f64.ln(), epsilon = 1.0e-12);
    }

    #[test]
    fn backends_agree_on_solve_and_log_det() {
        let matrix = spd_matrix();
        let rhs = Mat::from_fn(3, 1, |i, _| [1.0, -2.0, 0.5][i]);
        let native = CholeskySolver.factor(&matrix).expect("native");
        let faer = FaerCholeskySolver.factor(&matrix).expect("faer");
        let x_native = native.solve(&rhs);
        let x_faer = faer.solve(&rhs);
        for i in 0..3 {
            assert_relative_eq!(x_native[(i, 0)], x_faer[(i, 0)], epsilon = 1.0e-12);
        }
        assert_relative_eq!(native.log_det(), faer.log_det(), epsilon = 1.0e-12);
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let matrix = spd_matrix();
        let inverse = CholeskySolver.factor(&matrix).expect("spd").inverse();
        let product = &matrix * &inverse;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[(i, j)], expected, epsilon = 1.0e-12);
            }
        }
    }

    #[test]
    fn faer_backend_rejects_non_positive_definite() {
        let matrix = Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.0 });
        assert!(FaerCholeskySolver.factor(&matrix).is_none());
    }
}
