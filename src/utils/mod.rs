/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared dense-matrix and sampling helpers for the timing-array posterior.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Helpers for working with faer matrices (finiteness checks, symmetrization,
//! block placement) and small numeric conversions used across the crate.

use faer::Mat;
use num_traits::ToPrimitive;
use rand::RngExt;
use rand::rngs::StdRng;

/// Lossless-enough conversion used for counts entering floating point formulas.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

/// Replace `matrix` by `(matrix + matrixᵀ) / 2` so that mirrored entries are bit-identical.
pub fn symmetrize_in_place(matrix: &mut Mat<f64>) {
    let dim = matrix.nrows().min(matrix.ncols());
    for i in 0..dim {
        for j in (i + 1)..dim {
            let mean = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            matrix[(i, j)] = mean;
            matrix[(j, i)] = mean;
        }
    }
}

#[must_use]
pub fn column_from_slice(values: &[f64]) -> Mat<f64> {
    Mat::from_fn(values.len(), 1, |i, _| values[i])
}

/// `aᵀ b` for two matrices sharing their row dimension.
#[must_use]
pub fn transpose_times(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    a.transpose() * b
}

/// Sub-matrix built from the given row and column index lists.
#[must_use]
pub fn select_block(matrix: &Mat<f64>, rows: &[usize], cols: &[usize]) -> Mat<f64> {
    Mat::from_fn(rows.len(), cols.len(), |i, j| matrix[(rows[i], cols[j])])
}

/// Index of the entry of `values` closest to `target`, or `None` for an empty slice.
#[must_use]
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(idx, _)| idx)
}

/// Uniform index in `0..len`; `len` must be positive.
pub fn uniform_index(rng: &mut StdRng, len: usize) -> usize {
    let scaled = (rng.random::<f64>() * usize_to_f64(len)).floor();
    scaled.to_usize().unwrap_or(0).min(len.saturating_sub(1))
}

/// Uniform draw from `[low, high)`.
pub fn uniform_between(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    (high - low).mul_add(rng.random::<f64>(), low)
}

pub fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn symmetrize_makes_mirrored_entries_identical() {
        let mut matrix = Mat::from_fn(3, 3, |i, j| usize_to_f64(3 * i + j));
        symmetrize_in_place(&mut matrix);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(matrix[(i, j)].to_bits(), matrix[(j, i)].to_bits());
            }
        }
        assert_relative_eq!(matrix[(0, 1)], 2.0);
    }

    #[test]
    fn matrix_is_finite_detects_nan() {
        let matrix = Mat::from_fn(2, 1, |i, _| if i == 0 { 1.0 } else { f64::NAN });
        assert!(!matrix_is_finite(&matrix));
    }

    #[test]
    fn nearest_index_picks_closest_entry() {
        assert_eq!(nearest_index(&[1.0, 2.0, 3.0], 2.4), Some(1));
        assert_eq!(nearest_index(&[], 2.4), None);
    }

    #[test]
    fn uniform_index_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(uniform_index(&mut rng, 5) < 5);
        }
    }

    #[test]
    fn transpose_times_matches_manual_product() {
        let a = Mat::from_fn(3, 2, |i, j| usize_to_f64(i + j));
        let product = transpose_times(&a, &a);
        assert_relative_eq!(product[(0, 0)], 5.0);
        assert_relative_eq!(product[(0, 1)], 8.0);
        assert_relative_eq!(product[(1, 1)], 14.0);
    }
}
