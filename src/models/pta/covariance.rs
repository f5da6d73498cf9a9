/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Covariance assembly and marginal likelihood of the Fourier-domain Gaussian model.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Covariance assembly
//!
//! With reduced design `T = [M F]` (timing basis, Fourier basis), white noise
//! `N` and Fourier prior covariance `Φ`, the timing-marginalized likelihood is
//!
//! ```text
//! ln L = −½(ln det N + rᵀN⁻¹r) − ½(ln det Φ + ln det Σ) + ½ dᵀΣ⁻¹d,
//! Σ = TᵀN⁻¹T + blockdiag(0, Φ⁻¹),   d = TᵀN⁻¹r.
//! ```
//!
//! The white-noise term is added by the caller; this module assembles `Σ` and
//! returns the remaining terms. Coefficients whose prior power is zero are
//! removed from the system, which is the exact zero-variance limit.
//!
//! - **Independent regime**: `Φ` is diagonal, one small system per pulsar.
//! - **Correlated regime**: GW modes couple pulsars through per-mode
//!   `n_psr × n_psr` covariances that are inverted mode by mode before the
//!   global array-wide system is factored.

use faer::Mat;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::noise::PulsarNoise;
use crate::inference::{Infeasibility, SolveStage};
use crate::models::matrix_ops::DenseSolver;
use crate::utils::select_block;

/// Prior variances of the Fourier coefficients of every pulsar.
#[derive(Debug, Clone)]
pub struct ModePriors {
    /// Per pulsar, per mode of every block (red, DM, ephemeris), the total
    /// variance of both the cosine and the sine coefficient.
    pub diagonal: Vec<Vec<f64>>,
    /// Per GW mode, cross-pulsar covariances; only off-diagonal entries are read.
    /// `None` selects the independent regime.
    pub cross: Option<Vec<Mat<f64>>>,
}

/// Dense normal-equation system `Σ x = d` with the accompanying `ln det Φ`.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub matrix: Mat<f64>,
    pub rhs: Mat<f64>,
    pub log_det_prior: f64,
}

impl LinearSystem {
    /// `−½(ln det Φ + ln det Σ) + ½ dᵀΣ⁻¹d`.
    ///
    /// # Errors
    ///
    /// Returns `Infeasibility::NumericalSingularity` if `Σ` is not positive definite.
    pub fn marginal_log_likelihood(
        &self,
        solver: &dyn DenseSolver,
        stage: SolveStage,
    ) -> Result<f64, Infeasibility> {
        if self.matrix.nrows() == 0 {
            return Ok(-0.5 * self.log_det_prior);
        }
        let Some(factor) = solver.factor(&self.matrix) else {
            log::debug!("{} rejected the {stage}", solver.name());
            return Err(Infeasibility::NumericalSingularity { stage });
        };
        let solution = factor.solve(&self.rhs);
        let quadratic: f64 = (0..self.rhs.nrows())
            .map(|i| self.rhs[(i, 0)] * solution[(i, 0)])
            .sum();
        let value = -0.5 * (self.log_det_prior + factor.log_det()) + 0.5 * quadratic;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Infeasibility::NumericalSingularity { stage })
        }
    }
}

/// Design columns of one pulsar that stay in the system: all timing columns
/// and every Fourier coefficient with positive prior power.
#[must_use]
pub fn kept_columns(timing_columns: usize, diagonal: &[f64]) -> Vec<usize> {
    let mut kept: Vec<usize> = (0..timing_columns).collect();
    for (mode, power) in diagonal.iter().enumerate() {
        if *power > 0.0 {
            kept.push(timing_columns + 2 * mode);
            kept.push(timing_columns + 2 * mode + 1);
        }
    }
    kept
}

fn check_powers(diagonal: &[f64], pulsar: usize) -> Result<(), Infeasibility> {
    if diagonal.iter().all(|power| power.is_finite() && *power >= 0.0) {
        Ok(())
    } else {
        Err(Infeasibility::NumericalSingularity {
            stage: SolveStage::PulsarSystem { pulsar },
        })
    }
}

/// Independent-regime system of one pulsar.
///
/// # Errors
///
/// Returns `Infeasibility::NumericalSingularity` for negative or non-finite powers.
pub fn pulsar_system(
    pulsar: usize,
    noise: &PulsarNoise,
    projected: &Mat<f64>,
    timing_columns: usize,
    diagonal: &[f64],
) -> Result<(LinearSystem, Vec<usize>), Infeasibility> {
    check_powers(diagonal, pulsar)?;
    let kept = kept_columns(timing_columns, diagonal);
    let mut matrix = select_block(&noise.gram, &kept, &kept);
    let rhs = Mat::from_fn(kept.len(), 1, |i, _| projected[(kept[i], 0)]);
    let mut log_det_prior = 0.0;
    for (local, column) in kept.iter().enumerate().skip(timing_columns) {
        let power = diagonal[(column - timing_columns) / 2];
        matrix[(local, local)] += power.recip();
        log_det_prior += power.ln();
    }
    Ok((
        LinearSystem {
            matrix,
            rhs,
            log_det_prior,
        },
        kept,
    ))
}

/// Sum over pulsars of the independent-regime marginal likelihood terms.
///
/// Pulsars are evaluated in parallel and summed in pulsar order.
///
/// # Errors
///
/// Returns the first `Infeasibility` in pulsar order.
pub fn independent_log_likelihood(
    solver: &dyn DenseSolver,
    noise: &[PulsarNoise],
    projected: &[&Mat<f64>],
    timing_columns: &[usize],
    priors: &ModePriors,
) -> Result<f64, Infeasibility> {
    let terms: Vec<Result<f64, Infeasibility>> = (0..noise.len())
        .into_par_iter()
        .map(|p| {
            let (system, _) = pulsar_system(
                p,
                &noise[p],
                projected[p],
                timing_columns[p],
                &priors.diagonal[p],
            )?;
            system.marginal_log_likelihood(solver, SolveStage::PulsarSystem { pulsar: p })
        })
        .collect();
    let mut total = 0.0;
    for term in terms {
        total += term?;
    }
    Ok(total)
}

/// Array-wide system of the correlated regime.
///
/// # Errors
///
/// Returns `Infeasibility::NumericalSingularity` if a per-mode prior covariance
/// is not positive definite or powers are invalid.
pub fn global_system(
    solver: &dyn DenseSolver,
    noise: &[PulsarNoise],
    projected: &[&Mat<f64>],
    timing_columns: &[usize],
    priors: &ModePriors,
) -> Result<LinearSystem, Infeasibility> {
    let n_psr = noise.len();
    for (p, diagonal) in priors.diagonal.iter().enumerate() {
        check_powers(diagonal, p)?;
    }

    let kept: Vec<Vec<usize>> = (0..n_psr)
        .map(|p| kept_columns(timing_columns[p], &priors.diagonal[p]))
        .collect();
    let mut offsets = Vec::with_capacity(n_psr);
    let mut dim = 0;
    for columns in &kept {
        offsets.push(dim);
        dim += columns.len();
    }
    let global_index = |p: usize, column: usize| -> Option<usize> {
        kept[p]
            .binary_search(&column)
            .ok()
            .map(|local| offsets[p] + local)
    };

    let mut matrix = Mat::<f64>::zeros(dim, dim);
    let mut rhs = Mat::<f64>::zeros(dim, 1);
    for p in 0..n_psr {
        for (a, &row) in kept[p].iter().enumerate() {
            rhs[(offsets[p] + a, 0)] = projected[p][(row, 0)];
            for (b, &col) in kept[p].iter().enumerate() {
                matrix[(offsets[p] + a, offsets[p] + b)] = noise[p].gram[(row, col)];
            }
        }
    }

    let n_coupled = priors.cross.as_ref().map_or(0, Vec::len);
    let n_modes_total = priors.diagonal.first().map_or(0, Vec::len);
    let mut log_det_prior = 0.0;
    for mode in 0..n_modes_total {
        let active: Vec<usize> = (0..n_psr)
            .filter(|&p| priors.diagonal[p][mode] > 0.0)
            .collect();
        if active.is_empty() {
            continue;
        }
        let cross = priors.cross.as_ref().filter(|_| mode < n_coupled).map(|c| &c[mode]);
        let prior = Mat::from_fn(active.len(), active.len(), |a, b| {
            if a == b {
                priors.diagonal[active[a]][mode]
            } else {
                cross.map_or(0.0, |matrix| matrix[(active[a], active[b])])
            }
        });
        let stage = SolveStage::ModePrior { mode };
        let Some(factor) = solver.factor(&prior) else {
            log::debug!("{} rejected the {stage}", solver.name());
            return Err(Infeasibility::NumericalSingularity { stage });
        };
        log_det_prior += 2.0 * factor.log_det();
        let inverse = factor.inverse();
        for offset in 0..2 {
            for (a, &p) in active.iter().enumerate() {
                let Some(row) = global_index(p, timing_columns[p] + 2 * mode + offset) else {
                    continue;
                };
                for (b, &q) in active.iter().enumerate() {
                    if let Some(col) = global_index(q, timing_columns[q] + 2 * mode + offset) {
                        matrix[(row, col)] += inverse[(a, b)];
                    }
                }
            }
        }
    }

    Ok(LinearSystem {
        matrix,
        rhs,
        log_det_prior,
    })
}

/// Marginal likelihood terms for either regime.
///
/// # Errors
///
/// Returns `Infeasibility::NumericalSingularity` on any failed factorization.
pub fn marginal_log_likelihood(
    solver: &dyn DenseSolver,
    noise: &[PulsarNoise],
    projected: &[&Mat<f64>],
    timing_columns: &[usize],
    priors: &ModePriors,
) -> Result<f64, Infeasibility> {
    if priors.cross.is_none() {
        return independent_log_likelihood(solver, noise, projected, timing_columns, priors);
    }
    global_system(solver, noise, projected, timing_columns, priors)?
        .marginal_log_likelihood(solver, SolveStage::GlobalSystem)
}
