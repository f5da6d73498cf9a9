//! Fixed white-noise precomputation.
//!
//! The white-noise covariance `N` of every pulsar is fixed for a run, so the
//! Gram matrix `TᵀN⁻¹T`, the projected data `d = TᵀN⁻¹r`, `rᵀN⁻¹r` and
//! `ln det N` are computed once and reused by every evaluation. With correlated
//! white noise, `N = D + Σ_b J_b 1_b 1_bᵀ` over disjoint epoch blocks and its
//! inverse is applied block by block with the Sherman–Morrison identity.

use std::ops::Range;

use faer::Mat;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::input::Pulsar;
use crate::utils::{column_from_slice, symmetrize_in_place, transpose_times};

#[derive(Debug, Clone)]
struct JitterBlock {
    toas: Range<usize>,
    /// `J / (1 + J Σ_b 1/σ²)`.
    beta: f64,
}

/// Inverse of a diagonal-plus-block-rank-one white-noise covariance.
#[derive(Debug, Clone)]
pub struct WhiteNoise {
    inverse_variance: Vec<f64>,
    blocks: Vec<JitterBlock>,
    log_det: f64,
}

impl WhiteNoise {
    #[must_use]
    pub fn new(pulsar: &Pulsar, use_jitter: bool) -> Self {
        let inverse_variance: Vec<f64> = pulsar
            .toa_errors
            .iter()
            .map(|sigma| 1.0 / (sigma * sigma))
            .collect();
        let mut log_det: f64 = pulsar
            .toa_errors
            .iter()
            .map(|sigma| (sigma * sigma).ln())
            .sum();

        let mut blocks = Vec::new();
        if use_jitter && let Some(jitter) = &pulsar.jitter {
            for epoch in &jitter.epochs {
                let variance = jitter.epoch_variance(epoch);
                if variance <= 0.0 {
                    continue;
                }
                let weight: f64 = inverse_variance[epoch.start..epoch.end].iter().sum();
                let denominator = variance.mul_add(weight, 1.0);
                log_det += denominator.ln();
                blocks.push(JitterBlock {
                    toas: epoch.start..epoch.end,
                    beta: variance / denominator,
                });
            }
        }

        Self {
            inverse_variance,
            blocks,
            log_det,
        }
    }

    #[must_use]
    pub const fn log_det(&self) -> f64 {
        self.log_det
    }

    /// `N⁻¹ M` for a matrix with one row per TOA.
    #[must_use]
    pub fn apply_inverse(&self, matrix: &Mat<f64>) -> Mat<f64> {
        let mut out = Mat::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
            matrix[(i, j)] * self.inverse_variance[i]
        });
        for block in &self.blocks {
            for j in 0..matrix.ncols() {
                let projection: f64 = block.toas.clone().map(|i| out[(i, j)]).sum();
                let scale = block.beta * projection;
                for i in block.toas.clone() {
                    out[(i, j)] -= scale * self.inverse_variance[i];
                }
            }
        }
        out
    }
}

/// Per-pulsar cached white-noise products.
#[derive(Debug, Clone)]
pub struct PulsarNoise {
    pub log_det_n: f64,
    /// `TᵀN⁻¹T`, exactly symmetric.
    pub gram: Mat<f64>,
    /// `d = TᵀN⁻¹r` as a column.
    pub projected: Mat<f64>,
    /// `rᵀN⁻¹r`.
    pub residual_chi2: f64,
    white: WhiteNoise,
}

impl PulsarNoise {
    #[must_use]
    pub fn compute(pulsar: &Pulsar, use_jitter: bool) -> Self {
        let white = WhiteNoise::new(pulsar, use_jitter);
        let weighted_design = white.apply_inverse(&pulsar.design);
        let mut gram = transpose_times(&pulsar.design, &weighted_design);
        symmetrize_in_place(&mut gram);
        let projection = project(&white, &pulsar.design, &pulsar.residuals);
        Self {
            log_det_n: white.log_det(),
            gram,
            projected: projection.projected,
            residual_chi2: projection.residual_chi2,
            white,
        }
    }

    /// Gaussian white-noise term `−½(ln det N + rᵀN⁻¹r)` for the given chi-square.
    #[must_use]
    pub fn white_log_likelihood(&self, residual_chi2: f64) -> f64 {
        -0.5 * (self.log_det_n + residual_chi2)
    }
}

/// Projected data for one set of residuals.
#[derive(Debug, Clone)]
pub struct ProjectedResiduals {
    pub projected: Mat<f64>,
    pub residual_chi2: f64,
}

fn project(white: &WhiteNoise, design: &Mat<f64>, residuals: &[f64]) -> ProjectedResiduals {
    let column = column_from_slice(residuals);
    let weighted = white.apply_inverse(&column);
    let projected = transpose_times(design, &weighted);
    let residual_chi2 = (0..column.nrows())
        .map(|i| column[(i, 0)] * weighted[(i, 0)])
        .sum();
    ProjectedResiduals {
        projected,
        residual_chi2,
    }
}

/// White-noise products for the whole array, in pulsar order.
#[derive(Debug, Clone)]
pub struct FixedNoiseCache {
    pulsars: Vec<PulsarNoise>,
}

impl FixedNoiseCache {
    /// Precompute every pulsar in parallel; results keep the input order.
    #[must_use]
    pub fn new(pulsars: &[Pulsar], use_jitter: bool) -> Self {
        let pulsars = (0..pulsars.len())
            .into_par_iter()
            .map(|idx| PulsarNoise::compute(&pulsars[idx], use_jitter))
            .collect();
        Self { pulsars }
    }

    #[must_use]
    pub fn pulsars(&self) -> &[PulsarNoise] {
        &self.pulsars
    }

    /// Projections of signal-subtracted residuals; the cache itself is untouched.
    #[must_use]
    pub fn reproject(&self, idx: usize, pulsar: &Pulsar, residuals: &[f64]) -> ProjectedResiduals {
        project(&self.pulsars[idx].white, &pulsar.design, residuals)
    }

    /// Sum over pulsars of the white-noise term for the cached residuals.
    #[must_use]
    pub fn white_log_likelihood(&self) -> f64 {
        self.pulsars
            .iter()
            .map(|entry| entry.white_log_likelihood(entry.residual_chi2))
            .sum()
    }
}
