//! Optimal cross-correlation statistic in the reduced Fourier basis.
//!
//! For noise-only covariance `C_a` of pulsar `a` (white noise, intrinsic red
//! noise, timing model marginalized) and the GW Fourier basis `F`:
//!
//! ```text
//! X_a = Fᵀ C_a⁻¹ r_a,   Z_a = Fᵀ C_a⁻¹ F,
//! Â²  = Σ_{a<b} Γ_ab X_aᵀ φ X_b / Σ_{a<b} Γ_ab² tr(Z_a φ Z_b φ),
//! ```
//!
//! with `φ` the unit-amplitude GW power per coefficient. Both products are
//! obtained from the Woodbury form of `C_a⁻¹` using the cached Gram matrix.

use faer::Mat;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::covariance::pulsar_system;
use super::noise::PulsarNoise;
use crate::inference::{Infeasibility, SolveStage};
use crate::models::matrix_ops::DenseSolver;
use crate::utils::select_block;

/// Amplitude-squared estimate, its one-sigma uncertainty and the S/N of the cross-correlations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimalStatistic {
    pub amplitude_squared: f64,
    pub sigma: f64,
    pub snr: f64,
}

struct FilteredData {
    x: Vec<f64>,
    z: Mat<f64>,
}

fn filter_pulsar(
    solver: &dyn DenseSolver,
    pulsar: usize,
    noise: &PulsarNoise,
    projected: &Mat<f64>,
    timing_columns: usize,
    noise_diagonal: &[f64],
    gw_columns: usize,
) -> Result<FilteredData, Infeasibility> {
    let (system, kept) = pulsar_system(pulsar, noise, projected, timing_columns, noise_diagonal)?;
    let stage = SolveStage::PulsarSystem { pulsar };
    let factor = solver
        .factor(&system.matrix)
        .ok_or(Infeasibility::NumericalSingularity { stage })?;

    let gw: Vec<usize> = (timing_columns..timing_columns + gw_columns).collect();
    let cross = select_block(&noise.gram, &kept, &gw);
    let weighted_cross = factor.solve(&cross);
    let weighted_data = factor.solve(&system.rhs);

    let x = (0..gw_columns)
        .map(|i| {
            let correction: f64 = (0..kept.len())
                .map(|k| cross[(k, i)] * weighted_data[(k, 0)])
                .sum();
            projected[(gw[i], 0)] - correction
        })
        .collect();
    let z = Mat::from_fn(gw_columns, gw_columns, |i, j| {
        let correction: f64 = (0..kept.len())
            .map(|k| cross[(k, i)] * weighted_cross[(k, j)])
            .sum();
        noise.gram[(gw[i], gw[j])] - correction
    });
    Ok(FilteredData { x, z })
}

/// Optimal statistic over all distinct pulsar pairs.
///
/// `noise_diagonal` holds each pulsar's noise-only mode powers in the same
/// layout as the posterior's mode priors; `unit_power` is the GW power per
/// mode for unit amplitude and `orf` the overlap reduction matrix.
///
/// # Errors
///
/// Returns `Infeasibility::NumericalSingularity` if a noise system cannot be
/// factored or no pair carries cross-correlation weight.
pub fn optimal_statistic(
    solver: &dyn DenseSolver,
    noise: &[PulsarNoise],
    projected: &[&Mat<f64>],
    timing_columns: &[usize],
    noise_diagonal: &[Vec<f64>],
    orf: &Mat<f64>,
    unit_power: &[f64],
) -> Result<OptimalStatistic, Infeasibility> {
    let gw_columns = 2 * unit_power.len();
    let filtered: Vec<Result<FilteredData, Infeasibility>> = (0..noise.len())
        .into_par_iter()
        .map(|p| {
            filter_pulsar(
                solver,
                p,
                &noise[p],
                projected[p],
                timing_columns[p],
                &noise_diagonal[p],
                gw_columns,
            )
        })
        .collect();
    let filtered = filtered.into_iter().collect::<Result<Vec<_>, _>>()?;

    let phi: Vec<f64> = (0..gw_columns).map(|i| unit_power[i / 2]).collect();
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for a in 0..filtered.len() {
        for b in (a + 1)..filtered.len() {
            let gamma = orf[(a, b)];
            let (fa, fb) = (&filtered[a], &filtered[b]);
            let cross: f64 = (0..gw_columns).map(|i| fa.x[i] * phi[i] * fb.x[i]).sum();
            let mut trace = 0.0;
            for i in 0..gw_columns {
                for j in 0..gw_columns {
                    trace += fa.z[(i, j)] * phi[j] * fb.z[(j, i)] * phi[i];
                }
            }
            numerator += gamma * cross;
            denominator += gamma * gamma * trace;
        }
    }

    if !(denominator.is_finite() && denominator > 0.0) {
        return Err(Infeasibility::NumericalSingularity {
            stage: SolveStage::GlobalSystem,
        });
    }
    let root = denominator.sqrt();
    Ok(OptimalStatistic {
        amplitude_squared: numerator / denominator,
        sigma: root.recip(),
        snr: numerator / root,
    })
}
