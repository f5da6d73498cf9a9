//! Cross-pulsar correlation (overlap reduction) models.
//!
//! Each frequency window carries one symmetric `n_psr × n_psr` matrix. The
//! spherical-harmonic family additionally rejects coefficient sets whose sky
//! power map is negative anywhere on a fixed grid.

use std::f64::consts::PI;

use faer::Mat;

use super::sky::{HarmonicGrid, antenna_pattern};
use super::types::{CorrelationConfig, CorrelationModel, PtaError};
use crate::inference::Infeasibility;
use crate::input::SkyPosition;

/// Basis matrices `B_lm` for spherical-harmonic anisotropy, one per harmonic
/// in `l² + (m + l)` order.
#[derive(Debug, Clone)]
pub struct CorrelationBasis {
    matrices: Vec<Mat<f64>>,
}

impl CorrelationBasis {
    #[must_use]
    pub const fn new(matrices: Vec<Mat<f64>>) -> Self {
        Self { matrices }
    }

    fn check(&self, expected: usize, size: usize) -> Result<(), PtaError> {
        let well_formed = self.matrices.len() == expected
            && self.matrices.iter().all(|matrix| {
                matrix.nrows() == size
                    && matrix.ncols() == size
                    && (0..size).all(|i| (0..i).all(|j| matrix[(i, j)] == matrix[(j, i)]))
            });
        if well_formed {
            Ok(())
        } else {
            Err(PtaError::InvalidCorrelationBasis { expected, size })
        }
    }
}

/// Upper-triangular hyperspherical factor `U` with unit-norm columns; returns `UᵀU`.
///
/// `angles` holds `n(n−1)/2` values; column `j ≥ 1` consumes the next `j` angles.
#[must_use]
pub fn model_independent(angles: &[f64], n_psr: usize) -> Mat<f64> {
    let mut upper = Mat::<f64>::zeros(n_psr, n_psr);
    if n_psr == 0 {
        return upper;
    }
    upper[(0, 0)] = 1.0;
    let mut offset = 0;
    for col in 1..n_psr {
        let column_angles = &angles[offset..offset + col];
        offset += col;
        let mut sine_product = 1.0;
        for (row, angle) in column_angles.iter().enumerate() {
            upper[(row, col)] = angle.cos() * sine_product;
            sine_product *= angle.sin();
        }
        upper[(col, col)] = sine_product;
    }
    upper.transpose() * &upper
}

/// Correlations induced by a single plane-wave source, pulsar term doubling the diagonal.
#[must_use]
pub fn point_source(phi: f64, cos_theta: f64, positions: &[SkyPosition]) -> Mat<f64> {
    let theta = cos_theta.clamp(-1.0, 1.0).acos();
    let patterns: Vec<_> = positions
        .iter()
        .map(|position| antenna_pattern(phi, theta, *position))
        .collect();
    let norm = 3.0 / (8.0 * PI);
    Mat::from_fn(positions.len(), positions.len(), |i, j| {
        let value = norm
            * patterns[i]
                .plus
                .mul_add(patterns[j].plus, patterns[i].cross * patterns[j].cross);
        if i == j { 2.0 * value } else { value }
    })
}

/// Fully correlated (clock-error) matrix of ones.
#[must_use]
pub fn clock(n_psr: usize) -> Mat<f64> {
    Mat::from_fn(n_psr, n_psr, |_, _| 1.0)
}

/// `Σ_k c_k B_k`.
#[must_use]
pub fn spherical_harmonic(coefficients: &[f64], basis: &CorrelationBasis) -> Mat<f64> {
    let size = basis.matrices.first().map_or(0, Mat::nrows);
    let mut total = Mat::<f64>::zeros(size, size);
    for (c, matrix) in coefficients.iter().zip(&basis.matrices) {
        for i in 0..size {
            for j in 0..size {
                total[(i, j)] += c * matrix[(i, j)];
            }
        }
    }
    total
}

/// Correlation model resolved against a concrete array.
#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    model: CorrelationModel,
    window_count: usize,
    /// Window index of every GW mode.
    mode_window: Vec<usize>,
    positions: Vec<SkyPosition>,
    basis: Option<CorrelationBasis>,
    harmonics: Option<HarmonicGrid>,
}

impl CorrelationEngine {
    /// # Errors
    ///
    /// Returns `PtaError` for invalid windows, a missing or malformed
    /// anisotropy basis, or too few pulsars.
    pub fn new(
        config: &CorrelationConfig,
        n_modes: usize,
        positions: Vec<SkyPosition>,
        basis: Option<CorrelationBasis>,
    ) -> Result<Self, PtaError> {
        let windows = config.windows.resolve(n_modes)?;
        let mode_window = windows
            .iter()
            .enumerate()
            .flat_map(|(window, modes)| modes.clone().map(move |_| window))
            .collect();
        let mut harmonics = None;
        match config.model {
            CorrelationModel::ModelIndependent if positions.len() < 2 => {
                return Err(PtaError::TooFewPulsars);
            }
            CorrelationModel::SphericalHarmonics {
                lmax,
                physical_prior,
            } => {
                let expected = (lmax + 1) * (lmax + 1);
                basis
                    .as_ref()
                    .ok_or(PtaError::MissingCollaborator("anisotropy correlation basis"))?
                    .check(expected, positions.len())?;
                if physical_prior && lmax > 0 {
                    harmonics = Some(HarmonicGrid::new(lmax));
                }
            }
            _ => {}
        }
        Ok(Self {
            model: config.model,
            window_count: windows.len(),
            mode_window,
            positions,
            basis,
            harmonics,
        })
    }

    /// Window containing GW mode `mode`; the windows partition `0..n_modes`.
    #[must_use]
    pub fn window_of(&self, mode: usize) -> usize {
        self.mode_window[mode]
    }

    /// Number of parameters consumed per window.
    #[must_use]
    pub fn params_per_window(&self) -> usize {
        let n = self.positions.len();
        match self.model {
            CorrelationModel::ModelIndependent => n * (n - 1) / 2,
            CorrelationModel::PointSource => 2,
            CorrelationModel::SphericalHarmonics { lmax, .. } => (lmax + 1) * (lmax + 1) - 1,
            CorrelationModel::Clock => 0,
        }
    }

    /// One correlation matrix per window.
    ///
    /// # Errors
    ///
    /// Returns `Infeasibility::UnphysicalAnisotropy` if a harmonic sky map is negative.
    pub fn window_matrices(&self, params: &[f64]) -> Result<Vec<Mat<f64>>, Infeasibility> {
        let per_window = self.params_per_window();
        let n = self.positions.len();
        (0..self.window_count)
            .map(|window| {
                let values = &params[window * per_window..(window + 1) * per_window];
                match self.model {
                    CorrelationModel::ModelIndependent => Ok(model_independent(values, n)),
                    CorrelationModel::PointSource => {
                        Ok(point_source(values[0], values[1], &self.positions))
                    }
                    CorrelationModel::Clock => Ok(clock(n)),
                    CorrelationModel::SphericalHarmonics { .. } => {
                        let mut coefficients = Vec::with_capacity(per_window + 1);
                        coefficients.push(2.0 * PI.sqrt());
                        coefficients.extend_from_slice(values);
                        if let Some(grid) = &self.harmonics
                            && !grid.is_non_negative(&coefficients)
                        {
                            return Err(Infeasibility::UnphysicalAnisotropy { window });
                        }
                        Ok(self
                            .basis
                            .as_ref()
                            .map_or_else(|| Mat::zeros(n, n), |basis| {
                                spherical_harmonic(&coefficients, basis)
                            }))
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pta::sky::hellings_downs_matrix;
    use crate::models::pta::types::FrequencyWindows;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn positions() -> Vec<SkyPosition> {
        vec![
            SkyPosition::new(0.1, 0.3),
            SkyPosition::new(2.0, -0.6),
            SkyPosition::new(4.1, 1.0),
        ]
    }

    #[test]
    fn model_independent_has_unit_diagonal() {
        let orf = model_independent(&[0.4, 1.1, 2.3], 3);
        for i in 0..3 {
            assert_relative_eq!(orf[(i, i)], 1.0, epsilon = 1.0e-12);
        }
        assert_relative_eq!(orf[(0, 1)], 0.4_f64.cos(), epsilon = 1.0e-12);
        assert_eq!(orf[(0, 2)].to_bits(), orf[(2, 0)].to_bits());
    }

    #[test]
    fn right_angles_give_identity() {
        let orf = model_independent(&[FRAC_PI_2; 3], 3);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(orf[(i, j)], expected, epsilon = 1.0e-12);
            }
        }
    }

    #[test]
    fn point_source_is_symmetric_with_doubled_diagonal() {
        let orf = point_source(1.0, 0.2, &positions());
        let theta = 0.2_f64.acos();
        let pattern = antenna_pattern(1.0, theta, positions()[0]);
        let single = 3.0 / (8.0 * PI) * (pattern.plus.powi(2) + pattern.cross.powi(2));
        assert_relative_eq!(orf[(0, 0)], 2.0 * single, epsilon = 1.0e-12);
        assert_relative_eq!(orf[(0, 1)], orf[(1, 0)], epsilon = 1.0e-15);
    }

    #[test]
    fn explicit_windows_assign_every_mode() {
        let config = CorrelationConfig {
            model: CorrelationModel::Clock,
            windows: FrequencyWindows::Explicit {
                ranges: vec![[1, 1], [2, 4]],
            },
        };
        let engine = CorrelationEngine::new(&config, 4, positions(), None).expect("engine");
        let assignment: Vec<usize> = (0..4).map(|mode| engine.window_of(mode)).collect();
        assert_eq!(assignment, vec![0, 1, 1, 1]);
        assert_eq!(engine.window_matrices(&[]).expect("clock").len(), 2);
    }

    #[test]
    fn harmonic_engine_requires_basis() {
        let config = CorrelationConfig {
            model: CorrelationModel::SphericalHarmonics {
                lmax: 1,
                physical_prior: true,
            },
            windows: FrequencyWindows::Equal { count: 1 },
        };
        let result = CorrelationEngine::new(&config, 4, positions(), None);
        assert!(matches!(result, Err(PtaError::MissingCollaborator(_))));
    }

    #[test]
    fn harmonic_engine_rejects_negative_sky_and_reproduces_isotropy() {
        let hd = hellings_downs_matrix(&positions());
        let mut matrices = vec![Mat::from_fn(3, 3, |i, j| hd[(i, j)] / (2.0 * PI.sqrt()))];
        matrices.extend((0..3).map(|k| {
            Mat::from_fn(3, 3, |i, j| 0.01 * f64::from(u8::try_from(i + j + k).unwrap_or(0)))
        }));
        let config = CorrelationConfig {
            model: CorrelationModel::SphericalHarmonics {
                lmax: 1,
                physical_prior: true,
            },
            windows: FrequencyWindows::Equal { count: 2 },
        };
        let engine = CorrelationEngine::new(
            &config,
            4,
            positions(),
            Some(CorrelationBasis::new(matrices)),
        )
        .expect("engine");
        assert_eq!(engine.params_per_window(), 3);
        assert_eq!(
            (0..4).map(|mode| engine.window_of(mode)).collect::<Vec<_>>(),
            vec![0, 0, 1, 1]
        );

        let isotropic = engine.window_matrices(&[0.0; 6]).expect("physical");
        assert_relative_eq!(isotropic[1][(0, 2)], hd[(0, 2)], epsilon = 1.0e-12);

        let result = engine.window_matrices(&[0.0, 0.0, 0.0, -9.5, -9.5, -9.5]);
        assert!(matches!(
            result,
            Err(Infeasibility::UnphysicalAnisotropy { window: 1 })
        ));
    }
}
