//! Sky geometry: antenna patterns, real spherical harmonics, Hellings–Downs.

use std::f64::consts::{PI, SQRT_2, TAU};

use faer::Mat;
use statrs::function::gamma::ln_gamma;

use crate::input::SkyPosition;
use crate::utils::usize_to_f64;

/// Number of azimuth and of `cos θ` samples in the physicality grid.
pub const SKY_GRID_SIZE: usize = 40;

/// Plus and cross antenna response of one pulsar to a plane wave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntennaPattern {
    pub plus: f64,
    pub cross: f64,
}

/// Response of `pulsar` to a wave from azimuth `gw_phi` and polar angle `gw_theta`.
///
/// A pulsar exactly behind the source has no defined response; zero is returned.
#[must_use]
pub fn antenna_pattern(gw_phi: f64, gw_theta: f64, pulsar: SkyPosition) -> AntennaPattern {
    let (sin_phi, cos_phi) = gw_phi.sin_cos();
    let (sin_theta, cos_theta) = gw_theta.sin_cos();
    let m = [sin_phi, -cos_phi, 0.0];
    let n = [-cos_theta * cos_phi, -cos_theta * sin_phi, sin_theta];
    let omega = [-sin_theta * cos_phi, -sin_theta * sin_phi, -cos_theta];
    let p = pulsar.unit_vector();
    let dot = |a: [f64; 3]| a[0].mul_add(p[0], a[1].mul_add(p[1], a[2] * p[2]));

    let denominator = 1.0 + dot(omega);
    if denominator <= f64::EPSILON {
        return AntennaPattern {
            plus: 0.0,
            cross: 0.0,
        };
    }
    let m_p = dot(m);
    let n_p = dot(n);
    AntennaPattern {
        plus: 0.5 * m_p.mul_add(m_p, -n_p * n_p) / denominator,
        cross: m_p * n_p / denominator,
    }
}

/// Associated Legendre function `P_l^m(x)` including the Condon–Shortley phase.
#[must_use]
pub fn associated_legendre(l: usize, m: usize, x: f64) -> f64 {
    if m > l {
        return 0.0;
    }
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= -fact * somx2;
            fact += 2.0;
        }
    }
    if l == m {
        return pmm;
    }
    let mut pmmp1 = x * usize_to_f64(2 * m + 1) * pmm;
    if l == m + 1 {
        return pmmp1;
    }
    for ll in (m + 2)..=l {
        let pll = (x * usize_to_f64(2 * ll - 1) * pmmp1 - usize_to_f64(ll + m - 1) * pmm)
            / usize_to_f64(ll - m);
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pmmp1
}

/// Real spherical harmonic `Y_lm(φ, θ)`; `m < 0` selects the sine family.
#[must_use]
pub fn real_spherical_harmonic(l: usize, m: isize, phi: f64, theta: f64) -> f64 {
    let order = m.unsigned_abs();
    if order > l {
        return 0.0;
    }
    let ln_ratio = ln_gamma(usize_to_f64(l - order + 1)) - ln_gamma(usize_to_f64(l + order + 1));
    let norm = (usize_to_f64(2 * l + 1) / (4.0 * PI)).sqrt() * (0.5 * ln_ratio).exp();
    let legendre = associated_legendre(l, order, theta.cos());
    let azimuth = usize_to_f64(order) * phi;
    match m.signum() {
        0 => norm * legendre,
        1 => SQRT_2 * norm * legendre * azimuth.cos(),
        _ => SQRT_2 * norm * legendre * azimuth.sin(),
    }
}

/// Real spherical harmonics up to `lmax`, tabulated on a fixed sky grid.
///
/// Harmonic `k = l² + (m + l)` is stored in row `k`; the grid is the product of
/// 40 azimuths in `[0, 2π)` and 40 values of `cos θ` in `[−1, 1)`.
#[derive(Debug, Clone)]
pub struct HarmonicGrid {
    values: Vec<Vec<f64>>,
}

impl HarmonicGrid {
    #[must_use]
    pub fn new(lmax: usize) -> Self {
        let n = usize_to_f64(SKY_GRID_SIZE);
        let mut points = Vec::with_capacity(SKY_GRID_SIZE * SKY_GRID_SIZE);
        for i in 0..SKY_GRID_SIZE {
            let phi = TAU * usize_to_f64(i) / n;
            for j in 0..SKY_GRID_SIZE {
                let cos_theta = 2.0f64.mul_add(usize_to_f64(j) / n, -1.0);
                points.push((phi, cos_theta.acos()));
            }
        }
        let mut values = Vec::with_capacity((lmax + 1) * (lmax + 1));
        for l in 0..=lmax {
            let l_signed = isize::try_from(l).unwrap_or(isize::MAX);
            for m in -l_signed..=l_signed {
                values.push(
                    points
                        .iter()
                        .map(|(phi, theta)| real_spherical_harmonic(l, m, *phi, *theta))
                        .collect(),
                );
            }
        }
        Self { values }
    }

    /// Whether `Σ_k c_k Y_k ≥ 0` at every grid point.
    #[must_use]
    pub fn is_non_negative(&self, coefficients: &[f64]) -> bool {
        let Some(first) = self.values.first() else {
            return true;
        };
        (0..first.len()).all(|point| {
            let power: f64 = coefficients
                .iter()
                .zip(&self.values)
                .map(|(c, row)| c * row[point])
                .sum();
            power >= 0.0
        })
    }
}

/// Hellings–Downs overlap reduction matrix, with the pulsar term doubling the diagonal.
#[must_use]
pub fn hellings_downs_matrix(positions: &[SkyPosition]) -> Mat<f64> {
    let units: Vec<[f64; 3]> = positions.iter().map(|p| p.unit_vector()).collect();
    Mat::from_fn(units.len(), units.len(), |a, b| {
        if a == b {
            return 1.0;
        }
        let cos_zeta: f64 = (0..3).map(|k| units[a][k] * units[b][k]).sum();
        let x = 0.5 * (1.0 - cos_zeta);
        let x_ln_x = if x > 0.0 { x * x.ln() } else { 0.0 };
        1.5f64.mul_add(x_ln_x, -0.25 * x) + 0.5
    })
}
