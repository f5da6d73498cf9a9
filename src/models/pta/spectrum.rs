//! Spectral model library: per-mode powers (s²) for each Fourier frequency.
//!
//! All power laws are referenced to `f_yr = 1 / yr` and divided by the
//! observation span, so a coefficient's prior variance is `P(f_k)`.

use std::f64::consts::{LN_10, PI};

/// Julian year in seconds.
pub const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// Spectral index of a GW background from circular SMBH binaries.
pub const GWB_SPECTRAL_INDEX: f64 = 13.0 / 3.0;

#[must_use]
pub fn reference_frequency() -> f64 {
    SECONDS_PER_YEAR.recip()
}

fn ln_twelve_pi_sq() -> f64 {
    (12.0 * PI * PI).ln()
}

/// `A²/(12π²) f_yr^(γ−3) f^(−γ) / T`.
#[must_use]
pub fn power_law(log10_amplitude: f64, gamma: f64, frequencies: &[f64], tspan: f64) -> Vec<f64> {
    let ln_f_yr = reference_frequency().ln();
    let base = 2.0 * LN_10 * log10_amplitude - ln_twelve_pi_sq() + (gamma - 3.0) * ln_f_yr
        - tspan.ln();
    frequencies
        .iter()
        .map(|f| gamma.mul_add(-f.ln(), base).exp())
        .collect()
}

/// `10^(2ρ_k) / T`.
#[must_use]
pub fn free_spectrum(log10_rho: &[f64], tspan: f64) -> Vec<f64> {
    log10_rho
        .iter()
        .map(|rho| (2.0 * LN_10).mul_add(*rho, -tspan.ln()).exp())
        .collect()
}

/// Power law with slope `13/3` suppressed below `f_bend`:
/// `P_pl(f) / (1 + (f_bend / f)^κ)`.
#[must_use]
pub fn turnover(
    log10_amplitude: f64,
    kappa: f64,
    log10_fbend: f64,
    frequencies: &[f64],
    tspan: f64,
) -> Vec<f64> {
    let fbend = 10_f64.powf(log10_fbend);
    power_law(log10_amplitude, GWB_SPECTRAL_INDEX, frequencies, tspan)
        .into_iter()
        .zip(frequencies)
        .map(|(power, f)| power / (1.0 + (fbend / f).powf(kappa)))
        .collect()
}

/// Mean and scatter of the characteristic-strain envelope at one mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePrediction {
    pub mean: f64,
    pub std_dev: f64,
}

/// Gaussian-process interpolant of the characteristic-strain envelope,
/// indexed by mode and binary eccentricity.
pub trait EnvelopeInterpolant: Send + Sync {
    fn predict(&self, mode: usize, eccentricity: f64) -> EnvelopePrediction;
}

/// Characteristic strain `h_c = A (μ_k + z_k σ_k)`; without `scatter` the mean envelope.
#[must_use]
pub fn envelope_strain(
    log10_amplitude: f64,
    predictions: &[EnvelopePrediction],
    scatter: Option<&[f64]>,
) -> Vec<f64> {
    let amplitude = 10_f64.powf(log10_amplitude);
    predictions
        .iter()
        .enumerate()
        .map(|(k, prediction)| {
            let z = scatter.and_then(|values| values.get(k)).copied().unwrap_or(0.0);
            amplitude * z.mul_add(prediction.std_dev, prediction.mean)
        })
        .collect()
}

/// `h_c² / (12π²) / f³ / T`.
#[must_use]
pub fn strain_to_power(strain: &[f64], frequencies: &[f64], tspan: f64) -> Vec<f64> {
    let norm = 12.0 * PI * PI * tspan;
    strain
        .iter()
        .zip(frequencies)
        .map(|(hc, f)| hc * hc / (norm * f.powi(3)))
        .collect()
}

/// Single-mode line: `10^(2ρ)/T` at the mode nearest `10^log10_frequency`.
#[must_use]
pub fn line(log10_rho: f64, log10_frequency: f64, frequencies: &[f64], tspan: f64) -> Vec<f64> {
    let mut powers = vec![0.0; frequencies.len()];
    let target = 10_f64.powf(log10_frequency);
    if let Some(idx) = crate::utils::nearest_index(frequencies, target) {
        powers[idx] = free_spectrum(&[log10_rho], tspan)[0];
    }
    powers
}
