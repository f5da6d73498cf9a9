//! Prior Jacobians and hierarchical prior terms.
//!
//! Parameters are sampled uniformly inside their box; these terms convert
//! that box into the requested prior family.

use std::f64::consts::{LN_10, PI};

use statrs::distribution::{Continuous, Normal};

use super::spectrum::{EnvelopePrediction, reference_frequency};
use super::types::AmplitudePrior;

/// Log-density of `Normal(mean, std_dev)` at `value`; `-inf` for a degenerate width.
#[must_use]
pub fn log_normal_density(value: f64, mean: f64, std_dev: f64) -> f64 {
    Normal::new(mean, std_dev).map_or(f64::NEG_INFINITY, |normal| normal.ln_pdf(value))
}

/// Jacobian for one log10 amplitude under `prior`.
#[must_use]
pub fn amplitude_log_prior(prior: AmplitudePrior, log10_amplitude: f64) -> f64 {
    match prior {
        AmplitudePrior::Uniform => LN_10.mul_add(log10_amplitude, LN_10.ln()),
        AmplitudePrior::LogUniform => 0.0,
        AmplitudePrior::Sesana => astrophysical(log10_amplitude, AmplitudePrior::SESANA),
        AmplitudePrior::McWilliams => {
            astrophysical(log10_amplitude, AmplitudePrior::MCWILLIAMS)
        }
    }
}

fn astrophysical(log10_amplitude: f64, (mean, std_dev): (f64, f64)) -> f64 {
    log_normal_density(log10_amplitude, mean, std_dev) - LN_10.ln()
}

/// Jacobian for log10 spectral coefficients: uniform in `10^ρ` or in `ρ`.
#[must_use]
pub fn spectrum_log_prior(prior: AmplitudePrior, log10_rho: &[f64]) -> f64 {
    match prior {
        AmplitudePrior::Uniform => log10_rho
            .iter()
            .map(|rho| LN_10.mul_add(*rho, LN_10.ln()))
            .sum(),
        _ => 0.0,
    }
}

/// Gaussian prior on free-spectrum powers centred on an amplitude-scaled envelope.
///
/// `powers` are the per-mode powers `P_k`; the envelope predicts the mean
/// strain at each mode and the resulting prior on `P_k` has mean
/// `A² μ_k² / (12π² f³ T)` and standard deviation `2 mean σ_k / μ_k`. The
/// change of variables from `ρ_k` to `P_k` contributes `ln(2 P_k ln 10)`.
#[must_use]
pub fn free_spectrum_process_log_prior(
    powers: &[f64],
    log10_amplitude: f64,
    predictions: &[EnvelopePrediction],
    frequencies: &[f64],
    tspan: f64,
) -> f64 {
    let amplitude_sq = 10_f64.powf(2.0 * log10_amplitude);
    powers
        .iter()
        .zip(predictions)
        .zip(frequencies)
        .map(|((power, prediction), f)| {
            let mean = amplitude_sq * prediction.mean * prediction.mean
                / (12.0 * PI * PI * f.powi(3) * tspan);
            let std_dev = 2.0 * mean * prediction.std_dev / prediction.mean;
            (2.0 * power * LN_10).ln() + log_normal_density(*power, mean, std_dev)
        })
        .sum()
}

/// Gaussian-process likelihood of a turnover strain shape.
///
/// The normalized turnover strain `(f/f_yr)^(−2/3) / sqrt(1 + (f_bend/f)^κ)`
/// is scored against the envelope mean and scatter at each mode.
#[must_use]
pub fn turnover_process_log_prior(
    kappa: f64,
    log10_fbend: f64,
    predictions: &[EnvelopePrediction],
    frequencies: &[f64],
) -> f64 {
    let fbend = 10_f64.powf(log10_fbend);
    let f_yr = reference_frequency();
    predictions
        .iter()
        .zip(frequencies)
        .map(|(prediction, f)| {
            let shape = (f / f_yr).powf(-2.0 / 3.0) / (1.0 + (fbend / f).powf(kappa)).sqrt();
            log_normal_density(prediction.mean, shape, prediction.std_dev)
        })
        .sum()
}
