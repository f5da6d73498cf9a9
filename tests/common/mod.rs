//! Synthetic timing arrays shared by the integration tests.
#![allow(dead_code)]

use std::f64::consts::TAU;

use faer::Mat;
use pta_likelihood::input::reduced_design;
use pta_likelihood::utils::sample_standard_normal;
use pta_likelihood::{
    FrequencyGrid, JitterEpoch, JitterModel, ModeBlocks, Pulsar, PtaPosterior, SkyPosition,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

pub const TOA_ERROR: f64 = 1.0e-7;
pub const YEAR: f64 = 365.25 * 86_400.0;

pub fn idx_to_f64(idx: usize) -> f64 {
    f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
}

/// Slightly irregular sampling over roughly five years; later pulsars start later.
pub fn toas(pulsar: usize, n_toas: usize) -> Vec<f64> {
    let start = 0.25 * YEAR * idx_to_f64(pulsar % 3);
    let end = 5.0 * YEAR;
    let last = idx_to_f64(n_toas.saturating_sub(1).max(1));
    (0..n_toas)
        .map(|i| {
            let fraction = idx_to_f64(i) / last;
            let wobble = 86_400.0 * (1.3 * idx_to_f64(i)).sin();
            (end - start).mul_add(fraction, start) + wobble
        })
        .collect()
}

/// Offset, slope and curvature on a rescaled time axis.
pub fn quadratic_timing_model(toas: &[f64]) -> Mat<f64> {
    let lo = toas.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = toas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mid = 0.5 * (lo + hi);
    let half = 0.5 * (hi - lo);
    Mat::from_fn(toas.len(), 3, |i, j| ((toas[i] - mid) / half).powi(i32::try_from(j).unwrap_or(0)))
}

pub fn position(pulsar: usize) -> SkyPosition {
    let p = idx_to_f64(pulsar);
    SkyPosition::new(
        0.9f64.mul_add(p, 0.3) % TAU,
        0.6 * 1.7f64.mul_add(p, 0.2).sin(),
    )
}

fn observing_frequencies(n_toas: usize) -> Vec<f64> {
    (0..n_toas)
        .map(|i| if i % 2 == 0 { 1.4e9 } else { 0.8e9 })
        .collect()
}

/// `n_psr` pulsars whose design matrices carry the given Fourier blocks over
/// the array-wide frequency grid.
pub fn synthetic_array(
    n_psr: usize,
    n_toas: usize,
    n_modes: usize,
    blocks: ModeBlocks,
    seed: u64,
) -> Vec<Pulsar> {
    let all_toas: Vec<Vec<f64>> = (0..n_psr).map(|p| toas(p, n_toas)).collect();
    let grid = FrequencyGrid::spanning(all_toas.iter().map(Vec::as_slice), n_modes)
        .expect("frequency grid");
    all_toas
        .into_iter()
        .enumerate()
        .map(|(p, toas)| synthetic_pulsar(p, toas, &grid, blocks, seed))
        .collect()
}

fn synthetic_pulsar(
    index: usize,
    toas: Vec<f64>,
    grid: &FrequencyGrid,
    blocks: ModeBlocks,
    seed: u64,
) -> Pulsar {
    let n = toas.len();
    let name = format!("J{:04}+{:02}", 1000 + 37 * index, index);
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(u64::try_from(index).unwrap_or(0)));
    let phase = idx_to_f64(index);
    let residuals: Vec<f64> = toas
        .iter()
        .map(|t| {
            let red = 3.0e-7 * (TAU * t / (3.0 * YEAR) + phase).sin();
            sample_standard_normal(&mut rng).mul_add(TOA_ERROR, red)
        })
        .collect();
    let frequencies = observing_frequencies(n);
    let timing = quadratic_timing_model(&toas);
    let design = reduced_design(
        &name,
        &timing,
        &toas,
        &frequencies,
        position(index),
        grid,
        blocks,
    )
    .expect("reduced design");
    Pulsar::new(
        name,
        toas,
        residuals,
        vec![TOA_ERROR; n],
        position(index),
        design,
        timing.ncols(),
    )
    .with_observing_frequencies(frequencies)
}

/// Correlated white noise over consecutive triples of TOAs.
pub fn with_epoch_jitter(pulsar: Pulsar, amplitude: f64) -> Pulsar {
    let n = pulsar.n_toas();
    let epochs = (0..n)
        .step_by(3)
        .map(|start| JitterEpoch {
            start,
            end: (start + 3).min(n),
            group: 0,
        })
        .collect();
    pulsar.with_jitter(JitterModel {
        epochs,
        amplitudes: vec![amplitude],
    })
}

/// Parameter vector built from labels; unmatched labels take the midpoint of their bounds.
pub fn point(posterior: &PtaPosterior, value: impl Fn(&str) -> Option<f64>) -> Vec<f64> {
    let (lower, upper) = posterior.bounds();
    posterior
        .labels()
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(label, (lo, hi))| value(label).unwrap_or(0.5 * (lo + hi)))
        .collect()
}

/// Noise values used across tests, keyed by label prefix.
pub fn noise_value(label: &str) -> Option<f64> {
    if label.starts_with("log10_A_red") {
        Some(-14.5)
    } else if label.starts_with("gamma_red") {
        Some(3.5)
    } else if label.starts_with("log10_A_gwb") {
        Some(-14.3)
    } else if label.starts_with("gamma_gwb") {
        Some(13.0 / 3.0)
    } else {
        None
    }
}
