//! Fourier frequency grid and design-matrix builders for the reduced basis.
//!
//! Column convention for every block: for each frequency `f_k`, a cosine
//! column followed by a sine column. Blocks are concatenated in the order red
//! (shared with the GW signal), DM, ephemeris x, y, z.

use std::f64::consts::TAU;

use faer::Mat;
use serde::{Deserialize, Serialize};

use super::{PulsarError, SkyPosition};
use crate::utils::usize_to_f64;

/// Dispersion constant `K` such that the DM delay scales as `1 / (K ν²)` with `ν` in Hz.
pub const DM_DISPERSION_CONSTANT: f64 = 2.41e-16;

/// Noise blocks present in the Fourier part of each pulsar's design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeBlocks {
    pub dm: bool,
    pub ephemeris: bool,
}

impl ModeBlocks {
    /// Number of per-frequency blocks: red, optional DM, optional three ephemeris axes.
    #[must_use]
    pub const fn block_count(self) -> usize {
        1 + if self.dm { 1 } else { 0 } + if self.ephemeris { 3 } else { 0 }
    }

    /// Number of Fourier coefficients per pulsar for `n_modes` frequencies.
    #[must_use]
    pub const fn mode_columns(self, n_modes: usize) -> usize {
        2 * n_modes * self.block_count()
    }

    /// Offset (in frequencies) of the first ephemeris block.
    #[must_use]
    pub const fn ephemeris_offset(self, n_modes: usize) -> usize {
        n_modes * if self.dm { 2 } else { 1 }
    }
}

/// Frequencies `f_k = k / T` for `k = 1..=n_modes`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyGrid {
    frequencies: Vec<f64>,
    tspan: f64,
}

impl FrequencyGrid {
    /// # Errors
    ///
    /// Returns `PulsarError::InvalidFrequencyGrid` for a zero mode count or a
    /// non-positive time span.
    pub fn new(n_modes: usize, tspan: f64) -> Result<Self, PulsarError> {
        if n_modes == 0 || !(tspan.is_finite() && tspan > 0.0) {
            return Err(PulsarError::InvalidFrequencyGrid);
        }
        let frequencies = (1..=n_modes).map(|k| usize_to_f64(k) / tspan).collect();
        Ok(Self { frequencies, tspan })
    }

    /// Grid over the longest observation span among `toa_sets`.
    ///
    /// # Errors
    ///
    /// Returns `PulsarError::InvalidFrequencyGrid` if every span is zero.
    pub fn spanning<'a>(
        toa_sets: impl IntoIterator<Item = &'a [f64]>,
        n_modes: usize,
    ) -> Result<Self, PulsarError> {
        let tspan = toa_sets
            .into_iter()
            .map(|toas| {
                let min = toas.iter().copied().fold(f64::INFINITY, f64::min);
                let max = toas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if min.is_finite() { max - min } else { 0.0 }
            })
            .fold(0.0, f64::max);
        Self::new(n_modes, tspan)
    }

    #[must_use]
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    #[must_use]
    pub const fn tspan(&self) -> f64 {
        self.tspan
    }

    #[must_use]
    pub const fn n_modes(&self) -> usize {
        self.frequencies.len()
    }
}

/// Sine/cosine basis evaluated at `toas`, shape `n_toa × 2 n_modes`.
#[must_use]
pub fn fourier_basis(toas: &[f64], grid: &FrequencyGrid) -> Mat<f64> {
    let freqs = grid.frequencies();
    Mat::from_fn(toas.len(), 2 * freqs.len(), |i, j| {
        let phase = TAU * freqs[j / 2] * toas[i];
        if j % 2 == 0 { phase.cos() } else { phase.sin() }
    })
}

/// Fourier basis scaled by the dispersive kernel `1 / (K ν²)`.
#[must_use]
pub fn dm_basis(toas: &[f64], observing_frequencies: &[f64], grid: &FrequencyGrid) -> Mat<f64> {
    let basis = fourier_basis(toas, grid);
    Mat::from_fn(basis.nrows(), basis.ncols(), |i, j| {
        let nu = observing_frequencies[i];
        basis[(i, j)] / (DM_DISPERSION_CONSTANT * nu * nu)
    })
}

/// Three Fourier blocks projected onto the pulsar direction (x, y, z).
#[must_use]
pub fn ephemeris_basis(toas: &[f64], position: SkyPosition, grid: &FrequencyGrid) -> Mat<f64> {
    let basis = fourier_basis(toas, grid);
    let unit = position.unit_vector();
    let width = basis.ncols();
    Mat::from_fn(basis.nrows(), 3 * width, |i, j| {
        basis[(i, j % width)] * unit[j / width]
    })
}

/// Concatenate a timing-model basis with the configured Fourier blocks.
///
/// # Errors
///
/// Returns `PulsarError` if the timing basis row count disagrees with the
/// TOAs, or if DM blocks are requested without observing frequencies.
pub fn reduced_design(
    name: &str,
    timing: &Mat<f64>,
    toas: &[f64],
    observing_frequencies: &[f64],
    position: SkyPosition,
    grid: &FrequencyGrid,
    blocks: ModeBlocks,
) -> Result<Mat<f64>, PulsarError> {
    if timing.nrows() != toas.len() {
        return Err(PulsarError::DesignRowMismatch {
            name: name.to_owned(),
            rows: timing.nrows(),
            expected: toas.len(),
        });
    }
    if blocks.dm && observing_frequencies.len() != toas.len() {
        return Err(PulsarError::LengthMismatch {
            name: name.to_owned(),
            field: "observing_frequencies",
            found: observing_frequencies.len(),
            expected: toas.len(),
        });
    }

    let mut parts = vec![fourier_basis(toas, grid)];
    if blocks.dm {
        parts.push(dm_basis(toas, observing_frequencies, grid));
    }
    if blocks.ephemeris {
        parts.push(ephemeris_basis(toas, position, grid));
    }

    let total = timing.ncols() + parts.iter().map(Mat::ncols).sum::<usize>();
    let mut design = Mat::<f64>::zeros(toas.len(), total);
    for i in 0..toas.len() {
        for j in 0..timing.ncols() {
            design[(i, j)] = timing[(i, j)];
        }
    }
    let mut offset = timing.ncols();
    for part in &parts {
        for i in 0..part.nrows() {
            for j in 0..part.ncols() {
                design[(i, offset + j)] = part[(i, j)];
            }
        }
        offset += part.ncols();
    }
    Ok(design)
}
