//! # Pulsar datasets
//!
//! Defines the per-pulsar container consumed by the posterior: arrival
//! times, post-fit residuals, white-noise uncertainties, sky position, and the
//! reduced design matrix whose leading columns span the timing model and whose
//! trailing columns are the Fourier basis of the configured noise blocks.
//!
//! All times are in seconds and all frequencies in Hz.
//!
//! # Examples
//!
//! ```
//! use faer::Mat;
//! use pta_likelihood::{Pulsar, SkyPosition};
//!
//! let toas = vec![0.0, 1.0e7, 2.0e7];
//! let pulsar = Pulsar::new(
//!     "J0000+0000",
//!     toas,
//!     vec![1.0e-7, -2.0e-7, 5.0e-8],
//!     vec![1.0e-7; 3],
//!     SkyPosition::new(1.0, 0.5),
//!     Mat::from_fn(3, 1, |_, _| 1.0),
//!     1,
//! );
//!
//! assert!(pulsar.validate().is_ok());
//! ```

use faer::Mat;
use thiserror::Error;

use crate::utils::matrix_is_finite;

pub mod fourier;

pub use fourier::{
    DM_DISPERSION_CONSTANT, FrequencyGrid, ModeBlocks, dm_basis, ephemeris_basis, fourier_basis,
    reduced_design,
};

/// Errors returned when validating a pulsar dataset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PulsarError {
    #[error("pulsar {name}: at least one TOA is required")]
    NoToas { name: String },
    #[error("pulsar {name}: {field} has {found} entries, expected {expected}")]
    LengthMismatch {
        name: String,
        field: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("pulsar {name}: design matrix has {rows} rows, expected {expected}")]
    DesignRowMismatch {
        name: String,
        rows: usize,
        expected: usize,
    },
    #[error("pulsar {name}: {timing} timing columns exceed the {columns} design columns")]
    TimingColumnsExceedDesign {
        name: String,
        timing: usize,
        columns: usize,
    },
    #[error("pulsar {name}: {field} contains non-finite values")]
    NonFinite { name: String, field: &'static str },
    #[error("pulsar {name}: TOA uncertainties must be strictly positive")]
    NonPositiveUncertainty { name: String },
    #[error("pulsar {name}: observing frequencies must be strictly positive")]
    NonPositiveFrequency { name: String },
    #[error("pulsar {name}: jitter epoch {epoch} is empty, out of range, or overlaps another")]
    InvalidJitterEpoch { name: String, epoch: usize },
    #[error("pulsar {name}: jitter epoch {epoch} references unknown group {group}")]
    UnknownJitterGroup {
        name: String,
        epoch: usize,
        group: usize,
    },
    #[error("pulsar {name}: jitter amplitudes must be finite and non-negative")]
    InvalidJitterAmplitude { name: String },
    #[error("frequency grid requires a positive mode count and a positive time span")]
    InvalidFrequencyGrid,
}

/// Sky position in ecliptic-like angular coordinates (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPosition {
    /// Azimuthal angle `φ`.
    pub longitude: f64,
    /// Elevation above the equator; the polar angle is `π/2 − latitude`.
    pub latitude: f64,
}

impl SkyPosition {
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    #[must_use]
    pub fn polar_angle(self) -> f64 {
        std::f64::consts::FRAC_PI_2 - self.latitude
    }

    /// Cartesian unit vector pointing at the pulsar.
    #[must_use]
    pub fn unit_vector(self) -> [f64; 3] {
        let (sin_theta, cos_theta) = self.polar_angle().sin_cos();
        let (sin_phi, cos_phi) = self.longitude.sin_cos();
        [sin_theta * cos_phi, sin_theta * sin_phi, cos_theta]
    }
}

/// One block of TOAs sharing a fully correlated white-noise term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterEpoch {
    /// First TOA index of the block.
    pub start: usize,
    /// One past the last TOA index of the block.
    pub end: usize,
    /// Backend/group whose amplitude applies to this block.
    pub group: usize,
}

/// Correlated white noise (ECORR): per-epoch blocks and per-group amplitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct JitterModel {
    pub epochs: Vec<JitterEpoch>,
    /// Amplitude in seconds for each group.
    pub amplitudes: Vec<f64>,
}

impl JitterModel {
    /// Variance of the correlated term of `epoch`.
    #[must_use]
    pub fn epoch_variance(&self, epoch: &JitterEpoch) -> f64 {
        self.amplitudes
            .get(epoch.group)
            .map_or(0.0, |amplitude| amplitude * amplitude)
    }
}

/// Red-noise power law held fixed at the pulsar's own values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRedNoise {
    pub log10_amplitude: f64,
    pub spectral_index: f64,
}

#[derive(Debug, Clone)]
pub struct Pulsar {
    pub name: String,
    pub toas: Vec<f64>,
    pub residuals: Vec<f64>,
    pub toa_errors: Vec<f64>,
    pub observing_frequencies: Vec<f64>,
    pub position: SkyPosition,
    pub design: Mat<f64>,
    pub timing_columns: usize,
    pub jitter: Option<JitterModel>,
    pub fixed_red_noise: Option<FixedRedNoise>,
}

impl Pulsar {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        toas: Vec<f64>,
        residuals: Vec<f64>,
        toa_errors: Vec<f64>,
        position: SkyPosition,
        design: Mat<f64>,
        timing_columns: usize,
    ) -> Self {
        Self {
            name: name.into(),
            toas,
            residuals,
            toa_errors,
            observing_frequencies: Vec::new(),
            position,
            design,
            timing_columns,
            jitter: None,
            fixed_red_noise: None,
        }
    }

    #[must_use]
    pub fn with_observing_frequencies(self, observing_frequencies: Vec<f64>) -> Self {
        Self {
            observing_frequencies,
            ..self
        }
    }

    #[must_use]
    pub fn with_jitter(self, jitter: JitterModel) -> Self {
        Self {
            jitter: Some(jitter),
            ..self
        }
    }

    #[must_use]
    pub fn with_fixed_red_noise(self, fixed_red_noise: FixedRedNoise) -> Self {
        Self {
            fixed_red_noise: Some(fixed_red_noise),
            ..self
        }
    }

    #[must_use]
    pub const fn n_toas(&self) -> usize {
        self.toas.len()
    }

    /// Number of design columns beyond the timing-model block.
    #[must_use]
    pub fn fourier_columns(&self) -> usize {
        self.design.ncols().saturating_sub(self.timing_columns)
    }

    /// Observation span `max(t) − min(t)` in seconds.
    #[must_use]
    pub fn timespan(&self) -> f64 {
        let (min, max) = self
            .toas
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
                (lo.min(t), hi.max(t))
            });
        if min.is_finite() { max - min } else { 0.0 }
    }

    /// Validate shapes and values of the dataset.
    ///
    /// # Errors
    ///
    /// Returns `PulsarError` if the dataset is malformed.
    pub fn validate(&self) -> Result<(), PulsarError> {
        let name = || self.name.clone();
        let n = self.toas.len();
        if n == 0 {
            return Err(PulsarError::NoToas { name: name() });
        }
        for (field, values) in [
            ("residuals", &self.residuals),
            ("toa_errors", &self.toa_errors),
        ] {
            if values.len() != n {
                return Err(PulsarError::LengthMismatch {
                    name: name(),
                    field,
                    found: values.len(),
                    expected: n,
                });
            }
        }
        if !self.observing_frequencies.is_empty() && self.observing_frequencies.len() != n {
            return Err(PulsarError::LengthMismatch {
                name: name(),
                field: "observing_frequencies",
                found: self.observing_frequencies.len(),
                expected: n,
            });
        }
        for (field, values) in [
            ("toas", &self.toas),
            ("residuals", &self.residuals),
            ("toa_errors", &self.toa_errors),
            ("observing_frequencies", &self.observing_frequencies),
        ] {
            if values.iter().any(|value| !value.is_finite()) {
                return Err(PulsarError::NonFinite { name: name(), field });
            }
        }
        if self.toa_errors.iter().any(|&sigma| sigma <= 0.0) {
            return Err(PulsarError::NonPositiveUncertainty { name: name() });
        }
        if self.observing_frequencies.iter().any(|&nu| nu <= 0.0) {
            return Err(PulsarError::NonPositiveFrequency { name: name() });
        }
        if self.design.nrows() != n {
            return Err(PulsarError::DesignRowMismatch {
                name: name(),
                rows: self.design.nrows(),
                expected: n,
            });
        }
        if self.timing_columns > self.design.ncols() {
            return Err(PulsarError::TimingColumnsExceedDesign {
                name: name(),
                timing: self.timing_columns,
                columns: self.design.ncols(),
            });
        }
        if !matrix_is_finite(&self.design) {
            return Err(PulsarError::NonFinite {
                name: name(),
                field: "design",
            });
        }
        if let Some(jitter) = &self.jitter {
            self.validate_jitter(jitter)?;
        }
        if let Some(fixed) = self.fixed_red_noise
            && !(fixed.log10_amplitude.is_finite() && fixed.spectral_index.is_finite())
        {
            return Err(PulsarError::NonFinite {
                name: name(),
                field: "fixed_red_noise",
            });
        }
        Ok(())
    }

    fn validate_jitter(&self, jitter: &JitterModel) -> Result<(), PulsarError> {
        if jitter
            .amplitudes
            .iter()
            .any(|amplitude| !amplitude.is_finite() || *amplitude < 0.0)
        {
            return Err(PulsarError::InvalidJitterAmplitude {
                name: self.name.clone(),
            });
        }
        let mut covered = vec![false; self.toas.len()];
        for (idx, epoch) in jitter.epochs.iter().enumerate() {
            if epoch.start >= epoch.end
                || epoch.end > self.toas.len()
                || covered[epoch.start..epoch.end].iter().any(|&used| used)
            {
                return Err(PulsarError::InvalidJitterEpoch {
                    name: self.name.clone(),
                    epoch: idx,
                });
            }
            if epoch.group >= jitter.amplitudes.len() {
                return Err(PulsarError::UnknownJitterGroup {
                    name: self.name.clone(),
                    epoch: idx,
                    group: epoch.group,
                });
            }
            covered[epoch.start..epoch.end].fill(true);
        }
        Ok(())
    }
}
