//! Core public types for the timing-array posterior: run configuration and errors.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::{ModeBlocks, PulsarError};

/// Errors returned by configuration validation and posterior construction.
#[derive(Debug, Error)]
pub enum PtaError {
    #[error(transparent)]
    InvalidPulsar(#[from] PulsarError),
    #[error("at least one pulsar is required")]
    NoPulsars,
    #[error("number of Fourier modes must be positive")]
    NoModes,
    #[error("pulsar {name}: design has {found} Fourier columns, configuration requires {expected}")]
    FourierColumnMismatch {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("{prior:?} prior is not defined for the {component}")]
    IncompatiblePrior {
        component: &'static str,
        prior: AmplitudePrior,
    },
    #[error("Gaussian-process prior requires a free-spectrum or turnover GW background")]
    GaussianProcessWithoutSpectrum,
    #[error("fixed GW background slope must be finite")]
    InvalidFixedSlope,
    #[error("frequency windows must partition the {modes} GW modes")]
    InvalidWindows { modes: usize },
    #[error("model-independent correlations require at least two pulsars")]
    TooFewPulsars,
    #[error("correlation basis must hold {expected} symmetric {size}x{size} matrices")]
    InvalidCorrelationBasis { expected: usize, size: usize },
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("pulsar {0} has no fixed red-noise parameters")]
    MissingFixedRedNoise(String),
    #[error("invalid configuration document: {0}")]
    ConfigDocument(#[from] serde_json::Error),
}

/// Spectral parameterization of an intrinsic noise process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralModel {
    #[default]
    PowerLaw,
    FreeSpectrum,
}

/// Prior family on a log10 amplitude (or log10 spectral coefficients).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmplitudePrior {
    /// Uniform in the linear amplitude.
    Uniform,
    /// Uniform in log10 amplitude.
    #[default]
    LogUniform,
    /// Gaussian on log10 amplitude, `N(−15, 0.22)`.
    Sesana,
    /// Gaussian on log10 amplitude, `N(−14.4, 0.26)`.
    McWilliams,
}

impl AmplitudePrior {
    /// Mean and standard deviation of the Sesana Gaussian on log10 amplitude.
    pub const SESANA: (f64, f64) = (-15.0, 0.22);
    /// Mean and standard deviation of the McWilliams Gaussian on log10 amplitude.
    pub const MCWILLIAMS: (f64, f64) = (-14.4, 0.26);

    const fn is_flat(self) -> bool {
        matches!(self, Self::Uniform | Self::LogUniform)
    }
}

/// Intrinsic red-noise treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedNoiseModel {
    Disabled,
    /// Power law fixed to each pulsar's own amplitude and index.
    Fixed,
    #[default]
    PowerLaw,
    FreeSpectrum,
}

/// Sampled noise block (DM variations, ephemeris errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseComponent {
    pub spectrum: SpectralModel,
    pub prior: AmplitudePrior,
}

/// Spectral shape of the GW background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum GwbSpectrum {
    PowerLaw {
        #[serde(default)]
        fixed_slope: Option<f64>,
    },
    FreeSpectrum,
    /// Power law with slope `13/3` and a low-frequency bend.
    Turnover,
    /// Characteristic strain from an eccentricity-indexed envelope.
    GpEnvelope {
        #[serde(default)]
        cosmic_variance: bool,
    },
}

impl Default for GwbSpectrum {
    fn default() -> Self {
        Self::PowerLaw { fixed_slope: None }
    }
}

/// Prior on the GW background spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GwbPrior {
    Amplitude(AmplitudePrior),
    /// Hierarchical prior around a Gaussian-process envelope, with a
    /// hyper-prior on the envelope amplitude.
    GaussianProcess { hyper: AmplitudePrior },
}

impl Default for GwbPrior {
    fn default() -> Self {
        Self::Amplitude(AmplitudePrior::LogUniform)
    }
}

/// Cross-pulsar correlation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CorrelationModel {
    ModelIndependent,
    PointSource,
    SphericalHarmonics {
        lmax: usize,
        #[serde(default = "default_true")]
        physical_prior: bool,
    },
    Clock,
}

const fn default_true() -> bool {
    true
}

/// Grouping of GW modes that share one correlation matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyWindows {
    /// `count` contiguous windows of equal size.
    Equal { count: usize },
    /// One-based inclusive `[first, last]` mode ranges.
    Explicit { ranges: Vec<[usize; 2]> },
}

impl Default for FrequencyWindows {
    fn default() -> Self {
        Self::Equal { count: 1 }
    }
}

impl FrequencyWindows {
    /// Zero-based half-open mode ranges, in order, covering `0..n_modes`.
    ///
    /// # Errors
    ///
    /// Returns `PtaError::InvalidWindows` unless the windows partition the modes.
    pub fn resolve(&self, n_modes: usize) -> Result<Vec<Range<usize>>, PtaError> {
        let invalid = || PtaError::InvalidWindows { modes: n_modes };
        let windows: Vec<Range<usize>> = match self {
            Self::Equal { count } => {
                if *count == 0 || !n_modes.is_multiple_of(*count) {
                    return Err(invalid());
                }
                let width = n_modes / count;
                (0..*count).map(|w| w * width..(w + 1) * width).collect()
            }
            Self::Explicit { ranges } => ranges
                .iter()
                .map(|[first, last]| {
                    if *first == 0 || last < first {
                        Err(invalid())
                    } else {
                        Ok(first - 1..*last)
                    }
                })
                .collect::<Result<_, _>>()?,
        };
        let mut next = 0;
        for window in &windows {
            if window.start != next {
                return Err(invalid());
            }
            next = window.end;
        }
        if next != n_modes || windows.is_empty() {
            return Err(invalid());
        }
        Ok(windows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub model: CorrelationModel,
    pub windows: FrequencyWindows,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            model: CorrelationModel::Clock,
            windows: FrequencyWindows::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GwbConfig {
    pub spectrum: GwbSpectrum,
    pub prior: GwbPrior,
    pub correlation: Option<CorrelationConfig>,
}

/// Monochromatic GW line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GwLineConfig {
    pub prior: AmplitudePrior,
    /// Correlate the line across pulsars as a point source at its sky position.
    pub correlated: bool,
}

/// Antenna response used by the burst-with-memory waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BwmAntenna {
    #[default]
    Quadrupolar,
    Monopolar,
    AbsoluteQuadrupolar,
}

/// Deterministic signal subtracted from the residuals before the Gaussian likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DeterministicSignal {
    ContinuousWave {
        #[serde(default)]
        eccentric: bool,
    },
    BurstWithMemory {
        #[serde(default)]
        antenna: BwmAntenna,
        /// Append a model index choosing between burst and no burst.
        #[serde(default)]
        model_select: bool,
    },
}

/// Component selection for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    pub n_modes: usize,
    pub red_noise: RedNoiseModel,
    pub red_prior: AmplitudePrior,
    pub dm: Option<NoiseComponent>,
    pub ephemeris: Option<NoiseComponent>,
    pub gwb: Option<GwbConfig>,
    pub gw_line: Option<GwLineConfig>,
    pub deterministic: Option<DeterministicSignal>,
    /// Include correlated white noise for pulsars that carry it.
    pub use_jitter: bool,
    /// Replace the likelihood by zero to sample the prior.
    pub constant_likelihood: bool,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            n_modes: 10,
            red_noise: RedNoiseModel::PowerLaw,
            red_prior: AmplitudePrior::LogUniform,
            dm: None,
            ephemeris: None,
            gwb: None,
            gw_line: None,
            deterministic: None,
            use_jitter: true,
            constant_likelihood: false,
        }
    }
}

impl RunConfiguration {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `PtaError::ConfigDocument` for malformed JSON and any
    /// `validate` error otherwise.
    pub fn from_json_str(document: &str) -> Result<Self, PtaError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `PtaError::ConfigDocument` if serialization fails.
    pub fn to_json_string(&self) -> Result<String, PtaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub const fn mode_blocks(&self) -> ModeBlocks {
        ModeBlocks {
            dm: self.dm.is_some(),
            ephemeris: self.ephemeris.is_some(),
        }
    }

    /// Whether the posterior couples pulsars (GWB correlations or a correlated line).
    #[must_use]
    pub fn is_correlated(&self) -> bool {
        self.gwb
            .as_ref()
            .is_some_and(|gwb| gwb.correlation.is_some())
            || self.gw_line.is_some_and(|line| line.correlated)
    }

    /// Validate component combinations that do not depend on the data.
    ///
    /// # Errors
    ///
    /// Returns `PtaError` for combinations the posterior cannot evaluate.
    pub fn validate(&self) -> Result<(), PtaError> {
        if self.n_modes == 0 {
            return Err(PtaError::NoModes);
        }
        if matches!(
            self.red_noise,
            RedNoiseModel::PowerLaw | RedNoiseModel::FreeSpectrum
        ) && !self.red_prior.is_flat()
        {
            return Err(PtaError::IncompatiblePrior {
                component: "red noise",
                prior: self.red_prior,
            });
        }
        for (component, block) in [("DM variations", self.dm), ("ephemeris", self.ephemeris)] {
            if let Some(block) = block
                && !block.prior.is_flat()
            {
                return Err(PtaError::IncompatiblePrior {
                    component,
                    prior: block.prior,
                });
            }
        }
        if let Some(gwb) = &self.gwb {
            validate_gwb(gwb, self.n_modes)?;
        }
        if let Some(line) = self.gw_line
            && !line.prior.is_flat()
        {
            return Err(PtaError::IncompatiblePrior {
                component: "GW line",
                prior: line.prior,
            });
        }
        Ok(())
    }
}

fn validate_gwb(gwb: &GwbConfig, n_modes: usize) -> Result<(), PtaError> {
    match (gwb.spectrum, gwb.prior) {
        (GwbSpectrum::PowerLaw { fixed_slope: Some(slope) }, _) if !slope.is_finite() => {
            return Err(PtaError::InvalidFixedSlope);
        }
        (
            GwbSpectrum::PowerLaw { .. } | GwbSpectrum::GpEnvelope { .. },
            GwbPrior::GaussianProcess { .. },
        ) => return Err(PtaError::GaussianProcessWithoutSpectrum),
        (GwbSpectrum::FreeSpectrum, GwbPrior::Amplitude(prior)) if !prior.is_flat() => {
            return Err(PtaError::IncompatiblePrior {
                component: "free-spectrum GW background",
                prior,
            });
        }
        _ => {}
    }
    if let Some(correlation) = &gwb.correlation {
        correlation.windows.resolve(n_modes)?;
    }
    Ok(())
}
