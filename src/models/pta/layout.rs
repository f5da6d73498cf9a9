//! Parameter layout: where each enabled component lives in the flat vector.
//!
//! The layout is resolved once from a [`RunConfiguration`] by walking a single
//! declarative component table in canonical order. The resulting value is the
//! only source of offsets for both decoding and jump proposals.

use std::f64::consts::{PI, TAU};
use std::ops::Range;

use super::types::{
    CorrelationModel, DeterministicSignal, GwbPrior, GwbSpectrum, PtaError, RedNoiseModel,
    RunConfiguration, SpectralModel,
};
use crate::inference::Infeasibility;

const RED_LOG10_AMPLITUDE: (f64, f64) = (-20.0, -11.0);
const SPECTRAL_INDEX: (f64, f64) = (0.0, 7.0);
const LOG10_RHO: (f64, f64) = (-8.0, 3.0);
const GWB_LOG10_AMPLITUDE: (f64, f64) = (-18.0, -11.0);
const ECCENTRICITY: (f64, f64) = (0.0, 0.9);
const TURNOVER_LOG10_FBEND: (f64, f64) = (-9.0, -7.0);
const AZIMUTH: (f64, f64) = (0.0, TAU);
const COS_POLAR: (f64, f64) = (-1.0, 1.0);
const HYPERSPHERE_ANGLE: (f64, f64) = (0.0, PI);
const HARMONIC_COEFFICIENT: (f64, f64) = (-10.0, 10.0);
const LINE_LOG10_FREQUENCY: (f64, f64) = (-10.0, -7.0);
const POLARIZATION: (f64, f64) = (0.0, PI);
const MODEL_INDEX: (f64, f64) = (-0.5, 1.5);

const EPHEMERIS_AXES: [&str; 3] = ["x", "y", "z"];

/// Components of the parameter vector in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    RedNoise,
    DmVariations,
    Ephemeris,
    GwbSpectrum,
    GwbHyper,
    GwbCorrelation,
    GwLine,
    ContinuousWave,
    BurstWithMemory,
    ModelIndex,
}

impl Component {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RedNoise => "red noise",
            Self::DmVariations => "DM variations",
            Self::Ephemeris => "ephemeris",
            Self::GwbSpectrum => "GWB spectrum",
            Self::GwbHyper => "GWB hyper-prior",
            Self::GwbCorrelation => "GWB correlations",
            Self::GwLine => "GW line",
            Self::ContinuousWave => "continuous wave",
            Self::BurstWithMemory => "burst with memory",
            Self::ModelIndex => "model index",
        }
    }
}

/// Internal arrangement of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceShape {
    /// `count` log10 amplitudes followed by `count` spectral indices.
    PowerLaw { count: usize },
    /// `rows × modes` log10 spectral coefficients, row-major.
    FreeSpectrum { rows: usize, modes: usize },
    /// Heterogeneous coordinates, decoded by position.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSlice {
    pub component: Component,
    pub start: usize,
    pub len: usize,
    pub shape: SliceShape,
}

impl ParameterSlice {
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    #[must_use]
    pub fn view<'a>(&self, params: &'a [f64]) -> &'a [f64] {
        &params[self.range()]
    }
}

/// Data-dependent facts the layout needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutContext {
    pub pulsar_names: Vec<String>,
    /// Earliest and latest TOA over the array (s).
    pub toa_range: (f64, f64),
}

struct Block {
    shape: SliceShape,
    bounds: Vec<(f64, f64)>,
    labels: Vec<String>,
}

impl Block {
    fn new(shape: SliceShape) -> Self {
        Self {
            shape,
            bounds: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn push(&mut self, label: impl Into<String>, bounds: (f64, f64)) {
        self.labels.push(label.into());
        self.bounds.push(bounds);
    }
}

type BlockBuilder = fn(&RunConfiguration, &LayoutContext) -> Result<Option<Block>, PtaError>;

const COMPONENT_TABLE: [(Component, BlockBuilder); 10] = [
    (Component::RedNoise, red_noise_block),
    (Component::DmVariations, dm_block),
    (Component::Ephemeris, ephemeris_block),
    (Component::GwbSpectrum, gwb_spectrum_block),
    (Component::GwbHyper, gwb_hyper_block),
    (Component::GwbCorrelation, gwb_correlation_block),
    (Component::GwLine, line_block),
    (Component::ContinuousWave, continuous_wave_block),
    (Component::BurstWithMemory, burst_block),
    (Component::ModelIndex, model_index_block),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLayout {
    slices: Vec<ParameterSlice>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    labels: Vec<String>,
}

impl ParameterLayout {
    /// Resolve the layout of `config` for the given array.
    ///
    /// # Errors
    ///
    /// Returns `PtaError` if a component cannot be laid out (invalid windows,
    /// too few pulsars for model-independent correlations).
    pub fn resolve(config: &RunConfiguration, context: &LayoutContext) -> Result<Self, PtaError> {
        let mut layout = Self {
            slices: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            labels: Vec::new(),
        };
        for (component, build) in COMPONENT_TABLE {
            let Some(block) = build(config, context)? else {
                continue;
            };
            if block.bounds.is_empty() {
                continue;
            }
            layout.slices.push(ParameterSlice {
                component,
                start: layout.lower.len(),
                len: block.bounds.len(),
                shape: block.shape,
            });
            for (low, high) in block.bounds {
                layout.lower.push(low);
                layout.upper.push(high);
            }
            layout.labels.extend(block.labels);
        }
        Ok(layout)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    #[must_use]
    pub fn slices(&self) -> &[ParameterSlice] {
        &self.slices
    }

    #[must_use]
    pub fn slice(&self, component: Component) -> Option<&ParameterSlice> {
        self.slices.iter().find(|slice| slice.component == component)
    }

    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Check the length and box bounds of `params`.
    ///
    /// # Errors
    ///
    /// Returns the first violated coordinate as an `Infeasibility`.
    pub fn check_bounds(&self, params: &[f64]) -> Result<(), Infeasibility> {
        if params.len() != self.len() {
            return Err(Infeasibility::DimensionMismatch {
                expected: self.len(),
                found: params.len(),
            });
        }
        for (index, value) in params.iter().enumerate() {
            if !(self.lower[index]..=self.upper[index]).contains(value) {
                return Err(Infeasibility::PriorViolation { index });
            }
        }
        Ok(())
    }

    /// Log-density of the uniform box prior inside its support.
    #[must_use]
    pub fn log_box_density(&self) -> f64 {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(low, high)| -(high - low).ln())
            .sum()
    }
}

fn power_law_block(names: &[String], tag: &str, amplitude: (f64, f64)) -> Block {
    let mut block = Block::new(SliceShape::PowerLaw { count: names.len() });
    for name in names {
        block.push(format!("log10_A_{tag}_{name}"), amplitude);
    }
    for name in names {
        block.push(format!("gamma_{tag}_{name}"), SPECTRAL_INDEX);
    }
    block
}

fn free_spectrum_block(rows: &[String], tag: &str, modes: usize) -> Block {
    let mut block = Block::new(SliceShape::FreeSpectrum {
        rows: rows.len(),
        modes,
    });
    for row in rows {
        for k in 0..modes {
            block.push(format!("log10_rho_{tag}_{k}_{row}"), LOG10_RHO);
        }
    }
    block
}

fn red_noise_block(
    config: &RunConfiguration,
    context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    Ok(match config.red_noise {
        RedNoiseModel::Disabled | RedNoiseModel::Fixed => None,
        RedNoiseModel::PowerLaw => Some(power_law_block(
            &context.pulsar_names,
            "red",
            RED_LOG10_AMPLITUDE,
        )),
        RedNoiseModel::FreeSpectrum => Some(free_spectrum_block(
            &context.pulsar_names,
            "red",
            config.n_modes,
        )),
    })
}

fn dm_block(config: &RunConfiguration, context: &LayoutContext) -> Result<Option<Block>, PtaError> {
    Ok(config.dm.map(|dm| match dm.spectrum {
        SpectralModel::PowerLaw => {
            power_law_block(&context.pulsar_names, "dm", RED_LOG10_AMPLITUDE)
        }
        SpectralModel::FreeSpectrum => {
            free_spectrum_block(&context.pulsar_names, "dm", config.n_modes)
        }
    }))
}

fn ephemeris_block(
    config: &RunConfiguration,
    _context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let axes: Vec<String> = EPHEMERIS_AXES.iter().map(|axis| (*axis).to_owned()).collect();
    Ok(config.ephemeris.map(|eph| match eph.spectrum {
        SpectralModel::PowerLaw => power_law_block(&axes, "eph", RED_LOG10_AMPLITUDE),
        SpectralModel::FreeSpectrum => free_spectrum_block(&axes, "eph", config.n_modes),
    }))
}

fn gwb_spectrum_block(
    config: &RunConfiguration,
    _context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let Some(gwb) = &config.gwb else {
        return Ok(None);
    };
    let block = match gwb.spectrum {
        GwbSpectrum::PowerLaw { fixed_slope } => {
            let mut block = Block::new(if fixed_slope.is_some() {
                SliceShape::Block
            } else {
                SliceShape::PowerLaw { count: 1 }
            });
            block.push("log10_A_gwb", GWB_LOG10_AMPLITUDE);
            if fixed_slope.is_none() {
                block.push("gamma_gwb", SPECTRAL_INDEX);
            }
            block
        }
        GwbSpectrum::FreeSpectrum => {
            let mut block = Block::new(SliceShape::FreeSpectrum {
                rows: 1,
                modes: config.n_modes,
            });
            for k in 0..config.n_modes {
                block.push(format!("log10_rho_gwb_{k}"), LOG10_RHO);
            }
            block
        }
        GwbSpectrum::Turnover => {
            let mut block = Block::new(SliceShape::Block);
            block.push("log10_A_gwb", GWB_LOG10_AMPLITUDE);
            block.push("kappa_gwb", SPECTRAL_INDEX);
            block.push("log10_fbend_gwb", TURNOVER_LOG10_FBEND);
            block
        }
        GwbSpectrum::GpEnvelope { .. } => {
            let mut block = Block::new(SliceShape::Block);
            block.push("log10_A_gwb", GWB_LOG10_AMPLITUDE);
            block.push("ecc_gwb", ECCENTRICITY);
            block
        }
    };
    Ok(Some(block))
}

fn gwb_hyper_block(
    config: &RunConfiguration,
    _context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let Some(gwb) = &config.gwb else {
        return Ok(None);
    };
    if !matches!(gwb.prior, GwbPrior::GaussianProcess { .. }) {
        return Ok(None);
    }
    let mut block = Block::new(SliceShape::Block);
    match gwb.spectrum {
        GwbSpectrum::FreeSpectrum => {
            block.push("log10_A_gwb_hyper", GWB_LOG10_AMPLITUDE);
            block.push("ecc_gwb", ECCENTRICITY);
        }
        GwbSpectrum::Turnover => block.push("ecc_gwb", ECCENTRICITY),
        GwbSpectrum::PowerLaw { .. } | GwbSpectrum::GpEnvelope { .. } => return Ok(None),
    }
    Ok(Some(block))
}

fn gwb_correlation_block(
    config: &RunConfiguration,
    context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let Some(correlation) = config.gwb.as_ref().and_then(|gwb| gwb.correlation.as_ref()) else {
        return Ok(None);
    };
    let n_windows = correlation.windows.resolve(config.n_modes)?.len();
    let n_psr = context.pulsar_names.len();
    let mut block = Block::new(SliceShape::Block);
    match correlation.model {
        CorrelationModel::ModelIndependent => {
            if n_psr < 2 {
                return Err(PtaError::TooFewPulsars);
            }
            let n_pairs = n_psr * (n_psr - 1) / 2;
            for window in 0..n_windows {
                for value in 0..n_pairs {
                    block.push(
                        format!("phi_corr_win{window}_val{value}"),
                        HYPERSPHERE_ANGLE,
                    );
                }
            }
        }
        CorrelationModel::PointSource => {
            for window in 0..n_windows {
                block.push(format!("phi_gwb_win{window}"), AZIMUTH);
                block.push(format!("costheta_gwb_win{window}"), COS_POLAR);
            }
        }
        CorrelationModel::SphericalHarmonics { lmax, .. } => {
            let per_window = (lmax + 1) * (lmax + 1) - 1;
            for window in 0..n_windows {
                for value in 0..per_window {
                    block.push(
                        format!("clm_win{window}_val{value}"),
                        HARMONIC_COEFFICIENT,
                    );
                }
            }
        }
        CorrelationModel::Clock => return Ok(None),
    }
    Ok(Some(block))
}

fn line_block(
    config: &RunConfiguration,
    _context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    Ok(config.gw_line.map(|_| {
        let mut block = Block::new(SliceShape::Block);
        block.push("log10_rho_line", LOG10_RHO);
        block.push("log10_f_line", LINE_LOG10_FREQUENCY);
        block.push("phi_line", AZIMUTH);
        block.push("costheta_line", COS_POLAR);
        block
    }))
}

fn continuous_wave_block(
    config: &RunConfiguration,
    _context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let Some(DeterministicSignal::ContinuousWave { eccentric }) = config.deterministic else {
        return Ok(None);
    };
    let mut block = Block::new(SliceShape::Block);
    block.push("log10_mc", (6.0, 10.0));
    block.push("q", (0.1, 1.0));
    block.push("log10_dist", (0.0, 4.0));
    block.push("log10_forb", (-10.0, -7.0));
    block.push("phi_cw", AZIMUTH);
    block.push("costheta_cw", COS_POLAR);
    block.push("cosiota_cw", COS_POLAR);
    block.push("psi_cw", POLARIZATION);
    block.push("gamma0_cw", (0.0, PI));
    block.push("l0_cw", AZIMUTH);
    if eccentric {
        block.push("ecc_cw", (0.001, 0.9));
    }
    Ok(Some(block))
}

fn burst_block(
    config: &RunConfiguration,
    context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let Some(DeterministicSignal::BurstWithMemory { .. }) = config.deterministic else {
        return Ok(None);
    };
    let mut block = Block::new(SliceShape::Block);
    block.push("bwm_epoch", context.toa_range);
    block.push("log10_h_bwm", GWB_LOG10_AMPLITUDE);
    block.push("phi_bwm", AZIMUTH);
    block.push("costheta_bwm", COS_POLAR);
    block.push("psi_bwm", POLARIZATION);
    Ok(Some(block))
}

fn model_index_block(
    config: &RunConfiguration,
    _context: &LayoutContext,
) -> Result<Option<Block>, PtaError> {
    let Some(DeterministicSignal::BurstWithMemory {
        model_select: true, ..
    }) = config.deterministic
    else {
        return Ok(None);
    };
    let mut block = Block::new(SliceShape::Block);
    block.push("model_index", MODEL_INDEX);
    Ok(Some(block))
}
