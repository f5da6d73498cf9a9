//! Gaussian-process posterior for pulsar-timing-array searches.
//!
//! Intrinsic red noise, DM variations, ephemeris errors, a stochastic GW
//! background with several spectral and correlation models, a monochromatic
//! GW line, and deterministic continuous-wave or burst-with-memory signals
//! share one reduced Fourier basis. The timing model is marginalized
//! analytically; the coefficients are integrated out in closed form.

pub mod correlation;
pub mod covariance;
pub mod deterministic;
pub mod layout;
pub mod noise;
pub mod optimal;
pub mod posterior;
pub mod priors;
pub mod proposals;
pub mod report;
pub mod sky;
pub mod spectrum;
pub mod types;

pub use correlation::{CorrelationBasis, CorrelationEngine};
pub use covariance::{LinearSystem, ModePriors, marginal_log_likelihood};
pub use deterministic::{BurstWithMemory, ResidualOracle, signal_selected};
pub use layout::{Component, LayoutContext, ParameterLayout, ParameterSlice, SliceShape};
pub use noise::{FixedNoiseCache, ProjectedResiduals, PulsarNoise, WhiteNoise};
pub use optimal::{OptimalStatistic, optimal_statistic};
pub use posterior::{Collaborators, PosteriorTerms, PtaPosterior};
pub use proposals::{JumpProposal, ProposalDraw, ProposalKind, jump_proposals};
pub use report::render_parameter_table;
pub use sky::{AntennaPattern, HarmonicGrid, antenna_pattern, hellings_downs_matrix};
pub use spectrum::{EnvelopeInterpolant, EnvelopePrediction};
pub use types::{
    AmplitudePrior, BwmAntenna, CorrelationConfig, CorrelationModel, DeterministicSignal,
    FrequencyWindows, GwLineConfig, GwbConfig, GwbPrior, GwbSpectrum, NoiseComponent, PtaError,
    RedNoiseModel, RunConfiguration, SpectralModel,
};
