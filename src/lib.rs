#![forbid(unsafe_code)]

//! # `pta_likelihood`
//!
//! Posterior and likelihood evaluation for gravitational-wave searches with
//! pulsar timing arrays: noise and signal covariances in a reduced Fourier
//! basis, their stable inversion, prior Jacobians, and localized jump
//! proposals for an external sampler.
//!
//! Datasets are supplied fully formed as [`Pulsar`] values; the crate does not
//! fit timing models or read timing files.

pub mod inference;
pub mod input;
pub mod models;
pub mod utils;

pub use inference::{Infeasibility, LogProbability, SolveStage};
pub use input::{
    FixedRedNoise, FrequencyGrid, JitterEpoch, JitterModel, ModeBlocks, Pulsar, PulsarError,
    SkyPosition,
};
pub mod matrix_ops {
    pub use crate::models::matrix_ops::*;
}
pub mod sky {
    pub use crate::models::pta::sky::*;
}
pub mod spectrum {
    pub use crate::models::pta::spectrum::*;
}

pub use models::pta::{
    AmplitudePrior, BurstWithMemory, BwmAntenna, Collaborators, Component, CorrelationBasis,
    CorrelationConfig, CorrelationModel, DeterministicSignal, EnvelopeInterpolant,
    EnvelopePrediction, FrequencyWindows, GwLineConfig, GwbConfig, GwbPrior, GwbSpectrum,
    JumpProposal, NoiseComponent, OptimalStatistic, ParameterLayout, ParameterSlice,
    PosteriorTerms, ProposalDraw, ProposalKind, PtaError, PtaPosterior, RedNoiseModel,
    ResidualOracle, RunConfiguration, SliceShape, SpectralModel, render_parameter_table,
};
