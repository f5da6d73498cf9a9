//! Localized prior-draw jump proposals for an external sampler.
//!
//! Each proposal redraws a small group of coordinates of one component from
//! its prior and leaves the rest of the vector untouched. Offsets come from
//! the shared [`ParameterLayout`].

use rand::rngs::StdRng;

use super::layout::{Component, ParameterLayout, ParameterSlice, SliceShape};
use super::types::{AmplitudePrior, GwbPrior, GwbSpectrum, RunConfiguration};
use crate::utils::{sample_standard_normal, uniform_between, uniform_index};

const DEFAULT_WEIGHT: u32 = 10;
const MODEL_INDEX_WEIGHT: u32 = 5;

/// Which coordinates of a slice a proposal redraws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    /// Amplitude and spectral index of one member of a power-law block.
    PowerLawMember {
        count: usize,
        amplitude_prior: AmplitudePrior,
    },
    /// One coordinate chosen uniformly from the slice.
    SingleCoordinate,
    /// Every coordinate of the slice; the first is drawn from `amplitude_prior`
    /// when one is given.
    WholeBlock {
        amplitude_prior: Option<AmplitudePrior>,
    },
}

/// Proposed point and the log Hastings ratio `ln q(x|y) − ln q(y|x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraw {
    pub params: Vec<f64>,
    pub log_qxy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JumpProposal {
    pub name: String,
    pub component: Component,
    pub weight: u32,
    pub kind: ProposalKind,
    slice: ParameterSlice,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl JumpProposal {
    fn new(
        layout: &ParameterLayout,
        slice: ParameterSlice,
        kind: ProposalKind,
        weight: u32,
    ) -> Self {
        let range = slice.range();
        Self {
            name: format!("draw from {} prior", slice.component.name()),
            component: slice.component,
            weight,
            kind,
            lower: layout.lower()[range.clone()].to_vec(),
            upper: layout.upper()[range].to_vec(),
            slice,
        }
    }

    /// Indices of the full vector this proposal may change.
    #[must_use]
    pub const fn slice(&self) -> &ParameterSlice {
        &self.slice
    }

    /// Draw a new point from `current`.
    #[must_use]
    pub fn propose(&self, current: &[f64], rng: &mut StdRng) -> ProposalDraw {
        let mut params = current.to_vec();
        let mut log_qxy = 0.0;
        match self.kind {
            ProposalKind::PowerLawMember {
                count,
                amplitude_prior,
            } => {
                let member = uniform_index(rng, count);
                log_qxy += self.redraw(&mut params, member, Some(amplitude_prior), rng);
                self.redraw(&mut params, count + member, None, rng);
            }
            ProposalKind::SingleCoordinate => {
                let local = uniform_index(rng, self.slice.len);
                self.redraw(&mut params, local, None, rng);
            }
            ProposalKind::WholeBlock { amplitude_prior } => {
                for local in 0..self.slice.len {
                    let prior = if local == 0 { amplitude_prior } else { None };
                    log_qxy += self.redraw(&mut params, local, prior, rng);
                }
            }
        }
        ProposalDraw { params, log_qxy }
    }

    fn redraw(
        &self,
        params: &mut [f64],
        local: usize,
        prior: Option<AmplitudePrior>,
        rng: &mut StdRng,
    ) -> f64 {
        let index = self.slice.start + local;
        let old = params[index];
        let gaussian = match prior {
            Some(AmplitudePrior::Sesana) => Some(AmplitudePrior::SESANA),
            Some(AmplitudePrior::McWilliams) => Some(AmplitudePrior::MCWILLIAMS),
            _ => None,
        };
        if let Some((mean, std_dev)) = gaussian {
            let new = sample_standard_normal(rng).mul_add(std_dev, mean);
            params[index] = new;
            let two_var = 2.0 * std_dev * std_dev;
            (mean - new).powi(2) / two_var - (mean - old).powi(2) / two_var
        } else {
            params[index] = uniform_between(rng, self.lower[local], self.upper[local]);
            0.0
        }
    }
}

/// Build the proposal cycle for `config` from its resolved layout.
#[must_use]
pub fn jump_proposals(layout: &ParameterLayout, config: &RunConfiguration) -> Vec<JumpProposal> {
    layout
        .slices()
        .iter()
        .map(|slice| {
            let kind = proposal_kind(slice, config);
            let weight = if slice.component == Component::ModelIndex {
                MODEL_INDEX_WEIGHT
            } else {
                DEFAULT_WEIGHT
            };
            JumpProposal::new(layout, *slice, kind, weight)
        })
        .collect()
}

fn proposal_kind(slice: &ParameterSlice, config: &RunConfiguration) -> ProposalKind {
    let gwb = config.gwb.as_ref();
    let gwb_amplitude_prior = gwb.map(|gwb| match (gwb.prior, gwb.spectrum) {
        (GwbPrior::Amplitude(prior), _) => prior,
        (GwbPrior::GaussianProcess { hyper }, GwbSpectrum::Turnover) => hyper,
        (GwbPrior::GaussianProcess { .. }, _) => AmplitudePrior::LogUniform,
    });
    match (slice.component, slice.shape) {
        (_, SliceShape::PowerLaw { count }) => ProposalKind::PowerLawMember {
            count,
            amplitude_prior: if slice.component == Component::GwbSpectrum {
                gwb_amplitude_prior.unwrap_or_default()
            } else {
                AmplitudePrior::LogUniform
            },
        },
        (_, SliceShape::FreeSpectrum { .. }) => ProposalKind::SingleCoordinate,
        (Component::GwbSpectrum, SliceShape::Block) => ProposalKind::WholeBlock {
            amplitude_prior: gwb_amplitude_prior,
        },
        (Component::GwbHyper, SliceShape::Block) => ProposalKind::WholeBlock {
            amplitude_prior: gwb.and_then(|gwb| match (gwb.prior, gwb.spectrum) {
                (GwbPrior::GaussianProcess { hyper }, GwbSpectrum::FreeSpectrum) => Some(hyper),
                _ => None,
            }),
        },
        (Component::ModelIndex, _) => ProposalKind::WholeBlock {
            amplitude_prior: None,
        },
        _ => ProposalKind::SingleCoordinate,
    }
}
