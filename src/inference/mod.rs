//! Reusable result types shared between the posterior and an external sampler.

use std::fmt;

/// Stage of an evaluation at which a dense factorization was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolveStage {
    /// Per-mode cross-pulsar prior covariance.
    ModePrior { mode: usize },
    /// Per-pulsar Fourier-domain system in the independent regime.
    PulsarSystem { pulsar: usize },
    /// Global array-wide system in the correlated regime.
    GlobalSystem,
}

impl fmt::Display for SolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModePrior { mode } => write!(f, "prior covariance of mode {mode}"),
            Self::PulsarSystem { pulsar } => write!(f, "system of pulsar {pulsar}"),
            Self::GlobalSystem => write!(f, "global system"),
        }
    }
}

/// Reason a parameter vector has zero posterior probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infeasibility {
    /// Parameter vector length differs from the configured layout.
    DimensionMismatch { expected: usize, found: usize },
    /// Parameter at `index` lies outside its bounds (or is not finite).
    PriorViolation { index: usize },
    /// Anisotropic power map is negative somewhere on the sky in `window`.
    UnphysicalAnisotropy { window: usize },
    /// A positive-definite factorization failed.
    NumericalSingularity { stage: SolveStage },
}

/// Tagged log-probability: either a finite value or the reason it is `-inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogProbability {
    Feasible(f64),
    Infeasible(Infeasibility),
}

impl LogProbability {
    /// Scalar view for samplers: infeasible points map to negative infinity.
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::Feasible(value) => value,
            Self::Infeasible(_) => f64::NEG_INFINITY,
        }
    }

    #[must_use]
    pub const fn is_feasible(self) -> bool {
        matches!(self, Self::Feasible(_))
    }

    #[must_use]
    pub const fn infeasibility(self) -> Option<Infeasibility> {
        match self {
            Self::Feasible(_) => None,
            Self::Infeasible(reason) => Some(reason),
        }
    }
}

impl From<Result<f64, Infeasibility>> for LogProbability {
    fn from(result: Result<f64, Infeasibility>) -> Self {
        match result {
            Ok(value) if value.is_nan() => Self::Infeasible(Infeasibility::NumericalSingularity {
                stage: SolveStage::GlobalSystem,
            }),
            Ok(value) => Self::Feasible(value),
            Err(reason) => Self::Infeasible(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infeasible_values_map_to_negative_infinity() {
        let result = LogProbability::Infeasible(Infeasibility::PriorViolation { index: 3 });
        assert_eq!(result.value(), f64::NEG_INFINITY);
        assert!(!result.is_feasible());
        assert_eq!(
            result.infeasibility(),
            Some(Infeasibility::PriorViolation { index: 3 })
        );
    }

    #[test]
    fn nan_results_are_not_reported_as_feasible() {
        let result = LogProbability::from(Ok(f64::NAN));
        assert!(matches!(
            result,
            LogProbability::Infeasible(Infeasibility::NumericalSingularity { .. })
        ));
    }

    #[test]
    fn stage_display_names_the_pulsar() {
        assert_eq!(
            SolveStage::PulsarSystem { pulsar: 2 }.to_string(),
            "system of pulsar 2"
        );
    }
}
