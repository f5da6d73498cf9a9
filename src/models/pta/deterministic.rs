//! Deterministic signals subtracted from the residuals before the Gaussian likelihood.

use super::sky::antenna_pattern;
use super::types::BwmAntenna;
use crate::input::Pulsar;

/// Timing-residual waveform of a deterministic signal.
///
/// `params` is the signal's own slice of the parameter vector. The returned
/// vector has one entry per TOA of `pulsar`, in seconds.
pub trait ResidualOracle: Send + Sync {
    fn signal(&self, pulsar: &Pulsar, params: &[f64]) -> Vec<f64>;
}

impl<F> ResidualOracle for F
where
    F: Fn(&Pulsar, &[f64]) -> Vec<f64> + Send + Sync,
{
    fn signal(&self, pulsar: &Pulsar, params: &[f64]) -> Vec<f64> {
        self(pulsar, params)
    }
}

/// Gravitational-wave burst with memory: a ramp starting at the burst epoch.
///
/// Parameters are `[epoch (s), log10 h, φ, cos θ, ψ]`; the residual is
/// `R · h · (t − t₀) · H(t − t₀)` with `R` the projected antenna response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BurstWithMemory {
    pub antenna: BwmAntenna,
}

impl BurstWithMemory {
    #[must_use]
    pub const fn new(antenna: BwmAntenna) -> Self {
        Self { antenna }
    }

    /// Projected antenna response of `pulsar` for source angles and polarization.
    #[must_use]
    pub fn response(&self, pulsar: &Pulsar, phi: f64, cos_theta: f64, psi: f64) -> f64 {
        let pattern = antenna_pattern(phi, cos_theta.clamp(-1.0, 1.0).acos(), pulsar.position);
        let (sin_2psi, cos_2psi) = (2.0 * psi).sin_cos();
        let quadrupolar = cos_2psi.mul_add(pattern.plus, sin_2psi * pattern.cross);
        match self.antenna {
            BwmAntenna::Quadrupolar => quadrupolar,
            BwmAntenna::Monopolar => 1.0,
            BwmAntenna::AbsoluteQuadrupolar => quadrupolar.abs(),
        }
    }
}

impl ResidualOracle for BurstWithMemory {
    fn signal(&self, pulsar: &Pulsar, params: &[f64]) -> Vec<f64> {
        let &[epoch, log10_strain, phi, cos_theta, psi, ..] = params else {
            return vec![0.0; pulsar.n_toas()];
        };
        let scale = self.response(pulsar, phi, cos_theta, psi) * 10_f64.powf(log10_strain);
        pulsar
            .toas
            .iter()
            .map(|t| {
                let elapsed = t - epoch;
                if elapsed > 0.0 { scale * elapsed } else { 0.0 }
            })
            .collect()
    }
}

/// Whether a model-selection index selects the signal model.
///
/// The index is rounded half-to-even; `0` is noise only, anything larger
/// includes the signal.
#[must_use]
pub fn signal_selected(model_index: f64) -> bool {
    model_index.round_ties_even() >= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SkyPosition;
    use approx::assert_relative_eq;
    use faer::Mat;

    fn pulsar() -> Pulsar {
        let toas = vec![0.0, 10.0, 20.0, 30.0];
        Pulsar::new(
            "J0437-4715",
            toas,
            vec![0.0; 4],
            vec![1.0e-7; 4],
            SkyPosition::new(1.2, -0.8),
            Mat::from_fn(4, 1, |_, _| 1.0),
            1,
        )
    }

    #[test]
    fn burst_is_zero_before_epoch_and_linear_after() {
        let bwm = BurstWithMemory::new(BwmAntenna::Monopolar);
        let signal = bwm.signal(&pulsar(), &[15.0, -12.0, 0.3, 0.1, 0.7]);
        assert!(signal[0].abs() < f64::EPSILON);
        assert!(signal[1].abs() < f64::EPSILON);
        assert_relative_eq!(signal[2], 5.0e-12, max_relative = 1.0e-12);
        assert_relative_eq!(signal[3], 15.0e-12, max_relative = 1.0e-12);
    }

    #[test]
    fn absolute_pattern_is_non_negative() {
        let psr = pulsar();
        let quad = BurstWithMemory::new(BwmAntenna::Quadrupolar);
        let abs = BurstWithMemory::new(BwmAntenna::AbsoluteQuadrupolar);
        for psi in [0.0, 0.4, 1.1, 2.9] {
            let q = quad.response(&psr, 2.0, -0.3, psi);
            let a = abs.response(&psr, 2.0, -0.3, psi);
            assert_relative_eq!(a, q.abs(), epsilon = 1.0e-15);
        }
    }

    #[test]
    fn polarization_rotates_by_half_turn() {
        let psr = pulsar();
        let quad = BurstWithMemory::new(BwmAntenna::Quadrupolar);
        let a = quad.response(&psr, 0.5, 0.2, 0.3);
        let b = quad.response(&psr, 0.5, 0.2, 0.3 + std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(a, -b, epsilon = 1.0e-12);
    }

    #[test]
    fn closures_act_as_oracles() {
        let oracle = |pulsar: &Pulsar, params: &[f64]| vec![params[0]; pulsar.n_toas()];
        assert_eq!(oracle.signal(&pulsar(), &[2.0]), vec![2.0; 4]);
    }

    #[test]
    fn model_index_rounds_half_to_even() {
        assert!(!signal_selected(-0.4));
        assert!(!signal_selected(0.5));
        assert!(signal_selected(0.51));
        assert!(signal_selected(1.5));
    }
}
