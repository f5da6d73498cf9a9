mod common;

use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use approx::assert_relative_eq;
use faer::Mat;
use pta_likelihood::matrix_ops::{CholeskySolver, DenseSolver, FaerCholeskySolver};
use pta_likelihood::models::pta::covariance::{ModePriors, global_system, pulsar_system};
use pta_likelihood::models::pta::noise::PulsarNoise;
use pta_likelihood::sky::hellings_downs_matrix;
use pta_likelihood::spectrum::{SECONDS_PER_YEAR, power_law};
use pta_likelihood::{
    Collaborators, Component, CorrelationBasis, CorrelationConfig, CorrelationModel,
    FixedRedNoise, GwbConfig, GwbPrior, GwbSpectrum, Infeasibility, ModeBlocks, PtaPosterior,
    RedNoiseModel, RunConfiguration, SolveStage,
};

use common::{TOA_ERROR, noise_value, point, synthetic_array};

const N_MODES: usize = 5;
const N_TOAS: usize = 48;

fn gwb(correlation: Option<CorrelationModel>) -> GwbConfig {
    GwbConfig {
        spectrum: GwbSpectrum::PowerLaw { fixed_slope: None },
        prior: GwbPrior::default(),
        correlation: correlation.map(|model| CorrelationConfig {
            model,
            ..CorrelationConfig::default()
        }),
    }
}

fn config(gwb: Option<GwbConfig>) -> RunConfiguration {
    RunConfiguration {
        n_modes: N_MODES,
        gwb,
        ..RunConfiguration::default()
    }
}

fn posterior(n_psr: usize, config: RunConfiguration) -> PtaPosterior {
    PtaPosterior::new(
        synthetic_array(n_psr, N_TOAS, N_MODES, config.mode_blocks(), 7),
        config,
        Collaborators::default(),
    )
    .expect("posterior")
}

fn log_likelihood(posterior: &PtaPosterior, params: &[f64]) -> f64 {
    posterior
        .evaluate(params)
        .expect("feasible point")
        .log_likelihood
}

#[test]
fn out_of_bounds_parameters_are_infeasible() {
    let posterior = posterior(2, config(Some(gwb(None))));
    let mut params = point(&posterior, noise_value);
    assert!(posterior.log_posterior(&params).is_feasible());

    params[0] = -25.0;
    let value = posterior.log_posterior(&params);
    assert_eq!(
        value.infeasibility(),
        Some(Infeasibility::PriorViolation { index: 0 })
    );
    assert!(value.value().is_infinite() && value.value() < 0.0);
    assert!(!posterior.log_prior(&params).is_feasible());

    params[0] = f64::NAN;
    assert!(!posterior.log_posterior(&params).is_feasible());

    assert!(matches!(
        posterior.log_posterior(&params[1..]).infeasibility(),
        Some(Infeasibility::DimensionMismatch { .. })
    ));
}

#[test]
fn noise_only_posterior_is_a_sum_of_pulsar_terms() {
    let posterior = posterior(3, config(None));
    let params = point(&posterior, noise_value);
    let grid = posterior.frequency_grid();
    let red = power_law(-14.5, 3.5, grid.frequencies(), grid.tspan());

    let expected: f64 = posterior
        .pulsars()
        .iter()
        .enumerate()
        .map(|(p, pulsar)| {
            let noise = PulsarNoise::compute(pulsar, true);
            let (system, _) = pulsar_system(
                p,
                &noise,
                &noise.projected,
                pulsar.timing_columns,
                &red,
            )
            .expect("system");
            let marginal = system
                .marginal_log_likelihood(&CholeskySolver, SolveStage::PulsarSystem { pulsar: p })
                .expect("factor");
            marginal + noise.white_log_likelihood(noise.residual_chi2)
        })
        .sum();

    assert_relative_eq!(
        log_likelihood(&posterior, &params),
        expected,
        max_relative = 1.0e-10
    );
}

#[test]
fn identity_correlations_match_uncorrelated_background() {
    let correlated = posterior(3, config(Some(gwb(Some(CorrelationModel::ModelIndependent)))));
    let independent = posterior(3, config(Some(gwb(None))));
    assert!(correlated.config().is_correlated());
    assert!(!independent.config().is_correlated());

    let identity = |label: &str| {
        if label.starts_with("phi_corr") {
            Some(FRAC_PI_2)
        } else {
            noise_value(label)
        }
    };
    let a = log_likelihood(&correlated, &point(&correlated, identity));
    let b = log_likelihood(&independent, &point(&independent, noise_value));
    assert_relative_eq!(a, b, max_relative = 1.0e-9);
}

#[test]
fn single_pulsar_regimes_agree() {
    let clock = posterior(1, config(Some(gwb(Some(CorrelationModel::Clock)))));
    let plain = posterior(1, config(Some(gwb(None))));
    assert_eq!(clock.parameter_count(), plain.parameter_count());

    let params = point(&plain, noise_value);
    assert_relative_eq!(
        log_likelihood(&clock, &params),
        log_likelihood(&plain, &params),
        max_relative = 1.0e-10
    );
}

#[test]
fn free_spectrum_reproduces_power_law() {
    let power_law_config = config(None);
    let free_config = RunConfiguration {
        red_noise: RedNoiseModel::FreeSpectrum,
        ..config(None)
    };
    let by_power_law = posterior(2, power_law_config);
    let by_coefficients = posterior(2, free_config);

    let grid = by_power_law.frequency_grid();
    let powers = power_law(-14.5, 3.5, grid.frequencies(), grid.tspan());
    let rho: Vec<f64> = powers
        .iter()
        .map(|p| 0.5 * (p * grid.tspan()).log10())
        .collect();

    let free_params: Vec<f64> = (0..2).flat_map(|_| rho.iter().copied()).collect();
    assert_eq!(free_params.len(), by_coefficients.parameter_count());
    assert_relative_eq!(
        log_likelihood(&by_coefficients, &free_params),
        log_likelihood(&by_power_law, &point(&by_power_law, noise_value)),
        max_relative = 1.0e-9
    );
}

fn harmonic_basis(posterior_pulsars: usize) -> CorrelationBasis {
    let positions: Vec<_> = (0..posterior_pulsars).map(common::position).collect();
    let hd = hellings_downs_matrix(&positions);
    let monopole = Mat::from_fn(posterior_pulsars, posterior_pulsars, |i, j| {
        hd[(i.min(j), i.max(j))] / (2.0 * PI.sqrt())
    });
    let mut matrices = vec![monopole];
    for k in 1..4 {
        let scale = 0.05 * common::idx_to_f64(k);
        matrices.push(Mat::from_fn(posterior_pulsars, posterior_pulsars, |i, j| {
            if i == j { scale } else { 0.5 * scale }
        }));
    }
    CorrelationBasis::new(matrices)
}

#[test]
fn negative_dipole_is_unphysical() {
    let config = config(Some(gwb(Some(CorrelationModel::SphericalHarmonics {
        lmax: 1,
        physical_prior: true,
    }))));
    let pulsars = synthetic_array(3, N_TOAS, N_MODES, config.mode_blocks(), 7);
    let posterior = PtaPosterior::new(
        pulsars,
        config,
        Collaborators {
            correlation_basis: Some(harmonic_basis(3)),
            ..Collaborators::default()
        },
    )
    .expect("posterior");

    let slice = *posterior
        .layout()
        .slice(Component::GwbCorrelation)
        .expect("harmonic coefficients");
    assert_eq!(slice.len, 3);

    let mut params = point(&posterior, noise_value);
    params[slice.range()].copy_from_slice(&[0.0, 0.0, 0.0]);
    assert!(posterior.log_posterior(&params).is_feasible());

    params[slice.range()].copy_from_slice(&[0.0, -9.5, 0.0]);
    assert_eq!(
        posterior.log_posterior(&params).infeasibility(),
        Some(Infeasibility::UnphysicalAnisotropy { window: 0 })
    );
    assert!(!posterior.log_prior(&params).is_feasible());
}

#[test]
fn fixed_red_noise_matches_dense_linear_algebra() {
    let config = RunConfiguration {
        n_modes: N_MODES,
        red_noise: RedNoiseModel::Fixed,
        ..RunConfiguration::default()
    };
    let pulsar = synthetic_array(1, N_TOAS, N_MODES, ModeBlocks::default(), 11)
        .remove(0)
        .with_fixed_red_noise(FixedRedNoise {
            log10_amplitude: -15.0,
            spectral_index: 3.0,
        });
    let posterior =
        PtaPosterior::new(vec![pulsar.clone()], config, Collaborators::default()).expect("posterior");
    assert_eq!(posterior.parameter_count(), 0);

    let grid = posterior.frequency_grid();
    let tspan = grid.tspan();
    let f_yr = SECONDS_PER_YEAR.recip();
    let (amplitude, gamma) = (1.0e-15_f64, 3.0);
    let powers: Vec<f64> = grid
        .frequencies()
        .iter()
        .map(|f| {
            amplitude * amplitude / (12.0 * PI * PI) * f_yr.powf(gamma - 3.0) * f.powf(-gamma)
                / tspan
        })
        .collect();

    let design = &pulsar.design;
    let (n, m) = (design.nrows(), design.ncols());
    let weight = TOA_ERROR.powi(-2);
    let mut sigma = Mat::from_fn(m, m, |i, j| {
        (0..n).map(|t| design[(t, i)] * design[(t, j)] * weight).sum::<f64>()
    });
    for (k, power) in powers.iter().enumerate() {
        for offset in 0..2 {
            let column = pulsar.timing_columns + 2 * k + offset;
            sigma[(column, column)] += power.recip();
        }
    }
    let d = Mat::from_fn(m, 1, |i, _| {
        (0..n).map(|t| design[(t, i)] * pulsar.residuals[t] * weight).sum::<f64>()
    });
    let sigma_factor = CholeskySolver.factor(&sigma).expect("positive definite");
    let solution = sigma_factor.solve(&d);

    let log_det_n = 2.0 * common::idx_to_f64(n) * TOA_ERROR.ln();
    let chi2: f64 = pulsar.residuals.iter().map(|r| r * r * weight).sum();
    let log_det_phi: f64 = powers.iter().map(|p| 2.0 * p.ln()).sum();
    let log_det_sigma = sigma_factor.log_det();
    let quadratic: f64 = (0..m).map(|i| d[(i, 0)] * solution[(i, 0)]).sum();
    let expected =
        -0.5 * (log_det_n + chi2) - 0.5 * (log_det_phi + log_det_sigma) + 0.5 * quadratic;

    let value = posterior.log_posterior(&[]).value();
    assert_relative_eq!(value, expected, max_relative = 1.0e-8);
}

#[test]
fn clock_correlated_system_is_symmetric_and_factorable() {
    let pulsars = synthetic_array(3, N_TOAS, N_MODES, ModeBlocks::default(), 3);
    let grid = pta_likelihood::FrequencyGrid::spanning(
        pulsars.iter().map(|p| p.toas.as_slice()),
        N_MODES,
    )
    .expect("grid");
    let red = power_law(-14.0, 4.0, grid.frequencies(), grid.tspan());
    let background = power_law(-14.2, 13.0 / 3.0, grid.frequencies(), grid.tspan());

    let noise: Vec<PulsarNoise> = pulsars.iter().map(|p| PulsarNoise::compute(p, false)).collect();
    let projected: Vec<&Mat<f64>> = noise.iter().map(|n| &n.projected).collect();
    let timing: Vec<usize> = pulsars.iter().map(|p| p.timing_columns).collect();
    let priors = ModePriors {
        diagonal: vec![red.iter().zip(&background).map(|(r, g)| r + g).collect(); 3],
        cross: Some(background.iter().map(|g| Mat::from_fn(3, 3, |_, _| *g)).collect()),
    };

    let system =
        global_system(&FaerCholeskySolver, &noise, &projected, &timing, &priors).expect("system");
    let matrix = &system.matrix;
    let dim = matrix.nrows();
    assert_eq!(dim, 3 * (3 + 2 * N_MODES));
    for i in 0..dim {
        for j in 0..i {
            assert_eq!(matrix[(i, j)].to_bits(), matrix[(j, i)].to_bits());
        }
    }

    let lower = FaerCholeskySolver
        .factor(matrix)
        .expect("positive definite")
        .lower();
    let scale = (0..dim).map(|i| matrix[(i, i)].abs()).fold(0.0, f64::max);
    for i in 0..dim {
        for j in 0..=i {
            let rebuilt: f64 = (0..=j).map(|k| lower[(i, k)] * lower[(j, k)]).sum();
            assert!((rebuilt - matrix[(i, j)]).abs() <= 1.0e-10 * scale);
        }
    }

    let posterior = posterior(3, config(Some(gwb(Some(CorrelationModel::Clock)))));
    assert!(posterior.log_posterior(&point(&posterior, noise_value)).is_feasible());
}

#[test]
fn evaluation_is_idempotent_across_threads() {
    let posterior = Arc::new(posterior(
        3,
        config(Some(gwb(Some(CorrelationModel::PointSource)))),
    ));
    let params = point(&posterior, noise_value);
    let reference = posterior.log_posterior(&params).value();
    assert!(reference.is_finite());
    assert_eq!(
        posterior.log_posterior(&params).value().to_bits(),
        reference.to_bits()
    );

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let posterior = Arc::clone(&posterior);
                let params = params.clone();
                scope.spawn(move || posterior.log_posterior(&params).value())
            })
            .collect();
        for handle in handles {
            let value = handle.join().expect("worker thread");
            assert_eq!(value.to_bits(), reference.to_bits());
        }
    });
}
