//! Evaluate a correlated background posterior on a small synthetic array and
//! run a short Metropolis–Hastings chain with the built-in jump proposals.
//!
//! ```text
//! cargo run --example array_posterior
//! ```

use std::f64::consts::TAU;

use faer::Mat;
use pta_likelihood::input::reduced_design;
use pta_likelihood::utils::{sample_standard_normal, usize_to_f64};
use pta_likelihood::{
    Collaborators, FrequencyGrid, ModeBlocks, Pulsar, PtaError, PtaPosterior, RunConfiguration,
    SkyPosition, render_parameter_table,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

const CONFIG: &str = r#"{
    "n_modes": 6,
    "red_noise": "power_law",
    "gwb": {
        "spectrum": {"model": "power_law", "fixed_slope": 4.333333333333333},
        "prior": {"amplitude": "log_uniform"},
        "correlation": {"model": {"model": "clock"}}
    }
}"#;

const YEAR: f64 = 365.25 * 86_400.0;
const TOA_ERROR: f64 = 2.0e-7;

fn synthetic_pulsars(n_psr: usize, n_toas: usize, n_modes: usize) -> Result<Vec<Pulsar>, PtaError> {
    let mut rng = StdRng::seed_from_u64(2026);
    let toas: Vec<f64> = (0..n_toas)
        .map(|i| 6.0 * YEAR * usize_to_f64(i) / usize_to_f64(n_toas - 1))
        .collect();
    let grid = FrequencyGrid::spanning([toas.as_slice()], n_modes)?;
    let half = 3.0 * YEAR;
    let timing = Mat::from_fn(n_toas, 2, |i, j| if j == 0 { 1.0 } else { toas[i] / half - 1.0 });

    let mut pulsars = Vec::with_capacity(n_psr);
    for p in 0..n_psr {
        let name = format!("PSR{p:02}");
        let position = SkyPosition::new(
            (1.3 * usize_to_f64(p)) % TAU,
            0.8 * (0.9 * usize_to_f64(p)).sin(),
        );
        let residuals = toas
            .iter()
            .map(|t| {
                let common = 4.0e-7 * (TAU * t / (4.0 * YEAR)).sin();
                sample_standard_normal(&mut rng).mul_add(TOA_ERROR, common)
            })
            .collect();
        let design = reduced_design(
            &name,
            &timing,
            &toas,
            &[],
            position,
            &grid,
            ModeBlocks::default(),
        )?;
        pulsars.push(Pulsar::new(
            name,
            toas.clone(),
            residuals,
            vec![TOA_ERROR; n_toas],
            position,
            design,
            timing.ncols(),
        ));
    }
    Ok(pulsars)
}

fn main() -> Result<(), PtaError> {
    let config = RunConfiguration::from_json_str(CONFIG)?;
    let pulsars = synthetic_pulsars(5, 80, config.n_modes)?;
    let posterior = PtaPosterior::new(pulsars, config, Collaborators::default())?;

    let (lower, upper) = posterior.bounds();
    let mut current: Vec<f64> = lower.iter().zip(upper).map(|(l, u)| 0.5 * (l + u)).collect();
    let mut current_value = posterior.log_posterior(&current).value();
    println!("{posterior:?}");
    println!("log posterior at the box centre: {current_value:.3}");

    let proposals = posterior.jump_proposals();
    let total_weight: u32 = proposals.iter().map(|p| p.weight).sum();
    let mut rng = StdRng::seed_from_u64(7);
    let mut accepted = 0_usize;
    let steps = 400;
    for _ in 0..steps {
        let mut ticket = rng.random_range(0..total_weight);
        let Some(proposal) = proposals.iter().find(|p| {
            if ticket < p.weight {
                true
            } else {
                ticket -= p.weight;
                false
            }
        }) else {
            continue;
        };
        let draw = proposal.propose(&current, &mut rng);
        let value = posterior.log_posterior(&draw.params).value();
        if value.is_finite() && (value - current_value + draw.log_qxy) > rng.random::<f64>().ln() {
            current = draw.params;
            current_value = value;
            accepted += 1;
        }
    }
    println!(
        "acceptance {:.2} after {steps} steps, final log posterior {current_value:.3}",
        usize_to_f64(accepted) / usize_to_f64(steps)
    );
    println!("{}", render_parameter_table(posterior.layout(), Some(&current)));

    match posterior.optimal_statistic(&current) {
        Ok(os) => println!(
            "optimal statistic: A² = {:.3e} ± {:.3e} (S/N {:.2})",
            os.amplitude_squared, os.sigma, os.snr
        ),
        Err(reason) => println!("optimal statistic unavailable: {reason:?}"),
    }
    Ok(())
}
