//! Synthetic right-censored data for every supported family.
//!
//! Event times are drawn from the requested family. Censoring is
//! non-informative: an independent censoring time comes from the same family
//! shape with its scale calibrated in closed form so that the expected
//! censored fraction equals the requested `p`. The recorded observation is
//! `(min(T, C), T <= C)`.
//!
//! Calibration per family, with `q = BetaInv(p; alpha, alpha)`:
//! - exponential: `lambda_c = lambda * p / (1 - p)`
//! - Weibull: `lambda_c = lambda * (p / (1 - p))^(1/alpha)`
//! - gamma: `lambda_c = lambda * q / (1 - q)`
//! - generalized gamma: `lambda_c = lambda * (q / (1 - q))^(1/beta)`
//! - log-normal: `mu_c = mu - sigma * sqrt(2) * PhiInv(p)`

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp, Gamma as GammaSampler, LogNormal as LogNormalSampler,
    Weibull as WeibullSampler};
use statrs::distribution::{Beta, ContinuousCDF, Normal};

use crate::data::SurvivalData;
use crate::error::{Result, SurvivalError};
use crate::family::Family;

/// Draw `n` right-censored observations from `family` with the given native
/// parameters and expected censoring proportion `p` (a scalar in `[0, 1)`).
pub fn simulate(family: Family, n: usize, params: &[f64], p: f64, seed: u64) -> Result<SurvivalData> {
    if n == 0 {
        return Err(SurvivalError::invalid_survival_data("need at least one observation"));
    }
    family.validate_params(params)?;
    if !p.is_finite() || !(0.0..1.0).contains(&p) {
        return Err(SurvivalError::invalid_parameter("p", format!("{p}")));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let event_times = sample_event_times(family, params, n, &mut rng)?;

    if p == 0.0 {
        return SurvivalData::new(event_times, vec![true; n]);
    }

    let censor_params = censoring_params(family, params, p)?;
    let censor_times = sample_event_times(family, &censor_params, n, &mut rng)?;

    let mut times = Vec::with_capacity(n);
    let mut events = Vec::with_capacity(n);
    for (t, c) in event_times.into_iter().zip(censor_times) {
        times.push(t.min(c));
        events.push(t <= c);
    }
    SurvivalData::new(times, events)
}

/// Uncensored draws from a family (also used for the censoring arm).
fn sample_event_times(
    family: Family,
    params: &[f64],
    n: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let sampler_err =
        |e: rand_distr::ExpError| SurvivalError::numerical_error(format!("sampler: {e}"));
    let mut draws = Vec::with_capacity(n);
    match family {
        Family::Exponential => {
            let dist = Exp::new(params[0]).map_err(sampler_err)?;
            draws.extend((0..n).map(|_| dist.sample(rng)));
        }
        Family::Weibull => {
            // rand_distr uses the scale form, our rate is its reciprocal
            let dist = WeibullSampler::new(1.0 / params[1], params[0])
                .map_err(|e| SurvivalError::numerical_error(format!("sampler: {e}")))?;
            draws.extend((0..n).map(|_| dist.sample(rng)));
        }
        Family::Gamma => {
            let dist = GammaSampler::new(params[0], 1.0 / params[1])
                .map_err(|e| SurvivalError::numerical_error(format!("sampler: {e}")))?;
            draws.extend((0..n).map(|_| dist.sample(rng)));
        }
        Family::GenGamma => {
            // (lambda T)^beta is standard gamma with the same shape
            let dist = GammaSampler::new(params[0], 1.0)
                .map_err(|e| SurvivalError::numerical_error(format!("sampler: {e}")))?;
            let inv_beta = 1.0 / params[1];
            let inv_lambda = 1.0 / params[2];
            draws.extend((0..n).map(|_| dist.sample(rng).powf(inv_beta) * inv_lambda));
        }
        Family::LogNormal => {
            let dist = LogNormalSampler::new(params[0], params[1])
                .map_err(|e| SurvivalError::numerical_error(format!("sampler: {e}")))?;
            draws.extend((0..n).map(|_| dist.sample(rng)));
        }
    }
    // a zero draw is astronomically unlikely but would poison the carrier
    Ok(draws.into_iter().map(|t| t.max(f64::MIN_POSITIVE)).collect())
}

/// Native parameters of the censoring distribution for a target censoring
/// proportion.
fn censoring_params(family: Family, params: &[f64], p: f64) -> Result<Vec<f64>> {
    let odds = p / (1.0 - p);
    Ok(match family {
        Family::Exponential => vec![params[0] * odds],
        Family::Weibull => vec![params[0], params[1] * odds.powf(1.0 / params[0])],
        Family::Gamma => {
            let q = shape_balanced_beta_quantile(params[0], p)?;
            vec![params[0], params[1] * q / (1.0 - q)]
        }
        Family::GenGamma => {
            let q = shape_balanced_beta_quantile(params[0], p)?;
            vec![params[0], params[1], params[2] * (q / (1.0 - q)).powf(1.0 / params[1])]
        }
        Family::LogNormal => {
            let normal = Normal::new(0.0, 1.0)
                .map_err(|e| SurvivalError::numerical_error(format!("standard normal: {e}")))?;
            let shift = params[1] * std::f64::consts::SQRT_2 * normal.inverse_cdf(p);
            vec![params[0] - shift, params[1]]
        }
    })
}

/// `BetaInv(p; alpha, alpha)`: for two independent gammas with shape
/// `alpha`, `P(C < T)` depends on the rates only through
/// `Beta(alpha, alpha)`, which gives the censoring rate in closed form.
fn shape_balanced_beta_quantile(alpha: f64, p: f64) -> Result<f64> {
    let beta = Beta::new(alpha, alpha)
        .map_err(|e| SurvivalError::numerical_error(format!("beta quantile: {e}")))?;
    Ok(beta.inverse_cdf(p))
}
