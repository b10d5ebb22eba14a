//! Right-censored log-likelihood kernels for the parametric families.
//!
//! Each observation contributes `d * log f(u) + (1 - d) * log S(u)`. The
//! kernels evaluate the negative log-likelihood and its analytic gradient in
//! the unconstrained parameterization used by the optimizer: positive
//! parameters enter as logs, the log-normal location enters as-is.
//!
//! Tail quantities go through library special functions (`ln_gamma`,
//! regularized incomplete gamma, `erfc`) so that `log S` stays accurate when
//! the survival probability is tiny.

use ndarray::Array2;
use statrs::function::erf::erfc;
use statrs::function::gamma::{digamma, gamma_ur, ln_gamma};

use crate::data::SurvivalData;
use crate::family::Family;

/// Floor for survival probabilities before taking logs.
pub(crate) const MIN_TAIL: f64 = 1e-300;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Standard normal density.
#[inline]
pub(crate) fn normal_phi(z: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    (-0.5 * z * z).exp() * INV_SQRT_2PI
}

/// Standard normal CDF via `erfc` for better tail behavior.
#[inline]
pub(crate) fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Exponential with a conservative clamp so line searches never see inf.
#[inline]
pub(crate) fn exp_clamped(x: f64) -> f64 {
    x.clamp(-700.0, 700.0).exp()
}

/// `log Q(a, x)` where `Q` is the regularized upper incomplete gamma.
#[inline]
fn ln_gamma_sf(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    gamma_ur(a, x).max(MIN_TAIL).ln()
}

/// `d/da log Q(a, x)` by central differences (no closed form exists).
#[inline]
fn dln_gamma_sf_da(a: f64, x: f64) -> f64 {
    let h = 1e-6 * a.abs().max(1.0);
    if a - h > 0.0 {
        (ln_gamma_sf(a + h, x) - ln_gamma_sf(a - h, x)) / (2.0 * h)
    } else {
        (ln_gamma_sf(a + h, x) - ln_gamma_sf(a, x)) / h
    }
}

/// `d/dx log Q(a, x) = -x^(a-1) e^(-x) / (Gamma(a) Q(a, x))`.
#[inline]
fn dln_gamma_sf_dx(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let q = gamma_ur(a, x).max(MIN_TAIL);
    -exp_clamped((a - 1.0) * x.ln() - x - ln_gamma(a)) / q
}

// ---------------------------------------------------------------------------
// Parameter transforms
// ---------------------------------------------------------------------------

/// Native parameters to the unconstrained optimizer scale.
pub(crate) fn theta_to_eta(family: Family, theta: &[f64]) -> Vec<f64> {
    theta
        .iter()
        .enumerate()
        .map(|(j, &v)| if family.param_is_positive(j) { v.ln() } else { v })
        .collect()
}

/// Optimizer scale back to the native parameterization.
pub(crate) fn eta_to_theta(family: Family, eta: &[f64]) -> Vec<f64> {
    eta.iter()
        .enumerate()
        .map(|(j, &v)| if family.param_is_positive(j) { exp_clamped(v) } else { v })
        .collect()
}

// ---------------------------------------------------------------------------
// Per-observation log-likelihood and score, per family
// ---------------------------------------------------------------------------

/// Exponential, native `(lambda)`. Returns `(loglik, score_eta)`.
#[inline]
fn obs_exponential(lambda: f64, u: f64, d: bool) -> (f64, [f64; 1]) {
    let ll = if d { lambda.ln() - lambda * u } else { -lambda * u };
    let s = if d { 1.0 - lambda * u } else { -lambda * u };
    (ll, [s])
}

/// Weibull, native `(alpha, lambda)` with `S(t) = exp(-(lambda t)^alpha)`.
#[inline]
fn obs_weibull(alpha: f64, log_lambda: f64, u_ln: f64, d: bool) -> (f64, [f64; 2]) {
    let m = log_lambda + u_ln; // ln(lambda * u)
    let w = alpha * m;
    let e = exp_clamped(w); // (lambda * u)^alpha

    let mut ll = -e;
    let d_f = if d { 1.0 } else { 0.0 };
    if d {
        ll += alpha.ln() + alpha * log_lambda + (alpha - 1.0) * u_ln;
    }
    // d ll / d log_alpha = d*(1 + w) - e*w
    // d ll / d log_lambda = alpha*(d - e)
    (ll, [d_f * (1.0 + w) - e * w, alpha * (d_f - e)])
}

/// Gamma, native `(alpha, lambda)` with rate `lambda`.
#[inline]
fn obs_gamma(alpha: f64, lambda: f64, u: f64, u_ln: f64, d: bool) -> (f64, [f64; 2]) {
    let x = lambda * u;
    if d {
        let ll = alpha * lambda.ln() + (alpha - 1.0) * u_ln - x - ln_gamma(alpha);
        let s_a = alpha * (lambda.ln() + u_ln - digamma(alpha));
        let s_l = alpha - x;
        (ll, [s_a, s_l])
    } else {
        let ll = ln_gamma_sf(alpha, x);
        let s_a = alpha * dln_gamma_sf_da(alpha, x);
        let s_l = dln_gamma_sf_dx(alpha, x) * x;
        (ll, [s_a, s_l])
    }
}

/// Generalized gamma, native `(alpha, beta, lambda)` with
/// `S(t) = Q(alpha, (lambda t)^beta)`.
#[inline]
fn obs_gen_gamma(
    alpha: f64,
    beta: f64,
    log_lambda: f64,
    u_ln: f64,
    d: bool,
) -> (f64, [f64; 3]) {
    let m = log_lambda + u_ln; // ln(lambda * u)
    let x = exp_clamped(beta * m);
    if d {
        let ll = beta.ln() + log_lambda - ln_gamma(alpha) + (alpha * beta - 1.0) * m - x;
        let s_a = alpha * (beta * m - digamma(alpha));
        let s_b = 1.0 + beta * m * (alpha - x);
        let s_l = beta * (alpha - x);
        (ll, [s_a, s_b, s_l])
    } else {
        let ll = ln_gamma_sf(alpha, x);
        let dq_dx = dln_gamma_sf_dx(alpha, x);
        let s_a = alpha * dln_gamma_sf_da(alpha, x);
        let s_b = dq_dx * x * beta * m;
        let s_l = dq_dx * x * beta;
        (ll, [s_a, s_b, s_l])
    }
}

/// Log-normal, native `(mu, sigma)`; score is in `(mu, log_sigma)`.
#[inline]
fn obs_log_normal(mu: f64, sigma: f64, u_ln: f64, d: bool) -> (f64, [f64; 2]) {
    let z = (u_ln - mu) / sigma;
    if d {
        let ll = -u_ln - sigma.ln() - LN_SQRT_2PI - 0.5 * z * z;
        (ll, [z / sigma, z * z - 1.0])
    } else {
        let surv = normal_cdf(-z).max(MIN_TAIL);
        let ratio = normal_phi(z) / surv; // Mills ratio of the upper tail
        (surv.ln(), [ratio / sigma, ratio * z])
    }
}

// ---------------------------------------------------------------------------
// Kernels over a dataset
// ---------------------------------------------------------------------------

/// Negative log-likelihood plus analytic gradient on the optimizer scale.
pub(crate) trait LikelihoodKernel {
    fn dim(&self) -> usize;
    fn nll(&self, eta: &[f64]) -> f64;
    fn grad_nll(&self, eta: &[f64]) -> Vec<f64>;
}

macro_rules! sum_kernel {
    ($self:ident, $eta:ident, $p:expr, $obs:expr) => {{
        let mut ll = 0.0;
        let mut grad = [0.0; $p];
        let times = $self.data.times();
        let ln_times = $self.data.ln_times();
        let events = $self.data.events();
        for i in 0..$self.data.n_samples() {
            let (l, s) = $obs(times[i], ln_times[i], events[i]);
            ll += l;
            for j in 0..$p {
                grad[j] += s[j];
            }
        }
        let _ = $eta;
        (ll, grad)
    }};
}

pub(crate) struct ExponentialKernel<'a> {
    pub data: &'a SurvivalData,
}

impl LikelihoodKernel for ExponentialKernel<'_> {
    fn dim(&self) -> usize {
        1
    }

    fn nll(&self, eta: &[f64]) -> f64 {
        let lambda = exp_clamped(eta[0]);
        // loglik = n_events * log_lambda - lambda * sum_t
        -(self.data.n_events() as f64 * eta[0] - lambda * self.data.sum_t())
    }

    fn grad_nll(&self, eta: &[f64]) -> Vec<f64> {
        let lambda = exp_clamped(eta[0]);
        vec![-(self.data.n_events() as f64 - lambda * self.data.sum_t())]
    }
}

pub(crate) struct WeibullKernel<'a> {
    pub data: &'a SurvivalData,
}

impl LikelihoodKernel for WeibullKernel<'_> {
    fn dim(&self) -> usize {
        2
    }

    fn nll(&self, eta: &[f64]) -> f64 {
        let alpha = exp_clamped(eta[0]);
        let (ll, _) = sum_kernel!(self, eta, 2, |_t, lt, d| obs_weibull(alpha, eta[1], lt, d));
        -ll
    }

    fn grad_nll(&self, eta: &[f64]) -> Vec<f64> {
        let alpha = exp_clamped(eta[0]);
        let (_, g) = sum_kernel!(self, eta, 2, |_t, lt, d| obs_weibull(alpha, eta[1], lt, d));
        vec![-g[0], -g[1]]
    }
}

pub(crate) struct GammaKernel<'a> {
    pub data: &'a SurvivalData,
}

impl LikelihoodKernel for GammaKernel<'_> {
    fn dim(&self) -> usize {
        2
    }

    fn nll(&self, eta: &[f64]) -> f64 {
        let alpha = exp_clamped(eta[0]);
        let lambda = exp_clamped(eta[1]);
        let (ll, _) = sum_kernel!(self, eta, 2, |t, lt, d| obs_gamma(alpha, lambda, t, lt, d));
        -ll
    }

    fn grad_nll(&self, eta: &[f64]) -> Vec<f64> {
        let alpha = exp_clamped(eta[0]);
        let lambda = exp_clamped(eta[1]);
        let (_, g) = sum_kernel!(self, eta, 2, |t, lt, d| obs_gamma(alpha, lambda, t, lt, d));
        vec![-g[0], -g[1]]
    }
}

pub(crate) struct GenGammaKernel<'a> {
    pub data: &'a SurvivalData,
}

impl LikelihoodKernel for GenGammaKernel<'_> {
    fn dim(&self) -> usize {
        3
    }

    fn nll(&self, eta: &[f64]) -> f64 {
        let alpha = exp_clamped(eta[0]);
        let beta = exp_clamped(eta[1]);
        let (ll, _) =
            sum_kernel!(self, eta, 3, |_t, lt, d| obs_gen_gamma(alpha, beta, eta[2], lt, d));
        -ll
    }

    fn grad_nll(&self, eta: &[f64]) -> Vec<f64> {
        let alpha = exp_clamped(eta[0]);
        let beta = exp_clamped(eta[1]);
        let (_, g) =
            sum_kernel!(self, eta, 3, |_t, lt, d| obs_gen_gamma(alpha, beta, eta[2], lt, d));
        vec![-g[0], -g[1], -g[2]]
    }
}

/// Generalized gamma with `beta` pinned: the inner model of the outer search.
pub(crate) struct GenGammaProfileKernel<'a> {
    pub data: &'a SurvivalData,
    pub log_beta: f64,
}

impl GenGammaProfileKernel<'_> {
    #[inline]
    fn expand(&self, eta: &[f64]) -> [f64; 3] {
        [eta[0], self.log_beta, eta[1]]
    }
}

impl LikelihoodKernel for GenGammaProfileKernel<'_> {
    fn dim(&self) -> usize {
        2
    }

    fn nll(&self, eta: &[f64]) -> f64 {
        GenGammaKernel { data: self.data }.nll(&self.expand(eta))
    }

    fn grad_nll(&self, eta: &[f64]) -> Vec<f64> {
        let g = GenGammaKernel { data: self.data }.grad_nll(&self.expand(eta));
        vec![g[0], g[2]]
    }
}

pub(crate) struct LogNormalKernel<'a> {
    pub data: &'a SurvivalData,
}

impl LikelihoodKernel for LogNormalKernel<'_> {
    fn dim(&self) -> usize {
        2
    }

    fn nll(&self, eta: &[f64]) -> f64 {
        let sigma = exp_clamped(eta[1]);
        let (ll, _) = sum_kernel!(self, eta, 2, |_t, lt, d| obs_log_normal(eta[0], sigma, lt, d));
        -ll
    }

    fn grad_nll(&self, eta: &[f64]) -> Vec<f64> {
        let sigma = exp_clamped(eta[1]);
        let (_, g) = sum_kernel!(self, eta, 2, |_t, lt, d| obs_log_normal(eta[0], sigma, lt, d));
        vec![-g[0], -g[1]]
    }
}

// ---------------------------------------------------------------------------
// Per-observation native scores (for the sandwich covariance)
// ---------------------------------------------------------------------------

/// `n x p` matrix of per-observation scores in the native parameterization.
pub(crate) fn observation_scores(
    family: Family,
    data: &SurvivalData,
    theta: &[f64],
) -> Array2<f64> {
    let n = data.n_samples();
    let p = family.n_params();
    let mut scores = Array2::zeros((n, p));
    let times = data.times();
    let ln_times = data.ln_times();
    let events = data.events();

    for i in 0..n {
        let (u, lu, d) = (times[i], ln_times[i], events[i]);
        let s_eta: Vec<f64> = match family {
            Family::Exponential => obs_exponential(theta[0], u, d).1.to_vec(),
            Family::Weibull => obs_weibull(theta[0], theta[1].ln(), lu, d).1.to_vec(),
            Family::Gamma => obs_gamma(theta[0], theta[1], u, lu, d).1.to_vec(),
            Family::GenGamma => {
                obs_gen_gamma(theta[0], theta[1], theta[2].ln(), lu, d).1.to_vec()
            }
            Family::LogNormal => obs_log_normal(theta[0], theta[1], lu, d).1.to_vec(),
        };
        // chain rule back from the log scale: d ll / d theta = (d ll / d eta) / theta
        for j in 0..p {
            scores[[i, j]] =
                if family.param_is_positive(j) { s_eta[j] / theta[j] } else { s_eta[j] };
        }
    }
    scores
}

/// Score of the full log-likelihood in the native parameterization.
pub(crate) fn native_score(family: Family, data: &SurvivalData, theta: &[f64]) -> Vec<f64> {
    let scores = observation_scores(family, data, theta);
    (0..family.n_params()).map(|j| scores.column(j).sum()).collect()
}

// ---------------------------------------------------------------------------
// Fitted-curve evaluators
// ---------------------------------------------------------------------------

/// `log S(t)` for native parameters. `t <= 0` gives 0 (survival is 1 there).
pub(crate) fn log_survival(family: Family, theta: &[f64], t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    match family {
        Family::Exponential => -theta[0] * t,
        Family::Weibull => -exp_clamped(theta[0] * (theta[1] * t).ln()),
        Family::Gamma => ln_gamma_sf(theta[0], theta[1] * t),
        Family::GenGamma => ln_gamma_sf(theta[0], exp_clamped(theta[1] * (theta[2] * t).ln())),
        Family::LogNormal => {
            let z = (t.ln() - theta[0]) / theta[1];
            normal_cdf(-z).max(MIN_TAIL).ln()
        }
    }
}

/// `log f(t)` for native parameters.
pub(crate) fn log_density(family: Family, theta: &[f64], t: f64) -> f64 {
    if t <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let lt = t.ln();
    match family {
        Family::Exponential => obs_exponential(theta[0], t, true).0,
        Family::Weibull => obs_weibull(theta[0], theta[1].ln(), lt, true).0,
        Family::Gamma => obs_gamma(theta[0], theta[1], t, lt, true).0,
        Family::GenGamma => obs_gen_gamma(theta[0], theta[1], theta[2].ln(), lt, true).0,
        Family::LogNormal => obs_log_normal(theta[0], theta[1], lt, true).0,
    }
}

/// `log h(t) = log f(t) - log S(t)`.
pub(crate) fn log_hazard(family: Family, theta: &[f64], t: f64) -> f64 {
    log_density(family, theta, t) - log_survival(family, theta, t)
}
