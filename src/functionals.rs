//! Summary functionals of a fitted distribution and their delta-method
//! uncertainty.
//!
//! Mean, median, variance, and restricted mean survival time are computed
//! from closed forms wherever the family admits one. The fallbacks are
//! bisection on `S(t) = 0.5` for the median and adaptive Simpson quadrature
//! for the RMST. Gradients are analytic when the closed form is, central
//! finite differences otherwise, and always feed the delta method
//! `SE = sqrt(grad' Sigma grad)`.
//!
//! All four functionals are strictly positive, so confidence intervals are
//! formed on the log scale and exponentiated. That keeps lower bounds
//! positive without truncation.

use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::error::{Result, SurvivalError};
use crate::family::Family;
use crate::likelihood::{exp_clamped, log_survival};

const LN_2: f64 = std::f64::consts::LN_2;

/// Which summary of the fitted distribution is being estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionalKind {
    Mean,
    Median,
    Variance,
    /// Restricted mean survival time up to the truncation point.
    Rmst(f64),
}

impl std::fmt::Display for FunctionalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionalKind::Mean => write!(f, "mean"),
            FunctionalKind::Median => write!(f, "median"),
            FunctionalKind::Variance => write!(f, "variance"),
            FunctionalKind::Rmst(tau) => write!(f, "rmst({tau})"),
        }
    }
}

/// A functional with its delta-method uncertainty.
#[derive(Debug, Clone)]
pub struct FunctionalEstimate {
    pub kind: FunctionalKind,
    pub estimate: f64,
    pub se: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Gradient of the functional in the native parameterization, as used
    /// for the standard error.
    pub gradient: Array1<f64>,
}

// ---------------------------------------------------------------------------
// Normal helpers
// ---------------------------------------------------------------------------

/// Upper `1 - sig/2` standard normal quantile.
pub(crate) fn z_quantile(sig: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SurvivalError::numerical_error(format!("standard normal: {e}")))?;
    Ok(normal.inverse_cdf(1.0 - sig / 2.0))
}

/// Two-sided p-value of a standard normal z statistic.
pub(crate) fn two_sided_p(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2)
}

// ---------------------------------------------------------------------------
// Point values
// ---------------------------------------------------------------------------

/// Raw moment `E[T^k]` of the generalized gamma.
fn gen_gamma_moment(theta: &[f64], k: f64) -> f64 {
    let (alpha, beta, lambda) = (theta[0], theta[1], theta[2]);
    exp_clamped(ln_gamma(alpha + k / beta) - ln_gamma(alpha) - k * lambda.ln())
}

fn mean_value(family: Family, theta: &[f64]) -> f64 {
    match family {
        Family::Exponential => 1.0 / theta[0],
        Family::Gamma => theta[0] / theta[1],
        Family::Weibull => exp_clamped(ln_gamma(1.0 + 1.0 / theta[0])) / theta[1],
        Family::LogNormal => (theta[0] + 0.5 * theta[1] * theta[1]).exp(),
        Family::GenGamma => gen_gamma_moment(theta, 1.0),
    }
}

fn variance_value(family: Family, theta: &[f64]) -> f64 {
    match family {
        Family::Exponential => 1.0 / (theta[0] * theta[0]),
        Family::Gamma => theta[0] / (theta[1] * theta[1]),
        Family::Weibull => {
            let g1 = exp_clamped(ln_gamma(1.0 + 1.0 / theta[0]));
            let g2 = exp_clamped(ln_gamma(1.0 + 2.0 / theta[0]));
            (g2 - g1 * g1) / (theta[1] * theta[1])
        }
        Family::LogNormal => {
            let s2 = theta[1] * theta[1];
            (s2.exp() - 1.0) * (2.0 * theta[0] + s2).exp()
        }
        Family::GenGamma => {
            let m1 = gen_gamma_moment(theta, 1.0);
            gen_gamma_moment(theta, 2.0) - m1 * m1
        }
    }
}

fn median_value(family: Family, theta: &[f64]) -> Result<f64> {
    match family {
        Family::Exponential => Ok(LN_2 / theta[0]),
        Family::Weibull => Ok(LN_2.powf(1.0 / theta[0]) / theta[1]),
        Family::LogNormal => Ok(theta[0].exp()),
        Family::Gamma | Family::GenGamma => median_by_bisection(family, theta),
    }
}

/// Solve `S(t) = 1/2` by bisection; `S` is monotone so the bracket is
/// `[0, hi]` once `hi` is doubled past the median.
fn median_by_bisection(family: Family, theta: &[f64]) -> Result<f64> {
    let surv = |t: f64| log_survival(family, theta, t).exp();

    let mut hi = mean_value(family, theta).max(1e-12);
    let mut tries = 0;
    while surv(hi) > 0.5 {
        hi *= 2.0;
        tries += 1;
        if tries > 200 {
            return Err(SurvivalError::quadrature_failure(
                "median bisection could not bracket S(t) = 0.5",
            ));
        }
    }

    let mut lo = 0.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if surv(mid) > 0.5 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 * hi.max(1.0) {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// `RMST(tau) = integral of S over [0, tau]`. Closed form for the
/// exponential, adaptive Simpson for everything else.
fn rmst_value(family: Family, theta: &[f64], tau: f64) -> Result<f64> {
    if family == Family::Exponential {
        let lambda = theta[0];
        return Ok((1.0 - (-lambda * tau).exp()) / lambda);
    }
    let surv = |t: f64| log_survival(family, theta, t).exp();
    adaptive_simpson(&surv, 0.0, tau, 1e-9)
}

/// Adaptive Simpson quadrature with interval-halving error control.
fn adaptive_simpson<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64, tol: f64) -> Result<f64> {
    fn simpson(fa: f64, fm: f64, fb: f64, a: f64, b: f64) -> f64 {
        (b - a) / 6.0 * (fa + 4.0 * fm + fb)
    }

    #[allow(clippy::too_many_arguments)]
    fn recurse<F: Fn(f64) -> f64>(
        f: &F,
        a: f64,
        b: f64,
        fa: f64,
        fm: f64,
        fb: f64,
        whole: f64,
        tol: f64,
        depth: usize,
    ) -> Result<f64> {
        if depth > 50 {
            return Err(SurvivalError::quadrature_failure(format!(
                "could not reach tolerance {tol:e} on [{a}, {b}]"
            )));
        }
        let m = 0.5 * (a + b);
        let lm = 0.5 * (a + m);
        let rm = 0.5 * (m + b);
        let flm = f(lm);
        let frm = f(rm);
        let left = simpson(fa, flm, fm, a, m);
        let right = simpson(fm, frm, fb, m, b);
        let delta = left + right - whole;
        if delta.abs() <= 15.0 * tol {
            return Ok(left + right + delta / 15.0);
        }
        let l = recurse(f, a, m, fa, flm, fm, left, tol / 2.0, depth + 1)?;
        let r = recurse(f, m, b, fm, frm, fb, right, tol / 2.0, depth + 1)?;
        Ok(l + r)
    }

    let m = 0.5 * (a + b);
    let (fa, fm, fb) = (f(a), f(m), f(b));
    let whole = simpson(fa, fm, fb, a, b);
    recurse(f, a, b, fa, fm, fb, whole, tol, 0)
}

/// Point value of a functional at native parameters.
pub(crate) fn functional_value(family: Family, theta: &[f64], kind: FunctionalKind) -> Result<f64> {
    match kind {
        FunctionalKind::Mean => Ok(mean_value(family, theta)),
        FunctionalKind::Variance => Ok(variance_value(family, theta)),
        FunctionalKind::Median => median_value(family, theta),
        FunctionalKind::Rmst(tau) => rmst_value(family, theta, tau),
    }
}

// ---------------------------------------------------------------------------
// Gradients
// ---------------------------------------------------------------------------

fn mean_gradient(family: Family, theta: &[f64]) -> Vec<f64> {
    let g = mean_value(family, theta);
    match family {
        Family::Exponential => vec![-g / theta[0]],
        Family::Gamma => vec![1.0 / theta[1], -g / theta[1]],
        Family::Weibull => {
            let alpha = theta[0];
            vec![-g * digamma(1.0 + 1.0 / alpha) / (alpha * alpha), -g / theta[1]]
        }
        Family::LogNormal => vec![g, g * theta[1]],
        Family::GenGamma => {
            let (alpha, beta) = (theta[0], theta[1]);
            vec![
                g * (digamma(alpha + 1.0 / beta) - digamma(alpha)),
                -g * digamma(alpha + 1.0 / beta) / (beta * beta),
                -g / theta[2],
            ]
        }
    }
}

fn variance_gradient(family: Family, theta: &[f64]) -> Vec<f64> {
    match family {
        Family::Exponential => vec![-2.0 / theta[0].powi(3)],
        Family::Gamma => {
            let l2 = theta[1] * theta[1];
            vec![1.0 / l2, -2.0 * theta[0] / (l2 * theta[1])]
        }
        Family::Weibull => {
            let (alpha, lambda) = (theta[0], theta[1]);
            let g1 = exp_clamped(ln_gamma(1.0 + 1.0 / alpha));
            let g2 = exp_clamped(ln_gamma(1.0 + 2.0 / alpha));
            let dg1 = -g1 * digamma(1.0 + 1.0 / alpha) / (alpha * alpha);
            let dg2 = -2.0 * g2 * digamma(1.0 + 2.0 / alpha) / (alpha * alpha);
            let var = (g2 - g1 * g1) / (lambda * lambda);
            vec![(dg2 - 2.0 * g1 * dg1) / (lambda * lambda), -2.0 * var / lambda]
        }
        Family::LogNormal => {
            let (mu, sigma) = (theta[0], theta[1]);
            let s2 = sigma * sigma;
            let var = (s2.exp() - 1.0) * (2.0 * mu + s2).exp();
            vec![2.0 * var, 2.0 * sigma * (2.0 * mu + s2).exp() * (2.0 * s2.exp() - 1.0)]
        }
        Family::GenGamma => {
            let (alpha, beta, lambda) = (theta[0], theta[1], theta[2]);
            let m1 = gen_gamma_moment(theta, 1.0);
            let m2 = gen_gamma_moment(theta, 2.0);
            let psi1 = digamma(alpha + 1.0 / beta);
            let psi2 = digamma(alpha + 2.0 / beta);
            let psi0 = digamma(alpha);
            let dm1 = [m1 * (psi1 - psi0), -m1 * psi1 / (beta * beta), -m1 / lambda];
            let dm2 = [m2 * (psi2 - psi0), -2.0 * m2 * psi2 / (beta * beta), -2.0 * m2 / lambda];
            (0..3).map(|j| dm2[j] - 2.0 * m1 * dm1[j]).collect()
        }
    }
}

fn median_gradient(family: Family, theta: &[f64]) -> Result<Option<Vec<f64>>> {
    Ok(match family {
        Family::Exponential => Some(vec![-LN_2 / (theta[0] * theta[0])]),
        Family::Weibull => {
            let alpha = theta[0];
            let med = median_value(family, theta)?;
            Some(vec![-med * LN_2.ln() / (alpha * alpha), -med / theta[1]])
        }
        Family::LogNormal => Some(vec![theta[0].exp(), 0.0]),
        // bisection medians differentiate numerically
        Family::Gamma | Family::GenGamma => None,
    })
}

fn rmst_gradient(family: Family, theta: &[f64], tau: f64) -> Option<Vec<f64>> {
    if family == Family::Exponential {
        let lambda = theta[0];
        let e = (-lambda * tau).exp();
        return Some(vec![(tau * e * lambda - (1.0 - e)) / (lambda * lambda)]);
    }
    None
}

/// Central finite differences with a step proportional to the parameter
/// scale, for the functionals without an analytic gradient.
fn numeric_gradient(family: Family, theta: &[f64], kind: FunctionalKind) -> Result<Vec<f64>> {
    let mut grad = vec![0.0; theta.len()];
    for j in 0..theta.len() {
        let h = 1e-5 * theta[j].abs().max(1e-3);
        let mut hi = theta.to_vec();
        let mut lo = theta.to_vec();
        hi[j] += h;
        lo[j] -= h;
        grad[j] =
            (functional_value(family, &hi, kind)? - functional_value(family, &lo, kind)?)
                / (2.0 * h);
    }
    Ok(grad)
}

fn functional_gradient(family: Family, theta: &[f64], kind: FunctionalKind) -> Result<Vec<f64>> {
    let analytic = match kind {
        FunctionalKind::Mean => Some(mean_gradient(family, theta)),
        FunctionalKind::Variance => Some(variance_gradient(family, theta)),
        FunctionalKind::Median => median_gradient(family, theta)?,
        FunctionalKind::Rmst(tau) => rmst_gradient(family, theta, tau),
    };
    match analytic {
        Some(g) => Ok(g),
        None => numeric_gradient(family, theta, kind),
    }
}

// ---------------------------------------------------------------------------
// Delta method
// ---------------------------------------------------------------------------

/// Estimate a functional with its delta-method standard error and a Wald
/// interval on the log scale.
pub(crate) fn evaluate_functional(
    family: Family,
    theta: &[f64],
    covariance: &Array2<f64>,
    kind: FunctionalKind,
    z: f64,
) -> Result<FunctionalEstimate> {
    let estimate = functional_value(family, theta, kind)?;
    if !estimate.is_finite() || estimate <= 0.0 {
        return Err(SurvivalError::numerical_error(format!(
            "functional {kind} evaluated to {estimate}"
        )));
    }
    let gradient = Array1::from(functional_gradient(family, theta, kind)?);
    let var = gradient.dot(&covariance.dot(&gradient));
    let se = var.max(0.0).sqrt();

    // log-scale interval keeps the lower bound positive
    let se_log = se / estimate;
    let ci_lower = (estimate.ln() - z * se_log).exp();
    let ci_upper = (estimate.ln() + z * se_log).exp();

    Ok(FunctionalEstimate { kind, estimate, se, ci_lower, ci_upper, gradient })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn exponential_closed_forms() {
        let theta = [2.0];
        assert_relative_eq!(mean_value(Family::Exponential, &theta), 0.5, epsilon = 1e-12);
        assert_relative_eq!(variance_value(Family::Exponential, &theta), 0.25, epsilon = 1e-12);
        assert_relative_eq!(
            median_value(Family::Exponential, &theta).unwrap(),
            LN_2 / 2.0,
            epsilon = 1e-12
        );
        // RMST(tau) -> mean as tau grows
        let rmst = rmst_value(Family::Exponential, &theta, 50.0).unwrap();
        assert_relative_eq!(rmst, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn gamma_mean_variance() {
        let theta = [2.0, 2.0];
        assert_relative_eq!(mean_value(Family::Gamma, &theta), 1.0, epsilon = 1e-12);
        assert_relative_eq!(variance_value(Family::Gamma, &theta), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn weibull_median_closed_form_matches_survival_half() {
        let theta = [1.8, 0.9];
        let med = median_value(Family::Weibull, &theta).unwrap();
        let s = log_survival(Family::Weibull, &theta, med).exp();
        assert_relative_eq!(s, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn gamma_median_by_bisection() {
        let theta = [2.0, 2.0];
        let med = median_value(Family::Gamma, &theta).unwrap();
        let s = log_survival(Family::Gamma, &theta, med).exp();
        assert_relative_eq!(s, 0.5, epsilon = 1e-8);
        // gamma(2, 2) median = gamma(2, 1) median / 2, known to be ~0.8392
        assert_relative_eq!(med, 0.8392, epsilon = 1e-3);
    }

    #[test]
    fn gen_gamma_reduces_to_weibull_functionals() {
        // gen-gamma with alpha = 1 is a Weibull with shape beta
        let gg = [1.0, 2.0, 1.5];
        let wb = [2.0, 1.5];
        assert_relative_eq!(
            mean_value(Family::GenGamma, &gg),
            mean_value(Family::Weibull, &wb),
            epsilon = 1e-10
        );
        assert_relative_eq!(
            variance_value(Family::GenGamma, &gg),
            variance_value(Family::Weibull, &wb),
            epsilon = 1e-10
        );
        assert_relative_eq!(
            median_value(Family::GenGamma, &gg).unwrap(),
            median_value(Family::Weibull, &wb).unwrap(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn rmst_quadrature_matches_exponential_closed_form() {
        // Weibull with alpha = 1 is exponential, so Simpson must agree
        let rmst_w = rmst_value(Family::Weibull, &[1.0, 2.0], 0.8).unwrap();
        let rmst_e = rmst_value(Family::Exponential, &[2.0], 0.8).unwrap();
        assert_relative_eq!(rmst_w, rmst_e, epsilon = 1e-8);
    }

    #[test]
    fn rmst_gamma_known_value() {
        // integral of (1 + 2t) e^(-2t) on [0, 0.5] = 1 - 1.5/e
        let rmst = rmst_value(Family::Gamma, &[2.0, 2.0], 0.5).unwrap();
        assert_relative_eq!(rmst, 1.0 - 1.5 * (-1.0_f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn analytic_gradients_match_finite_differences() {
        let cases: Vec<(Family, Vec<f64>)> = vec![
            (Family::Exponential, vec![1.7]),
            (Family::Gamma, vec![2.2, 1.4]),
            (Family::Weibull, vec![1.6, 0.8]),
            (Family::LogNormal, vec![0.4, 0.7]),
            (Family::GenGamma, vec![1.8, 1.3, 0.9]),
        ];
        for (family, theta) in cases {
            for kind in [FunctionalKind::Mean, FunctionalKind::Variance, FunctionalKind::Median] {
                let g = functional_gradient(family, &theta, kind).unwrap();
                let g_fd = numeric_gradient(family, &theta, kind).unwrap();
                for j in 0..theta.len() {
                    assert_relative_eq!(g[j], g_fd[j], epsilon = 1e-4, max_relative = 1e-4);
                }
            }
        }
    }

    #[test]
    fn exponential_rmst_gradient_matches_fd() {
        let theta = [1.3];
        let kind = FunctionalKind::Rmst(0.9);
        let g = functional_gradient(Family::Exponential, &theta, kind).unwrap();
        let g_fd = numeric_gradient(Family::Exponential, &theta, kind).unwrap();
        assert_relative_eq!(g[0], g_fd[0], epsilon = 1e-6, max_relative = 1e-6);
    }

    #[test]
    fn delta_method_interval_is_positive_and_ordered() {
        let theta = [2.0, 2.0];
        let cov = arr2(&[[0.01, 0.002], [0.002, 0.01]]);
        let est =
            evaluate_functional(Family::Gamma, &theta, &cov, FunctionalKind::Mean, 1.96).unwrap();
        assert!(est.se > 0.0);
        assert!(est.ci_lower > 0.0);
        assert!(est.ci_lower < est.estimate);
        assert!(est.estimate < est.ci_upper);
    }

    #[test]
    fn normal_helpers() {
        assert_relative_eq!(z_quantile(0.05).unwrap(), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(two_sided_p(1.959964), 0.05, epsilon = 1e-5);
        assert_relative_eq!(two_sided_p(0.0), 1.0, epsilon = 1e-12);
    }
}
