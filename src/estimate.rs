//! Maximum-likelihood estimators for the parametric families.
//!
//! All iterative fitting happens on the unconstrained scale (logs of the
//! positive parameters). Closed forms are used where they exist: the
//! exponential rate, the uncensored log-normal moments, and the Weibull rate
//! profiled out of the shape equation. The generalized gamma runs a bracketed
//! outer search over its weakly identified power parameter with a
//! Newton-Raphson inner loop.
//!
//! Non-convergence is not an error: the last iterate is returned with a flag
//! and downstream covariance falls back to the robust sandwich.

use ndarray::Array2;

use crate::data::SurvivalData;
use crate::error::{Result, SurvivalError};
use crate::family::Family;
use crate::likelihood::{
    self, GenGammaKernel, GenGammaProfileKernel, LikelihoodKernel, WeibullKernel,
};

/// Shared controls for the iterative estimators.
#[derive(Debug, Clone, Copy)]
pub struct FitControl {
    /// Convergence threshold on both the step size and the relative change
    /// in log-likelihood.
    pub eps: f64,
    /// Iteration cap. Hitting it is reported through the convergence flag.
    pub maxit: usize,
    /// Log outer-search progress for the generalized gamma.
    pub report: bool,
}

impl Default for FitControl {
    fn default() -> Self {
        Self { eps: 1e-6, maxit: 100, report: false }
    }
}

/// Point estimate produced by a family estimator.
#[derive(Debug, Clone)]
pub(crate) struct Estimate {
    pub theta: Vec<f64>,
    pub loglik: f64,
    pub converged: bool,
    pub n_iter: usize,
}

// ---------------------------------------------------------------------------
// Newton-Raphson driver
// ---------------------------------------------------------------------------

struct NewtonOutcome {
    eta: Vec<f64>,
    nll: f64,
    converged: bool,
    n_iter: usize,
}

/// Hessian of the NLL on the optimizer scale by forward differences of the
/// analytic gradient, symmetrized.
fn fd_hessian(kernel: &dyn LikelihoodKernel, eta: &[f64], grad: &[f64]) -> Array2<f64> {
    let n = eta.len();
    let mut hessian = Array2::zeros((n, n));
    for j in 0..n {
        let eps = 1e-5 * eta[j].abs().max(1.0);
        let mut eta_plus = eta.to_vec();
        eta_plus[j] += eps;
        let grad_plus = kernel.grad_nll(&eta_plus);
        for i in 0..n {
            hessian[[i, j]] = (grad_plus[i] - grad[i]) / eps;
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (hessian[[i, j]] + hessian[[j, i]]);
            hessian[[i, j]] = avg;
            hessian[[j, i]] = avg;
        }
    }
    hessian
}

/// Halve the step until the objective stops increasing.
fn backtrack(
    kernel: &dyn LikelihoodKernel,
    eta: &[f64],
    step: &[f64],
    nll: f64,
) -> Option<(Vec<f64>, f64)> {
    let mut scale = 1.0;
    for _ in 0..30 {
        let candidate: Vec<f64> =
            eta.iter().zip(step.iter()).map(|(e, s)| e - scale * s).collect();
        let nll_new = kernel.nll(&candidate);
        if nll_new.is_finite() && nll_new <= nll + 1e-12 {
            return Some((candidate, nll_new));
        }
        scale *= 0.5;
    }
    None
}

/// Newton-Raphson with step halving on the unconstrained scale.
fn newton_raphson(kernel: &dyn LikelihoodKernel, eta0: Vec<f64>, ctl: &FitControl) -> NewtonOutcome {
    let mut eta = eta0;
    let mut nll = kernel.nll(&eta);
    let mut converged = false;
    let mut n_iter = 0;

    for _ in 0..ctl.maxit {
        n_iter += 1;
        let gradient = kernel.grad_nll(&eta);
        if gradient.iter().any(|g| !g.is_finite()) {
            break;
        }
        let hessian = fd_hessian(kernel, &eta, &gradient);

        let newton_step = solve_linear_system(&hessian, &gradient).ok();
        let mut accepted = newton_step.and_then(|step| backtrack(kernel, &eta, &step, nll));
        if accepted.is_none() {
            // singular Hessian or an ascent direction: try plain descent
            let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt().max(1.0);
            let descent: Vec<f64> = gradient.iter().map(|g| g / norm).collect();
            accepted = backtrack(kernel, &eta, &descent, nll);
        }
        let Some((candidate, nll_new)) = accepted else {
            break;
        };

        let max_step =
            candidate.iter().zip(eta.iter()).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max);
        let rel_change = (nll - nll_new).abs() / (nll.abs() + 1.0);

        eta = candidate;
        nll = nll_new;

        if max_step < ctl.eps && rel_change < ctl.eps {
            converged = true;
            break;
        }
    }

    NewtonOutcome { eta, nll, converged, n_iter }
}

// ---------------------------------------------------------------------------
// Dense linear algebra helpers
// ---------------------------------------------------------------------------

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
pub(crate) fn solve_linear_system(a: &Array2<f64>, b: &[f64]) -> Result<Vec<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::numerical_error("matrix dimensions mismatch"));
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.to_vec();

    // Forward elimination
    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a_copy[[k, i]].abs() > a_copy[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a_copy[[max_row, i]].abs() < 1e-12 {
            return Err(SurvivalError::numerical_error("matrix is singular"));
        }

        if max_row != i {
            for j in 0..n {
                let temp = a_copy[[i, j]];
                a_copy[[i, j]] = a_copy[[max_row, j]];
                a_copy[[max_row, j]] = temp;
            }
            b_copy.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// Lower Cholesky factor, or `None` when the matrix is not positive definite.
pub(crate) fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l: Array2<f64> = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(s > 0.0) || !s.is_finite() {
                    return None;
                }
                l[[i, j]] = s.sqrt();
            } else {
                l[[i, j]] = s / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Inverse of a symmetric positive-definite matrix from its Cholesky factor.
fn cholesky_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::zeros((n, n));
    for col in 0..n {
        // forward solve L y = e_col
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut s = if i == col { 1.0 } else { 0.0 };
            for k in 0..i {
                s -= l[[i, k]] * y[k];
            }
            y[i] = s / l[[i, i]];
        }
        // back solve L^T x = y
        for i in (0..n).rev() {
            let mut s = y[i];
            for k in (i + 1)..n {
                s -= l[[k, i]] * inv[[k, col]];
            }
            inv[[i, col]] = s / l[[i, i]];
        }
    }
    inv
}

/// Inverse for a possibly indefinite information matrix: damped Cholesky
/// first, plain elimination as a last resort.
fn damped_inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let diag_scale = (0..n).map(|i| a[[i, i]].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut damped = a.clone();
    let mut damping = 0.0_f64;
    for attempt in 0..10 {
        if let Some(l) = cholesky(&damped) {
            return Some(cholesky_inverse(&l));
        }
        if attempt == 9 {
            break;
        }
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            damped[[i, i]] += next - damping;
        }
        damping = next;
    }

    let mut inv = Array2::zeros((n, n));
    for col in 0..n {
        let mut e = vec![0.0; n];
        e[col] = 1.0;
        let x = solve_linear_system(&damped, &e).ok()?;
        for i in 0..n {
            inv[[i, col]] = x[i];
        }
    }
    if inv.iter().all(|v| v.is_finite()) { Some(inv) } else { None }
}

// ---------------------------------------------------------------------------
// Per-family estimators
// ---------------------------------------------------------------------------

/// Fit a family by maximum likelihood.
///
/// `init` is the optional user override in the native parameterization
/// (already arity- and domain-checked by the caller).
pub(crate) fn fit_family(
    family: Family,
    data: &SurvivalData,
    init: Option<&[f64]>,
    ctl: &FitControl,
) -> Result<Estimate> {
    if data.n_events() == 0 {
        return Err(SurvivalError::NoEvents);
    }
    match family {
        Family::Exponential => Ok(fit_exponential(data)),
        Family::LogNormal => Ok(fit_log_normal(data, init, ctl)),
        Family::Weibull => Ok(fit_weibull(data, init, ctl)),
        Family::Gamma => Ok(fit_gamma(data, init, ctl)),
        Family::GenGamma => Ok(fit_gen_gamma(data, init, ctl)),
    }
}

/// Exponential MLE is closed form: events over total exposure.
fn fit_exponential(data: &SurvivalData) -> Estimate {
    let d = data.n_events() as f64;
    let lambda = d / data.sum_t();
    let loglik = d * lambda.ln() - lambda * data.sum_t();
    Estimate { theta: vec![lambda], loglik, converged: true, n_iter: 0 }
}

/// Log-normal: closed form on log time when nothing is censored, otherwise
/// Newton-Raphson in `(mu, log sigma)` started from the event moments.
fn fit_log_normal(data: &SurvivalData, init: Option<&[f64]>, ctl: &FitControl) -> Estimate {
    let kernel = likelihood::LogNormalKernel { data };

    if init.is_none() && data.n_events() == data.n_samples() {
        let n = data.n_samples() as f64;
        let mu = data.ln_times().sum() / n;
        let var = data.ln_times().iter().map(|y| (y - mu).powi(2)).sum::<f64>() / n;
        let sigma = var.sqrt().max(1e-12);
        let loglik = -kernel.nll(&[mu, sigma.ln()]);
        return Estimate { theta: vec![mu, sigma], loglik, converged: true, n_iter: 0 };
    }

    let theta0 = init.map(<[f64]>::to_vec).unwrap_or_else(|| Family::LogNormal.default_init(data));
    let eta0 = likelihood::theta_to_eta(Family::LogNormal, &theta0);
    let out = newton_raphson(&kernel, eta0, ctl);
    Estimate {
        theta: likelihood::eta_to_theta(Family::LogNormal, &out.eta),
        loglik: -out.nll,
        converged: out.converged,
        n_iter: out.n_iter,
    }
}

/// Rate profiled out of the Weibull shape equation:
/// `lambda(alpha) = (D / sum u_i^alpha)^(1/alpha)` over all observations.
fn weibull_profile_rate(data: &SurvivalData, alpha: f64) -> f64 {
    let d = data.n_events() as f64;
    let sum_u_alpha: f64 =
        data.ln_times().iter().map(|&lu| likelihood::exp_clamped(alpha * lu)).sum();
    (d / sum_u_alpha).powf(1.0 / alpha)
}

/// Weibull: scalar Newton-Raphson on `log alpha` along the profile, then the
/// rate is recovered analytically. The profile score is the shape component
/// of the joint score evaluated at the profiled rate.
fn fit_weibull(data: &SurvivalData, init: Option<&[f64]>, ctl: &FitControl) -> Estimate {
    let kernel = WeibullKernel { data };

    if let Some(theta0) = init {
        let out = newton_raphson(&kernel, likelihood::theta_to_eta(Family::Weibull, theta0), ctl);
        return Estimate {
            theta: likelihood::eta_to_theta(Family::Weibull, &out.eta),
            loglik: -out.nll,
            converged: out.converged,
            n_iter: out.n_iter,
        };
    }

    let profile_nll = |log_alpha: f64| {
        let alpha = likelihood::exp_clamped(log_alpha);
        kernel.nll(&[log_alpha, weibull_profile_rate(data, alpha).ln()])
    };
    let profile_score = |log_alpha: f64| {
        let alpha = likelihood::exp_clamped(log_alpha);
        kernel.grad_nll(&[log_alpha, weibull_profile_rate(data, alpha).ln()])[0]
    };

    let mut log_alpha = 0.0_f64;
    let mut nll = profile_nll(log_alpha);
    let mut converged = false;
    let mut n_iter = 0;

    for _ in 0..ctl.maxit {
        n_iter += 1;
        let score = profile_score(log_alpha);
        let h = 1e-5 * log_alpha.abs().max(1.0);
        let curvature = (profile_score(log_alpha + h) - score) / h;

        let halve = |step: f64| {
            let mut scale = 1.0;
            for _ in 0..30 {
                let candidate = log_alpha - scale * step;
                let nll_new = profile_nll(candidate);
                if nll_new.is_finite() && nll_new <= nll + 1e-12 {
                    return Some((candidate, nll_new));
                }
                scale *= 0.5;
            }
            None
        };

        let mut accepted =
            if curvature.abs() > 1e-12 { halve(score / curvature) } else { None };
        if accepted.is_none() {
            accepted = halve(score.signum() * 0.1);
        }
        let Some((candidate, nll_new)) = accepted else { break };

        let delta = (candidate - log_alpha).abs();
        let rel_change = (nll - nll_new).abs() / (nll.abs() + 1.0);
        log_alpha = candidate;
        nll = nll_new;
        if delta < ctl.eps && rel_change < ctl.eps {
            converged = true;
            break;
        }
    }

    let alpha = likelihood::exp_clamped(log_alpha);
    let lambda = weibull_profile_rate(data, alpha);
    Estimate { theta: vec![alpha, lambda], loglik: -nll, converged, n_iter }
}

/// Gamma: joint Newton-Raphson in `(log alpha, log lambda)`. The start is
/// method-of-moments shape with the rate from the profile identity
/// `lambda = alpha * D / sum u`.
fn fit_gamma(data: &SurvivalData, init: Option<&[f64]>, ctl: &FitControl) -> Estimate {
    let theta0 = init.map(<[f64]>::to_vec).unwrap_or_else(|| {
        let mut theta = Family::Gamma.default_init(data);
        theta[1] = theta[0] * data.n_events() as f64 / data.sum_t();
        theta
    });
    let kernel = likelihood::GammaKernel { data };
    let out = newton_raphson(&kernel, likelihood::theta_to_eta(Family::Gamma, &theta0), ctl);
    Estimate {
        theta: likelihood::eta_to_theta(Family::Gamma, &out.eta),
        loglik: -out.nll,
        converged: out.converged,
        n_iter: out.n_iter,
    }
}

/// Bounds of the generalized-gamma outer search over the power parameter.
const GEN_GAMMA_BETA_LOWER: f64 = 0.1;
const GEN_GAMMA_BETA_UPPER: f64 = 10.0;
const GEN_GAMMA_GRID: usize = 13;

/// Generalized gamma.
///
/// The power parameter is weakly identified, so without a user start the
/// estimator brackets it: a log-spaced grid over `[0.1, 10]`, a Newton inner
/// loop over `(log alpha, log lambda)` at each grid point (warm-started from
/// the previous one), golden-section refinement around the best point, and a
/// final joint three-parameter polish. A user-supplied start skips straight
/// to the joint Newton-Raphson.
fn fit_gen_gamma(data: &SurvivalData, init: Option<&[f64]>, ctl: &FitControl) -> Estimate {
    let full = GenGammaKernel { data };

    if let Some(theta0) = init {
        let out = newton_raphson(&full, likelihood::theta_to_eta(Family::GenGamma, theta0), ctl);
        return Estimate {
            theta: likelihood::eta_to_theta(Family::GenGamma, &out.eta),
            loglik: -out.nll,
            converged: out.converged,
            n_iter: out.n_iter,
        };
    }

    let default = Family::GenGamma.default_init(data);
    let mut inner_start = vec![default[0].ln(), default[2].ln()];
    let mut n_iter = 0;

    // Inner fit at a fixed power; returns (nll, inner eta).
    let profile_at = |log_beta: f64, start: &[f64], iters: &mut usize| {
        let kernel = GenGammaProfileKernel { data, log_beta };
        let out = newton_raphson(&kernel, start.to_vec(), ctl);
        *iters += out.n_iter;
        (out.nll, out.eta)
    };

    // Coarse grid.
    let lo = GEN_GAMMA_BETA_LOWER.ln();
    let hi = GEN_GAMMA_BETA_UPPER.ln();
    let spacing = (hi - lo) / (GEN_GAMMA_GRID - 1) as f64;
    let mut best = (f64::INFINITY, lo, inner_start.clone());
    for g in 0..GEN_GAMMA_GRID {
        let log_beta = lo + g as f64 * spacing;
        let (nll, eta) = profile_at(log_beta, &inner_start, &mut n_iter);
        if ctl.report {
            log::info!(
                "gen-gamma outer search: beta = {:.4}, profile loglik = {:.6}",
                log_beta.exp(),
                -nll
            );
        }
        if nll < best.0 {
            best = (nll, log_beta, eta.clone());
        }
        inner_start = eta;
    }

    // Golden-section refinement around the best grid point.
    let phi = 0.5 * (5.0_f64.sqrt() - 1.0);
    let mut a = (best.1 - spacing).max(lo);
    let mut b = (best.1 + spacing).min(hi);
    let mut x1 = b - phi * (b - a);
    let mut x2 = a + phi * (b - a);
    let (mut f1, mut eta1) = profile_at(x1, &best.2, &mut n_iter);
    let (mut f2, mut eta2) = profile_at(x2, &eta1, &mut n_iter);
    for _ in 0..40 {
        if (b - a).abs() < 1e-4 {
            break;
        }
        if f1 < f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            eta2 = eta1.clone();
            x1 = b - phi * (b - a);
            let (f, eta) = profile_at(x1, &eta1, &mut n_iter);
            f1 = f;
            eta1 = eta;
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            eta1 = eta2.clone();
            x2 = a + phi * (b - a);
            let (f, eta) = profile_at(x2, &eta2, &mut n_iter);
            f2 = f;
            eta2 = eta;
        }
        if f1 < best.0 {
            best = (f1, x1, eta1.clone());
        }
        if f2 < best.0 {
            best = (f2, x2, eta2.clone());
        }
    }
    if ctl.report {
        log::info!(
            "gen-gamma outer search settled at beta = {:.4}, refining jointly",
            best.1.exp()
        );
    }

    // Joint polish from the profiled optimum.
    let eta0 = vec![best.2[0], best.1, best.2[1]];
    let out = newton_raphson(&full, eta0, ctl);
    Estimate {
        theta: likelihood::eta_to_theta(Family::GenGamma, &out.eta),
        loglik: -out.nll,
        converged: out.converged,
        n_iter: n_iter + out.n_iter,
    }
}

// ---------------------------------------------------------------------------
// Observed information and the robust fallback
// ---------------------------------------------------------------------------

/// Observed information `J = -d^2 l / d theta^2` in the native
/// parameterization, by forward differences of the analytic native score.
pub(crate) fn observed_information(
    family: Family,
    data: &SurvivalData,
    theta: &[f64],
) -> Array2<f64> {
    if family == Family::Exponential {
        // closed form: D / lambda^2
        let d = data.n_events() as f64;
        return Array2::from_elem((1, 1), d / (theta[0] * theta[0]));
    }

    let p = family.n_params();
    let score = likelihood::native_score(family, data, theta);
    let mut info = Array2::zeros((p, p));
    for j in 0..p {
        let eps = 1e-5 * theta[j].abs().max(1e-3);
        let mut theta_plus = theta.to_vec();
        theta_plus[j] += eps;
        let score_plus = likelihood::native_score(family, data, &theta_plus);
        for i in 0..p {
            // J = -d(score)/d(theta)
            info[[i, j]] = -(score_plus[i] - score[i]) / eps;
        }
    }
    for i in 0..p {
        for j in (i + 1)..p {
            let avg = 0.5 * (info[[i, j]] + info[[j, i]]);
            info[[i, j]] = avg;
            info[[j, i]] = avg;
        }
    }
    info
}

/// Covariance of the MLE in the native parameterization.
///
/// Positive-definite information inverts through its Cholesky factor. When
/// the factorization fails, or the estimator did not converge, the sandwich
/// `J^- B J^-` with the empirical score outer product `B` takes over and the
/// robust flag is raised.
pub(crate) fn covariance_matrix(
    family: Family,
    data: &SurvivalData,
    theta: &[f64],
    converged: bool,
) -> (Array2<f64>, bool) {
    let info = observed_information(family, data, theta);

    if converged {
        if let Some(l) = cholesky(&info) {
            return (cholesky_inverse(&l), false);
        }
        log::warn!("observed information is not positive definite, using sandwich covariance");
    } else {
        log::warn!("estimator did not converge, using sandwich covariance");
    }

    (sandwich_covariance(family, data, theta, &info), true)
}

fn sandwich_covariance(
    family: Family,
    data: &SurvivalData,
    theta: &[f64],
    info: &Array2<f64>,
) -> Array2<f64> {
    let p = family.n_params();
    let scores = likelihood::observation_scores(family, data, theta);
    let bread = match damped_inverse(info) {
        Some(inv) => inv,
        None => {
            // diagonal curvature is the last line of defense
            let mut inv = Array2::zeros((p, p));
            for i in 0..p {
                inv[[i, i]] = 1.0 / info[[i, i]].abs().max(1e-12);
            }
            inv
        }
    };
    let meat = scores.t().dot(&scores);
    let mut cov = bread.dot(&meat).dot(&bread);
    for i in 0..p {
        for j in (i + 1)..p {
            let avg = 0.5 * (cov[[i, j]] + cov[[j, i]]);
            cov[[i, j]] = avg;
            cov[[j, i]] = avg;
        }
    }
    cov
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uncensored(times: Vec<f64>) -> SurvivalData {
        let n = times.len();
        SurvivalData::new(times, vec![true; n]).unwrap()
    }

    #[test]
    fn exponential_closed_form() {
        let data = SurvivalData::new(
            vec![0.5, 1.2, 0.7, 2.0, 0.9],
            vec![true, false, true, true, false],
        )
        .unwrap();
        let est = fit_family(Family::Exponential, &data, None, &FitControl::default()).unwrap();
        assert_relative_eq!(est.theta[0], 3.0 / 5.3, epsilon = 1e-12);
        assert!(est.converged);
    }

    #[test]
    fn no_events_is_an_error() {
        let data = SurvivalData::new(vec![1.0, 2.0], vec![false, false]).unwrap();
        let err = fit_family(Family::Exponential, &data, None, &FitControl::default());
        assert!(matches!(err, Err(SurvivalError::NoEvents)));
    }

    #[test]
    fn log_normal_closed_form_uncensored() {
        let data = uncensored(vec![0.4, 1.1, 0.9, 2.3, 0.6, 1.7]);
        let est = fit_family(Family::LogNormal, &data, None, &FitControl::default()).unwrap();

        let n = data.n_samples() as f64;
        let mu = data.ln_times().sum() / n;
        let var = data.ln_times().iter().map(|y| (y - mu).powi(2)).sum::<f64>() / n;
        assert_relative_eq!(est.theta[0], mu, epsilon = 1e-10);
        assert_relative_eq!(est.theta[1], var.sqrt(), epsilon = 1e-10);

        // the iterative path must land on the closed form
        let tight = FitControl { eps: 1e-10, maxit: 200, report: false };
        let est_nr =
            fit_family(Family::LogNormal, &data, Some([0.0, 1.0].as_slice()), &tight).unwrap();
        assert_relative_eq!(est_nr.theta[0], mu, epsilon = 1e-8);
        assert_relative_eq!(est_nr.theta[1], var.sqrt(), epsilon = 1e-8);
    }

    #[test]
    fn weibull_profile_rate_matches_score_zero() {
        let data = SurvivalData::new(
            vec![0.5, 1.2, 0.7, 2.0, 0.9, 1.4],
            vec![true, false, true, true, true, false],
        )
        .unwrap();
        let alpha = 1.7;
        let lambda = weibull_profile_rate(&data, alpha);
        let g = WeibullKernel { data: &data }.grad_nll(&[alpha.ln(), lambda.ln()]);
        assert!(g[1].abs() < 1e-9, "rate score at the profile: {}", g[1]);
    }

    #[test]
    fn weibull_fit_stationary() {
        let data = SurvivalData::new(
            vec![0.3, 0.8, 1.1, 0.6, 1.9, 0.4, 2.4, 1.3],
            vec![true, true, false, true, true, true, false, true],
        )
        .unwrap();
        let est = fit_family(Family::Weibull, &data, None, &FitControl::default()).unwrap();
        assert!(est.converged);
        let eta = likelihood::theta_to_eta(Family::Weibull, &est.theta);
        let g = WeibullKernel { data: &data }.grad_nll(&eta);
        assert!(g.iter().all(|v| v.abs() < 1e-4), "score at optimum: {g:?}");
    }

    #[test]
    fn gamma_fit_stationary() {
        let data = uncensored(vec![0.7, 1.4, 2.2, 0.9, 1.1, 3.0, 0.5, 1.8]);
        let est = fit_family(Family::Gamma, &data, None, &FitControl::default()).unwrap();
        assert!(est.converged);
        let s = likelihood::native_score(Family::Gamma, &data, &est.theta);
        assert!(s.iter().all(|v| v.abs() < 1e-3), "native score at optimum: {s:?}");
    }

    #[test]
    fn gen_gamma_user_init_matches_search() {
        let data = uncensored(vec![
            0.61, 1.42, 2.21, 0.93, 1.15, 3.04, 0.52, 1.86, 0.77, 1.24, 2.65, 0.44, 1.03, 1.57,
            0.88, 2.02, 1.31, 0.69, 1.78, 0.95,
        ]);
        let ctl = FitControl::default();
        let searched = fit_family(Family::GenGamma, &data, None, &ctl).unwrap();
        let warm = fit_family(Family::GenGamma, &data, Some(searched.theta.as_slice()), &ctl).unwrap();
        assert!(
            (searched.loglik - warm.loglik).abs() < 1e-4,
            "search {} vs warm start {}",
            searched.loglik,
            warm.loglik
        );
    }

    #[test]
    fn cholesky_detects_indefinite() {
        let spd = ndarray::arr2(&[[4.0, 1.0], [1.0, 3.0]]);
        assert!(cholesky(&spd).is_some());
        let indefinite = ndarray::arr2(&[[1.0, 2.0], [2.0, 1.0]]);
        assert!(cholesky(&indefinite).is_none());
    }

    #[test]
    fn cholesky_inverse_round_trip() {
        let a = ndarray::arr2(&[[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]]);
        let l = cholesky(&a).unwrap();
        let inv = cholesky_inverse(&l);
        let prod = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn solve_linear_system_basic() {
        let a = ndarray::arr2(&[[2.0, 1.0], [1.0, 3.0]]);
        let x = solve_linear_system(&a, &[5.0, 10.0]).unwrap();
        assert_relative_eq!(2.0 * x[0] + x[1], 5.0, epsilon = 1e-12);
        assert_relative_eq!(x[0] + 3.0 * x[1], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn exponential_information_closed_form() {
        let data = SurvivalData::new(
            vec![0.5, 1.2, 0.7, 2.0],
            vec![true, false, true, true],
        )
        .unwrap();
        let est = fit_family(Family::Exponential, &data, None, &FitControl::default()).unwrap();
        let info = observed_information(Family::Exponential, &data, &est.theta);
        let lambda = est.theta[0];
        assert_relative_eq!(info[[0, 0]], 3.0 / (lambda * lambda), epsilon = 1e-10);
    }

    #[test]
    fn covariance_is_symmetric_pd_at_optimum() {
        let data = uncensored(vec![0.7, 1.4, 2.2, 0.9, 1.1, 3.0, 0.5, 1.8, 1.3, 0.8]);
        let est = fit_family(Family::Weibull, &data, None, &FitControl::default()).unwrap();
        let (cov, robust) = covariance_matrix(Family::Weibull, &data, &est.theta, est.converged);
        assert!(!robust);
        assert_relative_eq!(cov[[0, 1]], cov[[1, 0]], epsilon = 1e-10);
        assert!(cov[[0, 0]] > 0.0 && cov[[1, 1]] > 0.0);
        assert!(cholesky(&cov).is_some());
    }

    #[test]
    fn sandwich_kicks_in_when_not_converged() {
        let data = uncensored(vec![0.7, 1.4, 2.2, 0.9]);
        let est = fit_family(Family::Weibull, &data, None, &FitControl::default()).unwrap();
        let (cov, robust) = covariance_matrix(Family::Weibull, &data, &est.theta, false);
        assert!(robust);
        assert!(cov[[0, 0]] > 0.0 && cov[[1, 1]] > 0.0);
    }

    #[test]
    fn weibull_on_exponential_data_recovers_unit_shape() {
        // deterministic exponential-like quantile spread
        let n = 400;
        let times: Vec<f64> =
            (1..=n).map(|i| -((1.0 - i as f64 / (n as f64 + 1.0)).ln()) / 2.0).collect();
        let data = uncensored(times);
        let est = fit_family(Family::Weibull, &data, None, &FitControl::default()).unwrap();
        assert!(est.converged);
        assert!((est.theta[0] - 1.0).abs() < 0.08, "alpha = {}", est.theta[0]);
        assert!((est.theta[1] - 2.0).abs() < 0.15, "lambda = {}", est.theta[1]);
    }
}
