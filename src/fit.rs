use ndarray::{Array2, ArrayView2};

use crate::data::SurvivalData;
use crate::error::{Result, SurvivalError};
use crate::estimate::{self, FitControl};
use crate::family::Family;
use crate::functionals::{self, FunctionalEstimate, FunctionalKind};
use crate::likelihood;

/// builder-style fitter for one parametric family
///
/// configure once, fit as many datasets as you like - every call to [`fit`]
/// produces an independent immutable [`SurvivalFit`]
///
/// [`fit`]: ParametricFitter::fit
#[derive(Debug, Clone)]
pub struct ParametricFitter {
    family: Family,
    sig: f64,                // significance level for all intervals
    tau: Vec<f64>,           // RMST truncation times (may be empty)
    init: Option<Vec<f64>>,  // optional native-scale starting values
    control: FitControl,
}

impl ParametricFitter {
    /// new fitter w/ defaults (sig 0.05, no RMST, data-driven starts)
    pub fn new(family: Family) -> Self {
        Self {
            family,
            sig: 0.05,
            tau: Vec::new(),
            init: None,
            control: FitControl::default(),
        }
    }

    /// convenience: build from a family name like "weibull" or "gen-gamma"
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::new(Family::parse(name)?))
    }

    /// significance level for every interval and p-value
    pub fn with_sig(mut self, sig: f64) -> Self {
        self.sig = sig;
        self
    }

    /// request RMST at each of these truncation times
    pub fn with_tau(mut self, tau: &[f64]) -> Self {
        self.tau = tau.to_vec();
        self
    }

    /// request RMST at a single truncation time
    pub fn with_single_tau(mut self, tau: f64) -> Self {
        self.tau = vec![tau];
        self
    }

    /// override the starting values (native parameterization)
    pub fn with_init(mut self, init: &[f64]) -> Self {
        self.init = Some(init.to_vec());
        self
    }

    /// how close is close enough for convergence
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.control.eps = eps;
        self
    }

    /// max iterations before giving up (non-fatal, flags the fit)
    pub fn with_maxit(mut self, maxit: usize) -> Self {
        self.control.maxit = maxit;
        self
    }

    /// log progress of the generalized-gamma outer search
    pub fn with_report(mut self, report: bool) -> Self {
        self.control.report = report;
        self
    }

    /// fit the model to data - this does the actual work
    pub fn fit(&self, data: &SurvivalData) -> Result<SurvivalFit> {
        if !(self.sig > 0.0 && self.sig < 1.0) {
            return Err(SurvivalError::InvalidSig { value: self.sig });
        }
        for &tau in &self.tau {
            if !(tau > 0.0) || !tau.is_finite() {
                return Err(SurvivalError::invalid_tau(format!("tau must be positive, got {tau}")));
            }
            if tau > data.max_time() {
                return Err(SurvivalError::invalid_tau(format!(
                    "tau {tau} exceeds the largest observed time {}",
                    data.max_time()
                )));
            }
        }
        if let Some(init) = &self.init {
            self.family.validate_params(init)?;
        }

        let est = estimate::fit_family(self.family, data, self.init.as_deref(), &self.control)?;
        if !est.converged {
            log::warn!(
                "{} estimator stopped after {} iterations without meeting tolerance",
                self.family,
                est.n_iter
            );
        }
        let (covariance, robust) =
            estimate::covariance_matrix(self.family, data, &est.theta, est.converged);

        let z = functionals::z_quantile(self.sig)?;
        let mut kinds =
            vec![FunctionalKind::Mean, FunctionalKind::Median, FunctionalKind::Variance];
        kinds.extend(self.tau.iter().map(|&tau| FunctionalKind::Rmst(tau)));

        let mut summaries = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match functionals::evaluate_functional(self.family, &est.theta, &covariance, kind, z) {
                Ok(f) => summaries.push(f),
                Err(e) => {
                    // one bad functional must not take the fit down with it
                    log::warn!("{kind} dropped from the {} fit: {e}", self.family);
                }
            }
        }

        Ok(SurvivalFit {
            family: self.family,
            params: est.theta,
            covariance,
            robust,
            converged: est.converged,
            n_iter: est.n_iter,
            loglik: est.loglik,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
            sig: self.sig,
            functionals: summaries,
        })
    }
}

/// an immutable fitted model: MLE, covariance, and functional summaries
#[derive(Debug, Clone)]
pub struct SurvivalFit {
    family: Family,
    params: Vec<f64>,
    covariance: Array2<f64>,
    robust: bool,
    converged: bool,
    n_iter: usize,
    loglik: f64,
    n_samples: usize,
    n_events: usize,
    sig: f64,
    functionals: Vec<FunctionalEstimate>,
}

impl SurvivalFit {
    /// which family was fitted
    pub fn family(&self) -> Family {
        self.family
    }

    /// the MLE in the native parameterization
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// covariance of the MLE in the native parameterization
    pub fn covariance(&self) -> ArrayView2<'_, f64> {
        self.covariance.view()
    }

    /// standard errors (square root of the covariance diagonal)
    pub fn standard_errors(&self) -> Vec<f64> {
        (0..self.params.len()).map(|i| self.covariance[[i, i]].max(0.0).sqrt()).collect()
    }

    /// true when the covariance is the sandwich fallback rather than the
    /// inverse observed information
    pub fn is_robust(&self) -> bool {
        self.robust
    }

    /// did the estimator meet its tolerance?
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// iterations spent across all optimizer loops
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// maximized log-likelihood
    pub fn loglik(&self) -> f64 {
        self.loglik
    }

    /// observations / events behind the fit
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// number of observed events
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// significance level the intervals were built with
    pub fn sig(&self) -> f64 {
        self.sig
    }

    /// all functional summaries carried by this fit
    pub fn functionals(&self) -> &[FunctionalEstimate] {
        &self.functionals
    }

    /// one functional summary by kind, if it survived evaluation
    pub fn functional(&self, kind: FunctionalKind) -> Option<&FunctionalEstimate> {
        self.functionals.iter().find(|f| f.kind == kind)
    }

    /// fitted survival function S(t)
    pub fn survival(&self, t: f64) -> f64 {
        likelihood::log_survival(self.family, &self.params, t).exp()
    }

    /// fitted hazard function h(t)
    pub fn hazard(&self, t: f64) -> f64 {
        likelihood::log_hazard(self.family, &self.params, t).exp()
    }

    /// fitted density f(t)
    pub fn density(&self, t: f64) -> f64 {
        likelihood::log_density(self.family, &self.params, t).exp()
    }

    /// Akaike information criterion
    pub fn aic(&self) -> f64 {
        2.0 * self.params.len() as f64 - 2.0 * self.loglik
    }

    /// Bayesian information criterion
    pub fn bic(&self) -> f64 {
        self.params.len() as f64 * (self.n_samples as f64).ln() - 2.0 * self.loglik
    }

    /// print out what we learned
    pub fn print(&self) {
        println!("parametric survival fit: {}", self.family);
        println!("==============================");
        println!("n = {}, events = {}", self.n_samples, self.n_events);
        println!(
            "loglik = {:.6}, converged = {}, robust covariance = {}",
            self.loglik, self.converged, self.robust
        );
        println!();

        println!("{:<12} {:>12} {:>12}", "parameter", "estimate", "std error");
        println!("{:-<38}", "");
        let se = self.standard_errors();
        for (i, name) in self.family.param_names().iter().enumerate() {
            println!("{:<12} {:>12.6} {:>12.6}", name, self.params[i], se[i]);
        }
        println!();

        let level = 100.0 * (1.0 - self.sig);
        println!(
            "{:<12} {:>12} {:>12} {:>12} {:>12}",
            "functional", "estimate", "std error",
            format!("{level:.0}% lower"), format!("{level:.0}% upper")
        );
        println!("{:-<64}", "");
        for f in &self.functionals {
            println!(
                "{:<12} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                f.kind.to_string(),
                f.estimate,
                f.se,
                f.ci_lower,
                f.ci_upper
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
        SurvivalData::new(
            vec![0.3, 0.8, 1.1, 0.6, 1.9, 0.4, 2.4, 1.3, 0.9, 1.6, 0.7, 2.1],
            vec![
                true, true, false, true, true, true, false, true, true, false, true, true,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_fitter_builder() {
        let fitter = ParametricFitter::new(Family::Weibull)
            .with_sig(0.1)
            .with_single_tau(1.0)
            .with_maxit(50);
        let fit = fitter.fit(&create_test_data()).unwrap();
        assert_eq!(fit.family(), Family::Weibull);
        assert_eq!(fit.sig(), 0.1);
        assert!(fit.functional(FunctionalKind::Rmst(1.0)).is_some());
    }

    #[test]
    fn test_from_name() {
        assert!(ParametricFitter::from_name("weibull").is_ok());
        assert!(matches!(
            ParametricFitter::from_name("cauchy"),
            Err(SurvivalError::UnknownDistribution { .. })
        ));
    }

    #[test]
    fn test_invalid_sig() {
        let err = ParametricFitter::new(Family::Exponential)
            .with_sig(1.3)
            .fit(&create_test_data());
        assert!(matches!(err, Err(SurvivalError::InvalidSig { .. })));
    }

    #[test]
    fn test_invalid_tau() {
        let data = create_test_data();
        for bad in [-0.5, 0.0, 100.0] {
            let err = ParametricFitter::new(Family::Exponential)
                .with_single_tau(bad)
                .fit(&data);
            assert!(matches!(err, Err(SurvivalError::InvalidTau { .. })), "tau = {bad}");
        }
    }

    #[test]
    fn test_bad_init_arity() {
        let err = ParametricFitter::new(Family::Gamma)
            .with_init(&[1.0])
            .fit(&create_test_data());
        assert!(matches!(err, Err(SurvivalError::BadParameterArity { .. })));
    }

    #[test]
    fn test_no_events() {
        let data = SurvivalData::new(vec![1.0, 2.0], vec![false, false]).unwrap();
        let err = ParametricFitter::new(Family::Exponential).fit(&data);
        assert!(matches!(err, Err(SurvivalError::NoEvents)));
    }

    #[test]
    fn test_default_functionals_present() {
        let fit = ParametricFitter::new(Family::Exponential).fit(&create_test_data()).unwrap();
        assert!(fit.functional(FunctionalKind::Mean).is_some());
        assert!(fit.functional(FunctionalKind::Median).is_some());
        assert!(fit.functional(FunctionalKind::Variance).is_some());
        assert!(fit.functional(FunctionalKind::Rmst(1.0)).is_none());
    }

    #[test]
    fn test_exponential_fit_values() {
        let data = create_test_data();
        let fit = ParametricFitter::new(Family::Exponential).fit(&data).unwrap();
        let lambda = data.n_events() as f64 / data.sum_t();
        assert_relative_eq!(fit.params()[0], lambda, epsilon = 1e-12);
        let mean = fit.functional(FunctionalKind::Mean).unwrap();
        assert_relative_eq!(mean.estimate, 1.0 / lambda, epsilon = 1e-12);
        // closed-form information: se = lambda / sqrt(D)
        assert_relative_eq!(
            fit.standard_errors()[0],
            lambda / (data.n_events() as f64).sqrt(),
            epsilon = 1e-10
        );
        assert!(!fit.is_robust());
        assert!(fit.converged());
    }

    #[test]
    fn test_fitted_curves() {
        let fit = ParametricFitter::new(Family::Weibull).fit(&create_test_data()).unwrap();
        assert_relative_eq!(fit.survival(0.0), 1.0, epsilon = 1e-12);
        let t = 1.2;
        assert!(fit.survival(t) > 0.0 && fit.survival(t) < 1.0);
        assert_relative_eq!(fit.hazard(t), fit.density(t) / fit.survival(t), epsilon = 1e-10);
    }

    #[test]
    fn test_aic_bic() {
        let fit = ParametricFitter::new(Family::Weibull).fit(&create_test_data()).unwrap();
        assert_relative_eq!(fit.aic(), 4.0 - 2.0 * fit.loglik(), epsilon = 1e-12);
        assert!(fit.bic() > fit.aic()); // ln(12) > 2
    }

    #[test]
    fn test_fit_is_reusable_and_deterministic() {
        let data = create_test_data();
        let fitter = ParametricFitter::new(Family::Gamma);
        let a = fitter.fit(&data).unwrap();
        let b = fitter.fit(&data).unwrap();
        assert_eq!(a.params(), b.params());
    }
}
