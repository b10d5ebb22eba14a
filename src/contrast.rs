//! Two-sample contrasts of fitted survival models.
//!
//! The two arms are fitted independently, so the variance of any contrast is
//! the sum of the per-arm delta-method variances with zero cross-covariance.
//! Differences are tested on the natural scale against zero; ratios are
//! formed and tested on the log scale against one, which also keeps the
//! ratio interval positive.

use crate::data::SurvivalData;
use crate::error::{Result, SurvivalError};
use crate::family::Family;
use crate::fit::{ParametricFitter, SurvivalFit};
use crate::functionals::{self, FunctionalKind};

/// One Wald-type contrast: estimate, uncertainty, interval, and test.
#[derive(Debug, Clone)]
pub struct ContrastEstimate {
    pub estimate: f64,
    /// Standard error of the estimate; for ratios this is the standard
    /// error of the log ratio.
    pub se: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub z: f64,
    pub p_value: f64,
}

/// Difference and ratio of one functional across the two arms.
#[derive(Debug, Clone)]
pub struct ContrastRecord {
    pub kind: FunctionalKind,
    pub diff: ContrastEstimate,
    pub ratio: ContrastEstimate,
}

/// the full two-sample comparison: both fits plus per-functional contrasts
#[derive(Debug, Clone)]
pub struct SurvivalContrast {
    fit1: SurvivalFit,
    fit0: SurvivalFit,
    records: Vec<ContrastRecord>,
    sig: f64,
}

impl SurvivalContrast {
    /// the target arm fit
    pub fn fit1(&self) -> &SurvivalFit {
        &self.fit1
    }

    /// the reference arm fit
    pub fn fit0(&self) -> &SurvivalFit {
        &self.fit0
    }

    /// all per-functional contrast records
    pub fn records(&self) -> &[ContrastRecord] {
        &self.records
    }

    /// one record by functional kind
    pub fn record(&self, kind: FunctionalKind) -> Option<&ContrastRecord> {
        self.records.iter().find(|r| r.kind == kind)
    }

    /// significance level shared by every interval here
    pub fn sig(&self) -> f64 {
        self.sig
    }

    /// print the comparison table
    pub fn print(&self) {
        println!(
            "two-sample contrast: {} (target) vs {} (reference)",
            self.fit1.family(),
            self.fit0.family()
        );
        println!("=====================================================");
        println!(
            "{:<12} {:>10} {:>22} {:>8}   {:>10} {:>22} {:>8}",
            "functional", "diff", "diff CI", "p", "ratio", "ratio CI", "p"
        );
        println!("{:-<100}", "");
        for r in &self.records {
            println!(
                "{:<12} {:>10.4} [{:>9.4}, {:>9.4}] {:>8.4}   {:>10.4} [{:>9.4}, {:>9.4}] {:>8.4}",
                r.kind.to_string(),
                r.diff.estimate,
                r.diff.ci_lower,
                r.diff.ci_upper,
                r.diff.p_value,
                r.ratio.estimate,
                r.ratio.ci_lower,
                r.ratio.ci_upper,
                r.ratio.p_value
            );
        }
    }
}

/// Contrast two independently fitted arms over their shared functionals.
///
/// Arm 1 is the target, arm 0 the reference. Both fits must carry the same
/// significance level. Functionals present in only one fit are skipped.
pub fn compare(fit1: &SurvivalFit, fit0: &SurvivalFit) -> Result<SurvivalContrast> {
    if (fit1.sig() - fit0.sig()).abs() > 1e-12 {
        return Err(SurvivalError::invalid_parameter(
            "sig",
            format!("{} vs {}", fit1.sig(), fit0.sig()),
        ));
    }
    let sig = fit1.sig();
    let z_crit = functionals::z_quantile(sig)?;

    let mut records = Vec::new();
    for f1 in fit1.functionals() {
        let Some(f0) = fit0.functional(f1.kind) else {
            continue;
        };

        // difference on the natural scale
        let d = f1.estimate - f0.estimate;
        let d_se = (f1.se * f1.se + f0.se * f0.se).sqrt();
        let d_z = if d_se > 0.0 { d / d_se } else { f64::NAN };
        let diff = ContrastEstimate {
            estimate: d,
            se: d_se,
            ci_lower: d - z_crit * d_se,
            ci_upper: d + z_crit * d_se,
            z: d_z,
            p_value: functionals::two_sided_p(d_z),
        };

        // ratio on the log scale
        let r = f1.estimate / f0.estimate;
        let r_se =
            ((f1.se / f1.estimate).powi(2) + (f0.se / f0.estimate).powi(2)).sqrt();
        let r_z = if r_se > 0.0 { r.ln() / r_se } else { f64::NAN };
        let ratio = ContrastEstimate {
            estimate: r,
            se: r_se,
            ci_lower: (r.ln() - z_crit * r_se).exp(),
            ci_upper: (r.ln() + z_crit * r_se).exp(),
            z: r_z,
            p_value: functionals::two_sided_p(r_z),
        };

        records.push(ContrastRecord { kind: f1.kind, diff, ratio });
    }

    Ok(SurvivalContrast { fit1: fit1.clone(), fit0: fit0.clone(), records, sig })
}

/// Fit both arms of a pooled dataset and contrast them.
///
/// `arms` holds 1 for the target arm and 0 for the reference arm. Each arm
/// may use its own family; `sig` and `tau` are shared.
pub fn fit_two_arms(
    times: &[f64],
    events: &[bool],
    arms: &[u8],
    dist1: Family,
    dist0: Family,
    sig: f64,
    tau: &[f64],
) -> Result<SurvivalContrast> {
    if times.len() != arms.len() || events.len() != arms.len() {
        return Err(SurvivalError::invalid_survival_data(format!(
            "times ({}), events ({}) and arms ({}) must have the same length",
            times.len(),
            events.len(),
            arms.len()
        )));
    }

    let mut times1 = Vec::new();
    let mut events1 = Vec::new();
    let mut times0 = Vec::new();
    let mut events0 = Vec::new();
    for (index, &arm) in arms.iter().enumerate() {
        match arm {
            1 => {
                times1.push(times[index]);
                events1.push(events[index]);
            }
            0 => {
                times0.push(times[index]);
                events0.push(events[index]);
            }
            value => {
                return Err(SurvivalError::invalid_survival_data(format!(
                    "arm indicator must be 0 or 1, got {value} at index {index}"
                )));
            }
        }
    }
    if times1.is_empty() || times0.is_empty() {
        return Err(SurvivalError::invalid_survival_data("both arms need observations"));
    }

    let data1 = SurvivalData::new(times1, events1)?;
    let data0 = SurvivalData::new(times0, events0)?;

    let fit1 = ParametricFitter::new(dist1).with_sig(sig).with_tau(tau).fit(&data1)?;
    let fit0 = ParametricFitter::new(dist0).with_sig(sig).with_tau(tau).fit(&data0)?;

    compare(&fit1, &fit0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn arm_data(shift: f64) -> SurvivalData {
        let times: Vec<f64> = vec![
            0.31, 0.84, 1.12, 0.63, 1.92, 0.45, 2.41, 1.33, 0.92, 1.61, 0.73, 2.14, 0.55, 1.07,
            1.48, 0.38, 1.85, 0.99, 1.26, 0.68,
        ]
        .into_iter()
        .map(|t| t * shift)
        .collect();
        let events = vec![
            true, true, false, true, true, true, false, true, true, false, true, true, true, true,
            false, true, true, true, true, true,
        ];
        SurvivalData::new(times, events).unwrap()
    }

    #[test]
    fn self_contrast_is_null() {
        let fit = ParametricFitter::new(Family::Weibull).fit(&arm_data(1.0)).unwrap();
        let contrast = compare(&fit, &fit).unwrap();
        for r in contrast.records() {
            assert_relative_eq!(r.diff.estimate, 0.0, epsilon = 1e-12);
            assert!(r.diff.se > 0.0);
            assert_relative_eq!(r.ratio.estimate, 1.0, epsilon = 1e-12);
            assert_relative_eq!(r.diff.p_value, 1.0, epsilon = 1e-10);
            assert_relative_eq!(r.ratio.p_value, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn contrast_is_antisymmetric() {
        let fit_a = ParametricFitter::new(Family::Weibull).fit(&arm_data(1.0)).unwrap();
        let fit_b = ParametricFitter::new(Family::Weibull).fit(&arm_data(1.6)).unwrap();
        let ab = compare(&fit_a, &fit_b).unwrap();
        let ba = compare(&fit_b, &fit_a).unwrap();
        for (r_ab, r_ba) in ab.records().iter().zip(ba.records().iter()) {
            assert_relative_eq!(r_ab.diff.estimate, -r_ba.diff.estimate, epsilon = 1e-10);
            assert_relative_eq!(r_ab.diff.se, r_ba.diff.se, epsilon = 1e-10);
            assert_relative_eq!(
                r_ab.ratio.estimate,
                1.0 / r_ba.ratio.estimate,
                epsilon = 1e-10
            );
            assert_relative_eq!(r_ab.ratio.p_value, r_ba.ratio.p_value, epsilon = 1e-10);
        }
    }

    #[test]
    fn mismatched_sig_is_rejected() {
        let fit_a =
            ParametricFitter::new(Family::Exponential).with_sig(0.05).fit(&arm_data(1.0)).unwrap();
        let fit_b =
            ParametricFitter::new(Family::Exponential).with_sig(0.10).fit(&arm_data(1.0)).unwrap();
        assert!(compare(&fit_a, &fit_b).is_err());
    }

    #[test]
    fn scale_shift_moves_diff_and_ratio_together() {
        // arm 1 times are 2x arm 0 times, so the mean ratio sits near 2
        let fit1 = ParametricFitter::new(Family::Weibull).fit(&arm_data(2.0)).unwrap();
        let fit0 = ParametricFitter::new(Family::Weibull).fit(&arm_data(1.0)).unwrap();
        let contrast = compare(&fit1, &fit0).unwrap();
        let mean = contrast.record(FunctionalKind::Mean).unwrap();
        assert!(mean.diff.estimate > 0.0);
        assert_relative_eq!(mean.ratio.estimate, 2.0, epsilon = 1e-6);
        assert!(mean.ratio.ci_lower < 2.0 && 2.0 < mean.ratio.ci_upper);
    }

    #[test]
    fn fit_two_arms_splits_and_validates() {
        let times = vec![0.5, 1.2, 0.7, 2.0, 0.9, 1.4, 0.6, 1.1];
        let events = vec![true, true, true, false, true, true, true, false];
        let arms = vec![1, 1, 1, 1, 0, 0, 0, 0];

        let contrast = fit_two_arms(
            &times,
            &events,
            &arms,
            Family::Exponential,
            Family::Exponential,
            0.05,
            &[],
        )
        .unwrap();
        assert_eq!(contrast.fit1().n_samples(), 4);
        assert_eq!(contrast.fit0().n_samples(), 4);
        assert_eq!(contrast.records().len(), 3);

        let bad_arm = fit_two_arms(
            &times,
            &events,
            &[1, 1, 1, 1, 0, 0, 0, 2],
            Family::Exponential,
            Family::Exponential,
            0.05,
            &[],
        );
        assert!(bad_arm.is_err());

        let one_sided = fit_two_arms(
            &times,
            &events,
            &[1; 8],
            Family::Exponential,
            Family::Exponential,
            0.05,
            &[],
        );
        assert!(one_sided.is_err());
    }
}
