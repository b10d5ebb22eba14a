use crate::data::SurvivalData;
use crate::error::{Result, SurvivalError};

/// Supported parametric survival families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Exponential,
    Gamma,
    GenGamma,
    LogNormal,
    Weibull,
}

impl Family {
    /// parse a family from its name (accepts the common aliases)
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "exp" | "exponential" => Ok(Family::Exponential),
            "gamma" => Ok(Family::Gamma),
            "gen-gamma" | "gengamma" | "generalized-gamma" => Ok(Family::GenGamma),
            "log-normal" | "lognormal" => Ok(Family::LogNormal),
            "weibull" | "wei" => Ok(Family::Weibull),
            other => Err(SurvivalError::UnknownDistribution { name: other.to_string() }),
        }
    }

    /// how many native parameters this family has
    pub fn n_params(&self) -> usize {
        match self {
            Family::Exponential => 1,
            Family::Gamma | Family::LogNormal | Family::Weibull => 2,
            Family::GenGamma => 3,
        }
    }

    /// native parameter symbols, in the order used everywhere in this crate
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            Family::Exponential => &["lambda"],
            Family::Gamma => &["alpha", "lambda"],
            Family::GenGamma => &["alpha", "beta", "lambda"],
            Family::LogNormal => &["mu", "sigma"],
            Family::Weibull => &["alpha", "lambda"],
        }
    }

    /// Whether parameter `j` lives on the positive half-line.
    ///
    /// Positive parameters are optimized as logs; `mu` of the log-normal is
    /// the only real-line parameter.
    pub fn param_is_positive(&self, j: usize) -> bool {
        !matches!((self, j), (Family::LogNormal, 0))
    }

    /// Data-driven starting values in the native parameterization.
    ///
    /// Exponential and Weibull start from the event rate; gamma and
    /// generalized gamma from method-of-moments on the observed events;
    /// log-normal from the moments of log event times.
    pub fn default_init(&self, data: &SurvivalData) -> Vec<f64> {
        let d = data.n_events() as f64;
        let rate = if data.sum_t() > 0.0 && d > 0.0 { d / data.sum_t() } else { 1.0 };
        match self {
            Family::Exponential => vec![rate],
            Family::Weibull => vec![1.0, rate],
            Family::Gamma => {
                let (alpha, lambda) = moment_init(data);
                vec![alpha, lambda]
            }
            Family::GenGamma => {
                let (alpha, lambda) = moment_init(data);
                vec![alpha, 1.0, lambda]
            }
            Family::LogNormal => {
                let (mu, sigma) = log_moment_init(data);
                vec![mu, sigma]
            }
        }
    }

    /// Validate a user-supplied native parameter vector for this family.
    pub fn validate_params(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(SurvivalError::bad_parameter_arity(
                self.to_string(),
                self.n_params(),
                params.len(),
            ));
        }
        for (j, &v) in params.iter().enumerate() {
            if !v.is_finite() || (self.param_is_positive(j) && v <= 0.0) {
                return Err(SurvivalError::invalid_parameter(
                    self.param_names()[j],
                    format!("{v}"),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Family::Exponential => "exp",
            Family::Gamma => "gamma",
            Family::GenGamma => "gen-gamma",
            Family::LogNormal => "log-normal",
            Family::Weibull => "weibull",
        };
        write!(f, "{name}")
    }
}

/// Method-of-moments (shape, rate) from the observed event times.
fn moment_init(data: &SurvivalData) -> (f64, f64) {
    let events: Vec<f64> = data
        .times()
        .iter()
        .zip(data.events().iter())
        .filter_map(|(&t, &e)| if e { Some(t) } else { None })
        .collect();
    let n = events.len() as f64;
    if n < 2.0 {
        return (1.0, 1.0);
    }
    let mean = events.iter().sum::<f64>() / n;
    let var = events.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1.0);
    if !(mean > 0.0) || !(var > 0.0) {
        return (1.0, 1.0);
    }
    ((mean * mean / var).max(1e-2), (mean / var).max(1e-8))
}

/// (mu, sigma) from the log of the observed event times.
fn log_moment_init(data: &SurvivalData) -> (f64, f64) {
    let logs: Vec<f64> = data
        .ln_times()
        .iter()
        .zip(data.events().iter())
        .filter_map(|(&y, &e)| if e { Some(y) } else { None })
        .collect();
    let n = logs.len() as f64;
    if n < 2.0 {
        return (0.0, 1.0);
    }
    let mu = logs.iter().sum::<f64>() / n;
    let var = logs.iter().map(|y| (y - mu).powi(2)).sum::<f64>() / (n - 1.0);
    (mu, var.sqrt().max(1e-4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(Family::parse("exp").unwrap(), Family::Exponential);
        assert_eq!(Family::parse("exponential").unwrap(), Family::Exponential);
        assert_eq!(Family::parse("Gamma").unwrap(), Family::Gamma);
        assert_eq!(Family::parse("gen-gamma").unwrap(), Family::GenGamma);
        assert_eq!(Family::parse("generalized-gamma").unwrap(), Family::GenGamma);
        assert_eq!(Family::parse("log-normal").unwrap(), Family::LogNormal);
        assert_eq!(Family::parse("weibull").unwrap(), Family::Weibull);
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            Family::parse("log-logistic"),
            Err(SurvivalError::UnknownDistribution { .. })
        ));
    }

    #[test]
    fn test_arity() {
        assert_eq!(Family::Exponential.n_params(), 1);
        assert_eq!(Family::Gamma.n_params(), 2);
        assert_eq!(Family::GenGamma.n_params(), 3);
        assert_eq!(Family::LogNormal.n_params(), 2);
        assert_eq!(Family::Weibull.n_params(), 2);
    }

    #[test]
    fn test_validate_params() {
        assert!(Family::Weibull.validate_params(&[2.0, 1.0]).is_ok());
        assert!(matches!(
            Family::Weibull.validate_params(&[2.0]),
            Err(SurvivalError::BadParameterArity { .. })
        ));
        assert!(Family::Weibull.validate_params(&[-1.0, 1.0]).is_err());
        // mu may be negative for log-normal, sigma may not
        assert!(Family::LogNormal.validate_params(&[-3.0, 1.0]).is_ok());
        assert!(Family::LogNormal.validate_params(&[0.0, -1.0]).is_err());
    }

    #[test]
    fn test_default_init_positive() {
        let data = SurvivalData::new(
            vec![0.5, 1.2, 0.7, 2.0, 0.9],
            vec![true, false, true, true, true],
        )
        .unwrap();
        for family in [
            Family::Exponential,
            Family::Gamma,
            Family::GenGamma,
            Family::LogNormal,
            Family::Weibull,
        ] {
            let init = family.default_init(&data);
            assert_eq!(init.len(), family.n_params());
            assert!(family.validate_params(&init).is_ok());
        }
    }
}
