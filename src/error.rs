use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

#[derive(Error, Debug, Clone)]
pub enum SurvivalError {
    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },

    #[error("survival times must be positive & finite, got {value} at index {index}")]
    NonPositiveTime { value: f64, index: usize },

    #[error("status code must be 0 or 1, got {value} at index {index}")]
    BadStatusCode { value: u8, index: usize },

    #[error("unknown distribution: {name}")]
    UnknownDistribution { name: String },

    #[error("{family} takes {expected} parameter(s), got {got}")]
    BadParameterArity { family: String, expected: usize, got: usize },

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("bad truncation time: {message}")]
    InvalidTau { message: String },

    #[error("significance level must be in (0,1), got {value}")]
    InvalidSig { value: f64 },

    #[error("no events in the data - every observation is censored")]
    NoEvents,

    #[error("quadrature failed: {message}")]
    QuadratureFailure { message: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },
}

impl SurvivalError {
    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }

    pub fn bad_parameter_arity(family: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::BadParameterArity { family: family.into(), expected, got }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn invalid_tau(message: impl Into<String>) -> Self {
        Self::InvalidTau { message: message.into() }
    }

    pub fn quadrature_failure(message: impl Into<String>) -> Self {
        Self::QuadratureFailure { message: message.into() }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }
}
