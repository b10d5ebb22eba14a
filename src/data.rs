use crate::error::{Result, SurvivalError};
use ndarray::{Array1, ArrayView1};

/// right-censored survival data - observation times plus event indicators
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,  // time to event/censoring
    events: Vec<bool>,   // true = event, false = censored
    ln_times: Array1<f64>, // precomputed for the likelihood kernels
    sum_t: f64,
    n_events: usize,
    max_time: f64,
}

impl SurvivalData {
    /// make new survival data from raw vecs
    pub fn new(times: Vec<f64>, events: Vec<bool>) -> Result<Self> {
        let n_samples = times.len();

        if n_samples == 0 {
            return Err(SurvivalError::invalid_survival_data("need at least one observation"));
        }

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_survival_data(format!(
                "times len ({}) != events len ({})",
                n_samples,
                events.len()
            )));
        }

        if let Some(index) = times.iter().position(|&t| t <= 0.0 || !t.is_finite()) {
            return Err(SurvivalError::NonPositiveTime { value: times[index], index });
        }

        let ln_times = times.iter().map(|t| t.ln()).collect::<Vec<_>>();
        let sum_t = times.iter().sum();
        let n_events = events.iter().filter(|&&e| e).count();
        let max_time = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            times: Array1::from(times),
            events,
            ln_times: Array1::from(ln_times),
            sum_t,
            n_events,
            max_time,
        })
    }

    /// build from 0/1 status codes (1 = event, 0 = censored)
    pub fn from_status_codes(times: Vec<f64>, status: &[u8]) -> Result<Self> {
        let mut events = Vec::with_capacity(status.len());
        for (index, &value) in status.iter().enumerate() {
            match value {
                0 => events.push(false),
                1 => events.push(true),
                _ => return Err(SurvivalError::BadStatusCode { value, index }),
            }
        }
        Self::new(times, events)
    }

    /// how many observations
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many observed events (the rest are censored)
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// observation times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// log observation times
    pub fn ln_times(&self) -> ArrayView1<'_, f64> {
        self.ln_times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// total observed time
    pub fn sum_t(&self) -> f64 {
        self.sum_t
    }

    /// largest observation time
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    /// grab a subset of observations by indices
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(SurvivalError::invalid_survival_data("subset index out of bounds"));
        }

        let times: Vec<f64> = indices.iter().map(|&i| self.times[i]).collect();
        let events: Vec<bool> = indices.iter().map(|&i| self.events[i]).collect();

        Self::new(times, events)
    }
}
