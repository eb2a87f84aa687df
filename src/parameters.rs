use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

/// Number of neighbouring coefficients examined on each side of a candidate.
pub const DEFAULT_RANGE: usize = 12;

pub fn default_range() -> usize {
    DEFAULT_RANGE
}

/// Tunables for an analysis.
///
/// `threshold` is the minimum confidence a candidate must reach to be
/// reported; when unset the bound method's default applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    #[serde(default = "default_range")]
    pub range: usize,
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            range: DEFAULT_RANGE,
            threshold: None,
        }
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: usize) -> Result<Self> {
        check_range(range)?;
        self.range = range;
        Ok(self)
    }

    pub fn with_threshold(mut self, threshold: f32) -> Result<Self> {
        check_threshold(threshold)?;
        self.threshold = Some(threshold);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        check_range(self.range)?;
        if let Some(threshold) = self.threshold {
            check_threshold(threshold)?;
        }
        Ok(())
    }

    /// Threshold override, or `fallback` when none was set.
    pub fn threshold_or(&self, fallback: f32) -> f32 {
        self.threshold.unwrap_or(fallback)
    }

    /// Parses `{"range": 8, "threshold": 0.5}`. Both keys are optional.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Parameters = serde_json::from_str(json)
            .map_err(|e| ForensicsError::Parameter(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Builds a parameter set from textual `key=value` style pairs, as they
    /// arrive from command lines or bindings.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            params = match key.as_ref() {
                "range" => {
                    let range = value.parse::<usize>().map_err(|_| {
                        ForensicsError::InvalidParameter(format!("range: {:?}", value))
                    })?;
                    params.with_range(range)?
                }
                "threshold" => {
                    let threshold = value.parse::<f32>().map_err(|_| {
                        ForensicsError::InvalidParameter(format!("threshold: {:?}", value))
                    })?;
                    params.with_threshold(threshold)?
                }
                other => {
                    return Err(ForensicsError::Parameter(format!(
                        "unknown parameter {:?}",
                        other
                    )));
                }
            };
        }
        Ok(params)
    }
}

fn check_range(range: usize) -> Result<()> {
    if range == 0 {
        return Err(ForensicsError::InvalidParameter(
            "range must be greater than zero".into(),
        ));
    }
    Ok(())
}

fn check_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ForensicsError::InvalidParameter(format!(
            "threshold {} is outside [0, 1]",
            threshold
        )));
    }
    Ok(())
}
