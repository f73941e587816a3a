use serde::{Deserialize, Serialize};
use thiserror::Error;

const SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum WeightsError {
    #[error("Weight {name} must be a finite, non-negative number (got {value})")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("Weights must sum to 1 (got {0})")]
    BadSum(f64),
    #[error("At least one of the structural, placeholder or length weights must be non-zero")]
    NoContentSignal,
}

/// Relative weight of each similarity signal. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub structural: f64,
    pub placeholder: f64,
    pub length: f64,
    pub category: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            structural: 0.25,
            placeholder: 0.25,
            length: 0.25,
            category: 0.25,
        }
    }
}

impl MatchWeights {
    pub fn new(structural: f64, placeholder: f64, length: f64, category: f64) -> Result<Self, WeightsError> {
        let weights = Self {
            structural,
            placeholder,
            length,
            category,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), WeightsError> {
        let named = [
            ("structural", self.structural),
            ("placeholder", self.placeholder),
            ("length", self.length),
            ("category", self.category),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightsError::OutOfRange { name, value });
            }
        }

        let sum = self.structural + self.placeholder + self.length + self.category;
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(WeightsError::BadSum(sum));
        }
        if self.structural + self.placeholder + self.length <= 0.0 {
            return Err(WeightsError::NoContentSignal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_even_and_valid() {
        let w = MatchWeights::default();
        assert!(w.validate().is_ok());
        assert_eq!(w.structural, w.category);
    }

    #[test]
    fn rejects_bad_sums_and_negatives() {
        assert_eq!(MatchWeights::new(0.5, 0.5, 0.5, 0.0), Err(WeightsError::BadSum(1.5)));
        assert!(matches!(
            MatchWeights::new(-0.1, 0.6, 0.5, 0.0),
            Err(WeightsError::OutOfRange { name: "structural", .. })
        ));
        assert_eq!(MatchWeights::new(0.0, 0.0, 0.0, 1.0), Err(WeightsError::NoContentSignal));
    }
}
