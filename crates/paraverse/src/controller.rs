//! Patience-based early stopping on validation Hits@10.

use serde::{Deserialize, Serialize};

fn default_patience() -> usize {
    10
}

/// Outcome of one validation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New best; the caller should checkpoint.
    Improved,
    NoImprovement,
    /// `patience` rounds in a row without improvement; stop generating.
    Exhausted,
}

/// Tracks the best validation Hits@10 and the rounds since it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default)]
    pub best_hit10: f64,
    #[serde(default)]
    pub bad_counts: usize,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(default_patience())
    }
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_hit10: 0.0,
            bad_counts: 0,
        }
    }

    /// Record a validation result.
    pub fn observe(&mut self, hit10: f64) -> Verdict {
        if hit10 > self.best_hit10 {
            self.best_hit10 = hit10;
            self.bad_counts = 0;
            return Verdict::Improved;
        }
        self.bad_counts += 1;
        if self.is_exhausted() {
            Verdict::Exhausted
        } else {
            Verdict::NoImprovement
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.bad_counts >= self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improvement_resets_bad_counts() {
        let mut es = EarlyStopping::new(3);
        assert_eq!(es.observe(0.2), Verdict::Improved);
        assert_eq!(es.observe(0.1), Verdict::NoImprovement);
        assert_eq!(es.observe(0.2), Verdict::NoImprovement);
        assert_eq!(es.bad_counts, 2);
        assert_eq!(es.observe(0.3), Verdict::Improved);
        assert_eq!(es.bad_counts, 0);
        assert_eq!(es.best_hit10, 0.3);
    }

    #[test]
    fn test_halts_patience_rounds_after_peak() {
        let mut es = EarlyStopping::default();
        assert_eq!(es.observe(0.5), Verdict::Improved);
        for _ in 0..9 {
            assert_eq!(es.observe(0.4), Verdict::NoImprovement);
        }
        assert_eq!(es.observe(0.5), Verdict::Exhausted);
    }

    #[test]
    fn test_zero_is_not_an_improvement() {
        let mut es = EarlyStopping::new(1);
        assert_eq!(es.observe(0.0), Verdict::Exhausted);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let es: EarlyStopping = serde_json::from_str(r#"{"best_hit10":0.7}"#).unwrap();
        assert_eq!(es.patience, 10);
        assert_eq!(es.bad_counts, 0);
    }
}
