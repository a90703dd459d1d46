//! Translation energies.
//!
//! TransE (Bordes et al. 2013) reads a relation as a translation: if
//! `(h, r, t)` holds then `h + r ≈ t`, so the residual `h + r - t` should be
//! short. The norm used to measure it is a model hyperparameter.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Norm applied to the translation residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    /// Manhattan distance, `Σ |x|`.
    L1,
    /// Euclidean distance, `sqrt(Σ x²)`.
    L2,
}

impl Norm {
    /// Norm from the conventional `p_norm` integer (1 or 2).
    pub fn from_p(p: u32) -> Option<Self> {
        match p {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            _ => None,
        }
    }

    /// The `p` of this norm.
    pub fn p(self) -> u32 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
        }
    }

    /// `|| h + r - t ||`.
    pub fn energy(self, h: ArrayView1<f32>, r: ArrayView1<f32>, t: ArrayView1<f32>) -> f32 {
        let residual = h.iter().zip(r.iter()).zip(t.iter()).map(|((h, r), t)| h + r - t);
        self.reduce(residual)
    }

    /// `|| x ||` over an arbitrary residual.
    pub fn reduce(self, residual: impl Iterator<Item = f32>) -> f32 {
        match self {
            Self::L1 => residual.map(f32::abs).sum(),
            Self::L2 => residual.map(|x| x * x).sum::<f32>().sqrt(),
        }
    }

    /// Subgradient of the norm at `x`, written into `out`.
    pub fn gradient(self, x: &[f32], out: &mut [f32]) {
        match self {
            Self::L1 => {
                for (o, v) in out.iter_mut().zip(x) {
                    *o = if *v > 0.0 {
                        1.0
                    } else if *v < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };
                }
            }
            Self::L2 => {
                let n = x.iter().map(|v| v * v).sum::<f32>().sqrt();
                let inv = if n > 1e-12 { 1.0 / n } else { 0.0 };
                for (o, v) in out.iter_mut().zip(x) {
                    *o = v * inv;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_translation_is_zero() {
        let h = array![1.0, 0.0, 0.0];
        let r = array![0.0, 1.0, 0.0];
        let t = array![1.0, 1.0, 0.0];
        assert!(Norm::L2.energy(h.view(), r.view(), t.view()).abs() < 1e-6);
        assert!(Norm::L1.energy(h.view(), r.view(), t.view()).abs() < 1e-6);
    }

    #[test]
    fn test_l1_vs_l2() {
        let h = array![0.0, 0.0];
        let r = array![3.0, 4.0];
        let t = array![0.0, 0.0];
        assert!((Norm::L2.energy(h.view(), r.view(), t.view()) - 5.0).abs() < 1e-6);
        assert!((Norm::L1.energy(h.view(), r.view(), t.view()) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradient() {
        let mut g = [0.0; 3];
        Norm::L1.gradient(&[2.0, -0.5, 0.0], &mut g);
        assert_eq!(g, [1.0, -1.0, 0.0]);

        Norm::L2.gradient(&[3.0, 4.0, 0.0], &mut g);
        assert!((g[0] - 0.6).abs() < 1e-6 && (g[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_from_p() {
        assert_eq!(Norm::from_p(1), Some(Norm::L1));
        assert_eq!(Norm::from_p(2).map(Norm::p), Some(2));
        assert_eq!(Norm::from_p(3), None);
    }
}
