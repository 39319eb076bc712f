//! Fitness values and the dominance relations used to rank individuals.
//!
//! Three relations are provided. `is_fitter` answers "is this better";
//! `is_dominant` is the stable relation used for sorting, and for every
//! variant here it coincides with `is_fitter`; `is_distinguishable` is
//! equality with tolerance. Larger is better unless wrapped in
//! [`Fitness::Reverse`].

use crate::engines::generation::pareto;
use crate::error::{EvoError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const DEFAULT_REL_TOL: f64 = 1e-9;
pub const DEFAULT_ABS_TOL: f64 = 0.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Fitness {
    /// Exact integer value.
    Integer(i64),
    /// Exact floating point value; prefer `Scalar` to absorb rounding noise.
    Float(f64),
    /// Floating point value compared with relative and absolute tolerance.
    Scalar { value: f64, rel_tol: f64, abs_tol: f64 },
    /// Slots compared in order, the first distinguishable slot decides.
    Lexicographic(Vec<Fitness>),
    /// Multi-objective vector; only a partial order.
    Pareto(Vec<Fitness>),
    /// Flips polarity: smaller becomes better.
    Reverse(Box<Fitness>),
}

impl Fitness {
    pub fn scalar(value: f64) -> Self {
        Fitness::Scalar {
            value,
            rel_tol: DEFAULT_REL_TOL,
            abs_tol: DEFAULT_ABS_TOL,
        }
    }

    pub fn scalar_with_tolerance(value: f64, rel_tol: f64, abs_tol: f64) -> Self {
        Fitness::Scalar { value, rel_tol, abs_tol }
    }

    /// Lexicographic vector of default-tolerance scalars.
    pub fn lexicographic<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Fitness::Lexicographic(values.into_iter().map(Fitness::scalar).collect())
    }

    /// Pareto vector of default-tolerance scalars.
    pub fn pareto<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Fitness::Pareto(values.into_iter().map(Fitness::scalar).collect())
    }

    pub fn reverse(inner: Fitness) -> Self {
        Fitness::Reverse(Box::new(inner))
    }

    /// Fails if the two values cannot be meaningfully compared.
    pub fn check_comparable(&self, other: &Fitness) -> Result<()> {
        use Fitness::*;
        match (self, other) {
            (Integer(_), Integer(_)) | (Float(_), Float(_)) => Ok(()),
            (
                Scalar { rel_tol: r1, abs_tol: a1, .. },
                Scalar { rel_tol: r2, abs_tol: a2, .. },
            ) => {
                if r1 != r2 || a1 != a2 {
                    return Err(EvoError::Fitness(format!(
                        "different tolerances: {}r/{}a vs. {}r/{}a",
                        r1, a1, r2, a2
                    )));
                }
                Ok(())
            }
            (Lexicographic(v1), Lexicographic(v2)) | (Pareto(v1), Pareto(v2)) => {
                if v1.len() != v2.len() {
                    return Err(EvoError::Fitness(format!(
                        "fitness vectors of different size ({} vs. {})",
                        self, other
                    )));
                }
                v1.iter().zip(v2).try_for_each(|(a, b)| a.check_comparable(b))
            }
            (Reverse(a), Reverse(b)) => a.check_comparable(b),
            _ => Err(EvoError::Fitness(format!(
                "different fitness types: {} and {}",
                self.kind_name(),
                other.kind_name()
            ))),
        }
    }

    /// Whether `self` is better than `other`.
    pub fn is_fitter(&self, other: &Fitness) -> bool {
        use Fitness::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a > b,
            (Float(a), Float(b)) => a > b,
            (Scalar { value: a, .. }, Scalar { value: b, .. }) => {
                self.is_distinguishable(other) && a > b
            }
            (Lexicographic(v1), Lexicographic(v2)) => v1
                .iter()
                .zip(v2)
                .find(|(a, b)| a.is_distinguishable(b))
                .map(|(a, b)| a.is_fitter(b))
                .unwrap_or(false),
            (Pareto(v1), Pareto(v2)) => pareto::dominates(v1, v2),
            (Reverse(a), Reverse(b)) => b.is_fitter(a),
            _ => false,
        }
    }

    /// Stable refinement of `is_fitter`, used for sorting.
    pub fn is_dominant(&self, other: &Fitness) -> bool {
        match (self, other) {
            (Fitness::Reverse(a), Fitness::Reverse(b)) => b.is_dominant(a),
            _ => self.is_fitter(other),
        }
    }

    /// Whether any difference can be perceived; incomparable values always differ.
    pub fn is_distinguishable(&self, other: &Fitness) -> bool {
        use Fitness::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a != b,
            (Float(a), Float(b)) => a != b,
            (
                Scalar { value: a, rel_tol, abs_tol },
                Scalar { value: b, .. },
            ) => !is_close(*a, *b, *rel_tol, *abs_tol),
            (Lexicographic(v1), Lexicographic(v2)) | (Pareto(v1), Pareto(v2)) => {
                v1.len() != v2.len() || v1.iter().zip(v2).any(|(a, b)| a.is_distinguishable(b))
            }
            (Reverse(a), Reverse(b)) => a.is_distinguishable(b),
            _ => true,
        }
    }

    /// First numeric component, sign-flipped under `Reverse`; used for reporting.
    pub fn primary_value(&self) -> Option<f64> {
        match self {
            Fitness::Integer(v) => Some(*v as f64),
            Fitness::Float(v) => Some(*v),
            Fitness::Scalar { value, .. } => Some(*value),
            Fitness::Lexicographic(v) | Fitness::Pareto(v) => v.first().and_then(Fitness::primary_value),
            Fitness::Reverse(inner) => inner.primary_value().map(|v| -v),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Fitness::Integer(_) => "Integer",
            Fitness::Float(_) => "Float",
            Fitness::Scalar { .. } => "Scalar",
            Fitness::Lexicographic(_) => "Lexicographic",
            Fitness::Pareto(_) => "Pareto",
            Fitness::Reverse(_) => "Reverse",
        }
    }
}

fn is_close(a: f64, b: f64, rel_tol: f64, abs_tol: f64) -> bool {
    if a == b {
        return true;
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol)
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        !self.is_distinguishable(other)
    }
}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_fitter(other) {
            Some(Ordering::Greater)
        } else if other.is_fitter(self) {
            Some(Ordering::Less)
        } else if !self.is_distinguishable(other) {
            Some(Ordering::Equal)
        } else {
            None
        }
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fitness::Integer(v) => write!(f, "{}", v),
            Fitness::Float(v) => write!(f, "{:?}", v),
            Fitness::Scalar { value, .. } => write!(f, "{}", value),
            Fitness::Lexicographic(v) | Fitness::Pareto(v) => {
                write!(f, "(")?;
                for (i, slot) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", slot)?;
                }
                write!(f, ")")
            }
            Fitness::Reverse(inner) => write!(f, "rev:{}", inner),
        }
    }
}

impl From<i64> for Fitness {
    fn from(value: i64) -> Self {
        Fitness::Integer(value)
    }
}

impl From<f64> for Fitness {
    fn from(value: f64) -> Self {
        Fitness::scalar(value)
    }
}

impl From<Vec<f64>> for Fitness {
    fn from(values: Vec<f64>) -> Self {
        Fitness::lexicographic(values)
    }
}
