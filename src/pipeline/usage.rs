// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Usage accounting
//!
//! Backends may not know their exact token counts or price. Each number
//! carries an `is_exact` tag; adding anything inexact yields an inexact sum
//! that still holds the best-effort numeric estimate.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// A number that may only be an estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncertainNumber {
    pub value: f64,
    pub is_exact: bool,
}

impl UncertainNumber {
    pub fn exact(value: f64) -> Self {
        Self {
            value,
            is_exact: true,
        }
    }

    pub fn estimate(value: f64) -> Self {
        Self {
            value,
            is_exact: false,
        }
    }

    /// Exact count when the backend reported one, otherwise an unknown zero
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) => Self::exact(v),
            None => Self::estimate(0.0),
        }
    }
}

impl Default for UncertainNumber {
    fn default() -> Self {
        Self::exact(0.0)
    }
}

impl Add for UncertainNumber {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            is_exact: self.is_exact && rhs.is_exact,
        }
    }
}

impl AddAssign for UncertainNumber {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::fmt::Display for UncertainNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_exact {
            write!(f, "{}", self.value)
        } else {
            write!(f, "~{}", self.value)
        }
    }
}

/// Cost of one or more model calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Price in USD
    pub price: UncertainNumber,
    pub input_tokens: UncertainNumber,
    pub output_tokens: UncertainNumber,
}

impl Usage {
    /// Usage of a call that cost nothing, such as a substitution
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_exact(&self) -> bool {
        self.price.is_exact && self.input_tokens.is_exact && self.output_tokens.is_exact
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            price: self.price + rhs.price,
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Usage::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Usage> for Usage {
    fn sum<I: Iterator<Item = &'a Usage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_plus_exact_is_exact() {
        let sum = UncertainNumber::exact(2.0) + UncertainNumber::exact(3.0);
        assert_eq!(sum, UncertainNumber::exact(5.0));
    }

    #[test]
    fn test_uncertainty_propagates() {
        let sum = UncertainNumber::exact(2.0) + UncertainNumber::estimate(3.0);
        assert!(!sum.is_exact);
        assert_eq!(sum.value, 5.0);
        assert_eq!(sum.to_string(), "~5");
    }

    #[test]
    fn test_usage_sum() {
        let a = Usage {
            price: UncertainNumber::exact(0.5),
            input_tokens: UncertainNumber::exact(10.0),
            output_tokens: UncertainNumber::exact(20.0),
        };
        let b = Usage {
            price: UncertainNumber::from_option(None),
            input_tokens: UncertainNumber::exact(1.0),
            output_tokens: UncertainNumber::exact(2.0),
        };

        let total: Usage = [a, b].iter().sum();
        assert_eq!(total.input_tokens, UncertainNumber::exact(11.0));
        assert_eq!(total.output_tokens, UncertainNumber::exact(22.0));
        assert!(!total.price.is_exact);
        assert_eq!(total.price.value, 0.5);
        assert!(!total.is_exact());

        let empty: Usage = std::iter::empty::<Usage>().sum();
        assert!(empty.is_exact());
    }
}
