//! Comparison operators for check responses
//!
//! Operators are resolved through a fixed table of comparison functions; the
//! configured string is never interpreted as code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    /// `desired` occurs as a substring of `actual`
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

type Comparator = fn(&str, &str) -> bool;

fn equals(desired: &str, actual: &str) -> bool {
    desired == actual
}

fn differs(desired: &str, actual: &str) -> bool {
    desired != actual
}

fn contained(desired: &str, actual: &str) -> bool {
    actual.contains(desired)
}

fn not_contained(desired: &str, actual: &str) -> bool {
    !actual.contains(desired)
}

static COMPARATORS: [(Operator, &str, Comparator); 4] = [
    (Operator::Eq, "==", equals),
    (Operator::Ne, "!=", differs),
    (Operator::In, "in", contained),
    (Operator::NotIn, "not in", not_contained),
];

impl Operator {
    pub const ALL: [Operator; 4] = [Operator::Eq, Operator::Ne, Operator::In, Operator::NotIn];

    pub fn default_online() -> Self {
        Operator::Eq
    }

    pub fn default_log_tail() -> Self {
        Operator::In
    }

    fn entry(&self) -> &'static (Operator, &'static str, Comparator) {
        // the table covers every variant
        match self {
            Operator::Eq => &COMPARATORS[0],
            Operator::Ne => &COMPARATORS[1],
            Operator::In => &COMPARATORS[2],
            Operator::NotIn => &COMPARATORS[3],
        }
    }

    pub fn symbol(&self) -> &'static str {
        self.entry().1
    }

    /// Compare the configured `desired` value against the observed `actual` one
    pub fn evaluate(&self, desired: &str, actual: &str) -> bool {
        (self.entry().2)(desired, actual)
    }

    /// Only substring operators make sense against a block of log lines
    pub fn is_containment(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operator `{}`", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        COMPARATORS
            .iter()
            .find(|(_, symbol, _)| *symbol == s.trim())
            .map(|(operator, _, _)| *operator)
            .ok_or_else(|| UnknownOperator(s.to_string()))
    }
}
