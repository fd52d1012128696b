use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Mango selector tokens.
pub mod tokens {
    pub const EQUAL: &str = "$eq";
    pub const DIFFERENT: &str = "$ne";
    pub const BIGGER: &str = "$gt";
    pub const BIGGER_EQ: &str = "$gte";
    pub const SMALLER: &str = "$lt";
    pub const SMALLER_EQ: &str = "$lte";
    pub const NOT: &str = "$not";
    pub const IN: &str = "$in";
    pub const NOT_IN: &str = "$nin";
    pub const REGEXP: &str = "$regex";
    pub const EXISTS: &str = "$exists";
    pub const AND: &str = "$and";
    pub const OR: &str = "$or";
    pub const NOR: &str = "$nor";
}

/// Comparison operators a condition leaf can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    Different,
    Bigger,
    BiggerEq,
    Smaller,
    SmallerEq,
    Not,
    In,
    Regexp,
    /// Inclusive range. Has no single selector token; the compiler splits it
    /// into a `$gte`/`$lte` pair.
    Between,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Equal => "EQUAL",
            Operator::Different => "DIFFERENT",
            Operator::Bigger => "BIGGER",
            Operator::BiggerEq => "BIGGER_EQ",
            Operator::Smaller => "SMALLER",
            Operator::SmallerEq => "SMALLER_EQ",
            Operator::Not => "NOT",
            Operator::In => "IN",
            Operator::Regexp => "REGEXP",
            Operator::Between => "BETWEEN",
        };
        f.write_str(name)
    }
}

/// Logical operators joining two conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOperator {
    And,
    Or,
}

impl GroupOperator {
    pub fn token(self) -> &'static str {
        match self {
            GroupOperator::And => tokens::AND,
            GroupOperator::Or => tokens::OR,
        }
    }

    /// Reverse lookup used when inspecting compiled selectors.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            tokens::AND => Some(GroupOperator::And),
            tokens::OR => Some(GroupOperator::Or),
            _ => None,
        }
    }
}

impl fmt::Display for GroupOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupOperator::And => f.write_str("AND"),
            GroupOperator::Or => f.write_str("OR"),
        }
    }
}

/// Translate a comparison operator into its Mango token.
pub fn translate(operator: Operator) -> Result<&'static str, QueryError> {
    match operator {
        Operator::Equal => Ok(tokens::EQUAL),
        Operator::Different => Ok(tokens::DIFFERENT),
        Operator::Bigger => Ok(tokens::BIGGER),
        Operator::BiggerEq => Ok(tokens::BIGGER_EQ),
        Operator::Smaller => Ok(tokens::SMALLER),
        Operator::SmallerEq => Ok(tokens::SMALLER_EQ),
        Operator::Not => Ok(tokens::NOT),
        Operator::In => Ok(tokens::IN),
        Operator::Regexp => Ok(tokens::REGEXP),
        Operator::Between => Err(QueryError::UnsupportedOperator(operator.to_string())),
    }
}
