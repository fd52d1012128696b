/// Errors raised while turning a condition tree into a selector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("could not find adapter translation for operator {0}")]
    UnsupportedOperator(String),

    #[error("malformed condition: {0}")]
    Malformed(String),
}
