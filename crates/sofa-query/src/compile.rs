use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::error::QueryError;
use crate::operator::{Operator, tokens, translate};
use crate::selector::Selector;

/// Compile a condition tree into a Mango selector.
pub fn compile(condition: &Condition) -> Result<Selector, QueryError> {
    match condition {
        Condition::Leaf {
            attribute,
            operator,
            value,
        } => compile_leaf(attribute, *operator, value),
        Condition::Not {
            condition,
            comparison,
        } => {
            let mut inner = compile(condition)?;
            match condition.attribute_name() {
                Some(attr) => {
                    let mut negated = Map::new();
                    negated.insert(attr.to_string(), comparison.clone());
                    inner.insert(tokens::NOT, Value::Object(negated));
                    Ok(inner)
                }
                None => {
                    let mut wrapped = Selector::new();
                    wrapped.insert(tokens::NOT, inner.into_value());
                    Ok(wrapped)
                }
            }
        }
        Condition::Group {
            left,
            operator,
            right,
        } => {
            let left = compile(left)?;
            let right = compile(right)?;
            Ok(Selector::group(*operator, vec![left, right]))
        }
    }
}

fn compile_leaf(attribute: &str, operator: Operator, value: &Value) -> Result<Selector, QueryError> {
    let mut clause = Map::new();
    if operator == Operator::Between {
        let Some([min, max]) = value.as_array().map(Vec::as_slice) else {
            return Err(QueryError::Malformed(
                "BETWEEN operator requires [min, max] comparison".into(),
            ));
        };
        clause.insert(tokens::BIGGER_EQ.to_string(), min.clone());
        clause.insert(tokens::SMALLER_EQ.to_string(), max.clone());
    } else {
        clause.insert(translate(operator)?.to_string(), value.clone());
    }
    let mut selector = Selector::new();
    selector.insert(attribute, Value::Object(clause));
    Ok(selector)
}
