use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operator::{GroupOperator, Operator};

/// A boolean condition tree over model attributes.
///
/// Leaves compare one attribute against a value; internal nodes join two
/// sub-conditions with a logical operator. A negation carries the inner
/// condition plus the comparison value the negated clause is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Leaf {
        attribute: String,
        operator: Operator,
        value: Value,
    },
    Not {
        condition: Box<Condition>,
        comparison: Value,
    },
    Group {
        left: Box<Condition>,
        operator: GroupOperator,
        right: Box<Condition>,
    },
}

impl Condition {
    /// Start a leaf condition on `name`.
    pub fn attribute(name: impl Into<String>) -> AttributeRef {
        AttributeRef { name: name.into() }
    }

    pub fn leaf(attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Condition::Leaf {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn not(condition: Condition, comparison: impl Into<Value>) -> Self {
        Condition::Not {
            condition: Box::new(condition),
            comparison: comparison.into(),
        }
    }

    pub fn group(left: Condition, operator: GroupOperator, right: Condition) -> Self {
        Condition::Group {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::group(self, GroupOperator::And, other)
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::group(self, GroupOperator::Or, other)
    }

    /// The attribute of a leaf (or of the leaf under a negation).
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            Condition::Leaf { attribute, .. } => Some(attribute),
            Condition::Not { condition, .. } => condition.attribute_name(),
            Condition::Group { .. } => None,
        }
    }

    /// Render the condition as a JavaScript boolean expression over
    /// `doc_var`, for use as a guard inside a view map function.
    pub fn to_js(&self, doc_var: &str) -> String {
        match self {
            Condition::Group {
                left,
                operator,
                right,
            } => {
                let joiner = match operator {
                    GroupOperator::And => "&&",
                    GroupOperator::Or => "||",
                };
                format!("({} {joiner} {})", left.to_js(doc_var), right.to_js(doc_var))
            }
            Condition::Not { condition, .. } => format!("!({})", condition.to_js(doc_var)),
            Condition::Leaf {
                attribute,
                operator,
                value,
            } => {
                let attr = format!("{doc_var}[{}]", js_literal(&Value::String(attribute.clone())));
                let lit = js_literal(value);
                match operator {
                    Operator::Equal => format!("{attr} === {lit}"),
                    Operator::Different => format!("{attr} !== {lit}"),
                    Operator::Bigger => format!("{attr} > {lit}"),
                    Operator::BiggerEq => format!("{attr} >= {lit}"),
                    Operator::Smaller => format!("{attr} < {lit}"),
                    Operator::SmallerEq => format!("{attr} <= {lit}"),
                    Operator::In => format!("({lit}).indexOf({attr}) !== -1"),
                    Operator::Regexp => format!("new RegExp({lit}).test({attr})"),
                    Operator::Not => format!("!({attr} === {lit})"),
                    Operator::Between => match value.as_array().map(Vec::as_slice) {
                        Some([min, max]) => format!(
                            "({attr} >= {} && {attr} <= {})",
                            js_literal(min),
                            js_literal(max)
                        ),
                        _ => "true".to_string(),
                    },
                }
            }
        }
    }
}

fn js_literal(value: &Value) -> String {
    // JSON is a subset of JS literal syntax.
    value.to_string()
}

/// Fluent leaf builder returned by [`Condition::attribute`].
#[derive(Debug, Clone)]
pub struct AttributeRef {
    name: String,
}

impl AttributeRef {
    fn build(self, operator: Operator, value: impl Into<Value>) -> Condition {
        Condition::leaf(self.name, operator, value)
    }

    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.build(Operator::Equal, value)
    }

    pub fn dif(self, value: impl Into<Value>) -> Condition {
        self.build(Operator::Different, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.build(Operator::Bigger, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Condition {
        self.build(Operator::BiggerEq, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.build(Operator::Smaller, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Condition {
        self.build(Operator::SmallerEq, value)
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Condition {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.build(Operator::In, Value::Array(list))
    }

    pub fn regexp(self, pattern: impl Into<String>) -> Condition {
        self.build(Operator::Regexp, Value::String(pattern.into()))
    }

    pub fn between(self, min: impl Into<Value>, max: impl Into<Value>) -> Condition {
        self.build(Operator::Between, Value::Array(vec![min.into(), max.into()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_produces_leaf() {
        let cond = Condition::attribute("age").gt(18);
        assert_eq!(
            cond,
            Condition::Leaf {
                attribute: "age".into(),
                operator: Operator::Bigger,
                value: json!(18),
            }
        );
        assert_eq!(cond.attribute_name(), Some("age"));
    }

    #[test]
    fn group_has_no_attribute() {
        let cond = Condition::attribute("a")
            .eq(1)
            .and(Condition::attribute("b").eq(2));
        assert_eq!(cond.attribute_name(), None);
    }

    #[test]
    fn js_guard_rendering() {
        let cond = Condition::attribute("status")
            .eq("active")
            .or(Condition::attribute("score").gte(10));
        assert_eq!(
            cond.to_js("doc"),
            r#"(doc["status"] === "active" || doc["score"] >= 10)"#
        );
    }

    #[test]
    fn js_guard_membership_and_negation() {
        let cond = Condition::not(Condition::attribute("tag").in_list(["a", "b"]), json!(null));
        assert_eq!(cond.to_js("d"), r#"!((["a","b"]).indexOf(d["tag"]) !== -1)"#);
    }

    #[test]
    fn serde_round_trip() {
        let cond = Condition::attribute("name").regexp("^jo");
        let json = serde_json::to_value(&cond).unwrap();
        let back: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(back, cond);
    }
}
