use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostics, Warning};
use crate::operator::{GroupOperator, tokens};

/// A Mango selector: attribute names or logical tokens mapped to clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(Map<String, Value>);

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{ attribute: { "$eq": value } }`
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut clause = Map::new();
        clause.insert(tokens::EQUAL.to_string(), value.into());
        let mut map = Map::new();
        map.insert(attribute.into(), Value::Object(clause));
        Self(map)
    }

    /// `{ token: [members...] }`
    pub fn group(operator: GroupOperator, members: Vec<Selector>) -> Self {
        let mut map = Map::new();
        map.insert(
            operator.token().to_string(),
            Value::Array(members.into_iter().map(Selector::into_value).collect()),
        );
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// If this selector is exactly one logical group, return its operator
    /// and members.
    pub fn single_group(&self) -> Option<(GroupOperator, &Vec<Value>)> {
        if self.0.len() != 1 {
            return None;
        }
        let (key, value) = self.0.iter().next()?;
        let op = GroupOperator::from_token(key)?;
        value.as_array().map(|members| (op, members))
    }

    /// Whether `attribute` is constrained at the top level or inside a
    /// top-level `$and` member.
    pub fn constrains(&self, attribute: &str) -> bool {
        if self.0.contains_key(attribute) {
            return true;
        }
        match self.single_group() {
            Some((GroupOperator::And, members)) => members
                .iter()
                .any(|m| m.as_object().is_some_and(|o| o.contains_key(attribute))),
            _ => false,
        }
    }

    /// Split into single-key conjunction members. A top-level `$and` yields
    /// its members unchanged.
    fn into_members(self) -> Vec<Value> {
        if let Some((GroupOperator::And, _)) = self.single_group() {
            let mut map = self.0;
            if let Some(Value::Array(members)) = map.remove(tokens::AND) {
                return members;
            }
            return Vec::new();
        }
        self.0
            .into_iter()
            .map(|(k, v)| {
                let mut m = Map::new();
                m.insert(k, v);
                Value::Object(m)
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Selector {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Selector> for Value {
    fn from(selector: Selector) -> Self {
        selector.into_value()
    }
}

/// Collapse nested conjunctions: `{$and: [{$and: [a, b]}, c]}` becomes
/// `{$and: [a, b, c]}`. Anything that is not a single `$and` is returned
/// untouched.
pub fn flatten_and(selector: Selector) -> Selector {
    match selector.single_group() {
        Some((GroupOperator::And, _)) => {}
        _ => return selector,
    }
    let mut flat = Vec::new();
    for member in selector.into_members() {
        push_flattened(member, &mut flat);
    }
    and_of(flat)
}

fn and_of(members: Vec<Value>) -> Selector {
    let mut map = Map::new();
    map.insert(tokens::AND.to_string(), Value::Array(members));
    Selector(map)
}

fn push_flattened(member: Value, out: &mut Vec<Value>) {
    match member {
        Value::Object(obj) => {
            let nested = Selector(obj);
            match nested.single_group() {
                Some((GroupOperator::And, _)) => {
                    for inner in nested.into_members() {
                        push_flattened(inner, out);
                    }
                }
                _ => out.push(nested.into_value()),
            }
        }
        other => out.push(other),
    }
}

/// Merge a compiled condition into an existing selector.
///
/// A conjunction is flattened and the base clauses join it as extra
/// members. A disjunction is wrapped with the base clauses under a fresh
/// `$and` so existing constraints still apply. Plain attribute clauses are
/// merged key by key; a collision replaces the earlier clause and is
/// reported through `diagnostics`.
pub fn merge_into(base: &mut Selector, compiled: Selector, diagnostics: &mut Diagnostics) {
    match compiled.single_group() {
        Some((GroupOperator::And, _)) => {
            let mut members = flatten_and(compiled).into_members();
            for clause in std::mem::take(base).into_members() {
                if !members.contains(&clause) {
                    members.push(clause);
                }
            }
            *base = and_of(members);
        }
        Some((GroupOperator::Or, _)) => {
            let mut members = vec![compiled.into_value()];
            members.extend(std::mem::take(base).into_members());
            *base = and_of(members);
        }
        None => {
            for (key, value) in compiled.into_map() {
                if let Some(previous) = base.get(&key)
                    && previous != &value
                {
                    diagnostics.warn(Warning::SelectorKeyOverridden {
                        key: key.clone(),
                        previous: previous.clone(),
                        replacement: value.clone(),
                    });
                }
                base.insert(key, value);
            }
        }
    }
}
