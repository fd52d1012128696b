use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// CouchDB view collation: null < false < true < numbers < strings <
/// arrays < objects.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = collate(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| collate(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Resolve a dotted field path.
pub(crate) fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Evaluate a Mango selector against a document.
pub(crate) fn matches(doc: &Map<String, Value>, selector: &Map<String, Value>) -> Result<bool, StoreError> {
    for (key, cond) in selector {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in members(key, cond)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in members(key, cond)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in members(key, cond)? {
                    if matches(doc, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$not" => match cond {
                Value::Object(sub) => !matches(doc, sub)?,
                _ => return Err(invalid("$not requires a selector")),
            },
            op if op.starts_with('$') => {
                return Err(invalid(&format!("unknown combination operator {op}")));
            }
            field => match_field(lookup(doc, field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn members<'a>(key: &str, cond: &'a Value) -> Result<Vec<&'a Map<String, Value>>, StoreError> {
    let Value::Array(items) = cond else {
        return Err(invalid(&format!("{key} requires an array")));
    };
    items
        .iter()
        .map(|i| i.as_object().ok_or_else(|| invalid(&format!("{key} members must be selectors"))))
        .collect()
}

fn is_operator_object(cond: &Value) -> bool {
    match cond {
        Value::Object(o) => !o.is_empty() && o.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn match_field(value: Option<&Value>, cond: &Value) -> Result<bool, StoreError> {
    if !is_operator_object(cond) {
        // Implicit equality.
        return Ok(value.is_some_and(|v| collate(v, cond) == Ordering::Equal));
    }
    let Value::Object(ops) = cond else {
        return Ok(false);
    };
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$exists" => {
                let expected = arg.as_bool().ok_or_else(|| invalid("$exists requires a boolean"))?;
                value.is_some() == expected
            }
            "$not" => !match_field(value, arg)?,
            _ => {
                let Some(v) = value else {
                    return Ok(false);
                };
                apply(op, v, arg)?
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply(op: &str, value: &Value, arg: &Value) -> Result<bool, StoreError> {
    let ord = || collate(value, arg);
    Ok(match op {
        "$eq" => ord() == Ordering::Equal,
        "$ne" => ord() != Ordering::Equal,
        "$gt" => ord() == Ordering::Greater,
        "$gte" => ord() != Ordering::Less,
        "$lt" => ord() == Ordering::Less,
        "$lte" => ord() != Ordering::Greater,
        "$in" | "$nin" => {
            let list = arg
                .as_array()
                .ok_or_else(|| invalid(&format!("{op} requires an array")))?;
            let found = list.iter().any(|item| collate(value, item) == Ordering::Equal);
            if op == "$in" { found } else { !found }
        }
        "$regex" => {
            let pattern = arg.as_str().ok_or_else(|| invalid("$regex requires a string"))?;
            let re = Regex::new(pattern).map_err(|e| invalid(&format!("invalid regex: {e}")))?;
            value.as_str().is_some_and(|s| re.is_match(s))
        }
        other => return Err(invalid(&format!("unknown operator {other}"))),
    })
}

fn invalid(reason: &str) -> StoreError {
    StoreError::bad_request("invalid_operator", reason)
}
