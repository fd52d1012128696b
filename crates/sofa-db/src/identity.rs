use crate::error::DbError;
use crate::keys::SEPARATOR;
use crate::model::{KeyKind, KeyValue};

/// Store id of the record `key` in `table`.
pub fn generate_id(table: &str, key: &KeyValue) -> Result<String, DbError> {
    if table.contains(SEPARATOR) {
        return Err(DbError::Internal(format!(
            "table {table:?} contains the id separator {SEPARATOR:?}"
        )));
    }
    Ok(format!("{table}{SEPARATOR}{key}"))
}

/// The primary-key part of a store id. Only the exact `table__` prefix is
/// removed, so keys containing the separator survive intact.
pub fn parse_id<'a>(table: &str, id: &'a str) -> Result<&'a str, DbError> {
    id.strip_prefix(table)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .ok_or_else(|| DbError::Internal(format!("id {id:?} does not belong to table {table:?}")))
}

pub fn parse_sequence_value(kind: KeyKind, raw: &str) -> Result<KeyValue, DbError> {
    match kind {
        KeyKind::Text => Ok(KeyValue::Text(raw.to_string())),
        KeyKind::Number => raw
            .parse()
            .map(KeyValue::Number)
            .map_err(|e| DbError::Internal(format!("invalid numeric key {raw:?}: {e}"))),
        KeyKind::BigInt => raw
            .parse()
            .map(KeyValue::BigInt)
            .map_err(|e| DbError::Internal(format!("invalid bigint key {raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_joins_table_and_key() {
        assert_eq!(generate_id("widgets", &"42".into()).unwrap(), "widgets__42");
        assert_eq!(generate_id("widgets", &KeyValue::Number(7)).unwrap(), "widgets__7");
    }

    #[test]
    fn separator_in_table_is_rejected() {
        assert!(generate_id("a__b", &"1".into()).is_err());
    }

    #[test]
    fn parse_strips_only_table_prefix() {
        assert_eq!(parse_id("widgets", "widgets__42").unwrap(), "42");
        assert_eq!(parse_id("widgets", "widgets__a__b").unwrap(), "a__b");
        assert!(parse_id("widgets", "gadgets__1").is_err());
        assert!(parse_id("widgets", "widgets42").is_err());
    }

    #[test]
    fn sequence_values_parse_by_kind() {
        assert_eq!(
            parse_sequence_value(KeyKind::Number, "12").unwrap(),
            KeyValue::Number(12)
        );
        assert_eq!(
            parse_sequence_value(KeyKind::Text, "007").unwrap(),
            KeyValue::Text("007".into())
        );
        assert!(parse_sequence_value(KeyKind::Number, "x").is_err());
        assert_eq!(
            parse_sequence_value(KeyKind::BigInt, "99999999999999999999").unwrap(),
            KeyValue::BigInt(99_999_999_999_999_999_999)
        );
    }
}
