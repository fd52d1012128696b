use std::fmt;

use sofa_query::QueryError;
use sofa_store::StoreError;

/// One failed entry of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub error: String,
    pub reason: Option<String>,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el {}: {}", self.index, self.error)?;
        if let Some(reason) = &self.reason {
            write!(f, " - {reason}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DbError {
    /// Duplicate id, stale revision or rejected credentials.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A query needed an index the database does not have.
    #[error("index error: {0}")]
    Index(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// The model failed its own validation; nothing was sent to the store.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Bookmark misuse, such as asking for page 2 before page 1.
    #[error("paging error: {0}")]
    Paging(String),

    #[error("{}", join_failures(.0))]
    Batch(Vec<BatchFailure>),
}

fn join_failures(failures: &[BatchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl DbError {
    /// Translate a store failure into the adapter taxonomy.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::Http {
                status,
                error,
                reason,
            } => {
                let text = format!("{error}: {reason}");
                match status {
                    401 | 409 | 412 => DbError::Conflict(text),
                    404 => DbError::NotFound(text),
                    400 if is_missing_index(&error, &reason) => DbError::Index(text),
                    400 => DbError::Internal(text),
                    _ => classify_text(text),
                }
            }
            StoreError::Transport(msg) => classify_text(msg),
        }
    }

    /// Like [`DbError::from_store`], prefixing the message with what was
    /// being operated on.
    pub fn from_store_for(err: StoreError, subject: &str) -> Self {
        match DbError::from_store(err) {
            DbError::Conflict(m) => DbError::Conflict(format!("{subject}: {m}")),
            DbError::NotFound(m) => DbError::NotFound(format!("{subject}: {m}")),
            DbError::Index(m) => DbError::Index(format!("{subject}: {m}")),
            DbError::Connection(m) => DbError::Connection(format!("{subject}: {m}")),
            DbError::Internal(m) => DbError::Internal(format!("{subject}: {m}")),
            other => other,
        }
    }
}

fn is_missing_index(error: &str, reason: &str) -> bool {
    error == "no_usable_index" || reason.to_ascii_lowercase().contains("no index exists")
}

fn classify_text(text: String) -> DbError {
    let lower = text.to_ascii_lowercase();
    if lower.contains("econnrefused") || lower.contains("connection refused") {
        DbError::Connection(text)
    } else if lower.contains("already exist") || lower.contains("update conflict") {
        DbError::Conflict(text)
    } else if lower.contains("missing") || lower.contains("deleted") {
        DbError::NotFound(text)
    } else {
        DbError::Internal(text)
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::from_store(e)
    }
}

impl From<QueryError> for DbError {
    fn from(e: QueryError) -> Self {
        DbError::Query(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Internal(format!("serialization error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_classes() {
        for status in [401, 409, 412] {
            assert!(matches!(
                DbError::from_store(StoreError::http(status, "conflict", "x")),
                DbError::Conflict(_)
            ));
        }
        assert!(matches!(
            DbError::from_store(StoreError::not_found("missing")),
            DbError::NotFound(_)
        ));
        assert!(matches!(
            DbError::from_store(StoreError::http(500, "boom", "bad")),
            DbError::Internal(_)
        ));
    }

    #[test]
    fn missing_index_is_index_error() {
        let err = StoreError::bad_request(
            "no_usable_index",
            "No index exists for this sort, try indexing by the sort fields.",
        );
        assert!(matches!(DbError::from_store(err), DbError::Index(_)));
        let other = StoreError::bad_request("bad_request", "invalid selector");
        assert!(matches!(DbError::from_store(other), DbError::Internal(_)));
    }

    #[test]
    fn transport_messages_are_classified() {
        assert!(matches!(
            DbError::from_store(StoreError::Transport("connect ECONNREFUSED 127.0.0.1:5984".into())),
            DbError::Connection(_)
        ));
        assert!(matches!(
            DbError::from_store(StoreError::Transport("Document update conflict".into())),
            DbError::Conflict(_)
        ));
        assert!(matches!(
            DbError::from_store(StoreError::Transport("deleted".into())),
            DbError::NotFound(_)
        ));
    }

    #[test]
    fn subject_prefixes_message() {
        let err = DbError::from_store_for(StoreError::not_found("missing"), "widgets__42");
        assert_eq!(err, DbError::NotFound("widgets__42: not_found: missing".into()));
    }

    #[test]
    fn batch_lists_every_failure() {
        let err = DbError::Batch(vec![
            BatchFailure {
                index: 0,
                error: "conflict".into(),
                reason: Some("Document update conflict.".into()),
            },
            BatchFailure {
                index: 2,
                error: "forbidden".into(),
                reason: None,
            },
        ]);
        assert_eq!(
            err.to_string(),
            "el 0: conflict - Document update conflict.\nel 2: forbidden"
        );
    }
}
