/// Failure reported by a document store primitive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The server answered with an error status and a CouchDB error body.
    #[error("{status} {error}: {reason}")]
    Http {
        status: u16,
        error: String,
        reason: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn http(status: u16, error: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Http {
            status,
            error: error.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::http(404, "not_found", reason)
    }

    pub fn conflict() -> Self {
        Self::http(409, "conflict", "Document update conflict.")
    }

    pub fn bad_request(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::http(400, error, reason)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            StoreError::Transport(_) => None,
        }
    }
}
