use thiserror::Error;

/// Errors surfaced to callers. Soft failures (classification fallback,
/// per-article summary loss) never appear here: those degrade in place and
/// are only logged.
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected before any core logic ran.
    #[error("invalid {stage}: {message}")]
    InvalidInput {
        stage: &'static str,
        message: String,
    },

    /// A lookup for a specific resource came back empty.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    /// An upstream collaborator failed and no fallback exists. The message
    /// is logged at the HTTP boundary, never returned to the caller.
    #[error("upstream unavailable ({stage}): {message}")]
    Upstream {
        stage: &'static str,
        message: String,
    },
}

impl Error {
    pub fn invalid(stage: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            stage,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Upstream {
            stage: "document-store",
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_upstream() {
        let err: Error = sqlx::Error::RowNotFound.into();
        match err {
            Error::Upstream { stage, .. } => assert_eq!(stage, "document-store"),
            other => panic!("expected upstream, got {:?}", other),
        }
    }
}
