use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The remote API answered with `ok: false`
    #[error("{method} | error #{code} - {name}")]
    Api { code: i64, name: String, method: &'static str },

    /// Transport-level failure talking to the remote API
    #[error("request to {method} failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote API answered with a body we could not decode
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// `ok: true` envelope without a `result` field
    #[error("{method} returned no result")]
    MissingResult { method: &'static str },

    /// `start_polling` called while the reconciliation loop is running
    #[error("polling already active")]
    PollingAlreadyActive,

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether the failure came from talking to the remote API, as opposed to local misuse.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Api { .. } | Error::Http { .. } | Error::Decode { .. } | Error::MissingResult { .. }
        )
    }
}

/// Type alias for crate results
pub type Result<T> = std::result::Result<T, Error>;
