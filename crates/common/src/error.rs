//! Error types for LabDash

use thiserror::Error;

/// Result type alias using LabDash Error
pub type Result<T> = std::result::Result<T, Error>;

/// LabDash error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a status >= 400. The body is kept verbatim.
    #[error("request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("pfSense error: {0}")]
    Firewall(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the name of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Decode {
            what: what.into(),
            source,
        }
    }

    /// HTTP status code reported by the remote API, looking through context wrappers.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Context { source, .. } => source.api_status(),
            _ => None,
        }
    }
}

/// Attach operation names to fallible results.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().context(f()))
    }
}
