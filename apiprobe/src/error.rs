use thiserror::Error;

/// Errors raised while loading documents, generating values, executing a
/// step, or reconciling its result. An error aborts the current step only;
/// the plan runner decides whether the remaining steps still run.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed swagger or plan content: unknown format string, conflicting
    /// numeric bounds, unknown method, schema without a type.
    #[error("invalid document: {0}")]
    Invalid(String),
    /// A step references a path, operation or definition the swagger does
    /// not declare.
    #[error("not found: {0}")]
    NotFound(String),
    /// Transport failure, or a GET result that contradicts the request
    /// criteria or the mirrored state.
    #[error("http: {0}")]
    Http(String),
    /// The response status or body did not match the step's expectation.
    #[error("expectation failed: {0}")]
    Expect(String),
    /// An object was rejected by schema matching, either at insert time or
    /// while parsing a response body.
    #[error("schema mismatch: {0}")]
    Mismatch(String),
}

impl Error {
    /// Stable lowercase name of the error kind, used in run summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Invalid(_) => "invalid",
            Error::NotFound(_) => "not_found",
            Error::Http(_) => "http",
            Error::Expect(_) => "expect",
            Error::Mismatch(_) => "mismatch",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
