//! Error taxonomy shared by the RPC clients and the workflow orchestrator.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field was blank or a precondition on local state failed.
    /// Never produced after a request has been sent.
    #[error("{0}")]
    Validation(String),

    /// No credential is available, or the server rejected it.
    #[error("authentication required: {0}")]
    Auth(String),

    /// Non-success response (or no response at all) from the persistence service.
    #[error("{}", describe("remote service", *status, detail))]
    Remote { status: Option<u16>, detail: String },

    /// Failure reported by the content service.
    #[error("{}", describe("content generation", *status, detail))]
    Generation { status: Option<u16>, detail: String },

    #[error("export failed: {0}")]
    Export(String),

    /// Another operation already holds the project or the section.
    #[error("{0}")]
    Busy(String),

    /// A failure while working on one section; names the section for the user.
    #[error("section \"{section}\": {cause}")]
    Section { section: String, cause: Box<Error> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn describe(what: &str, status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("{what} failed ({code}): {detail}"),
        None => format!("{what} failed: {detail}"),
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn remote(status: Option<u16>, detail: impl Into<String>) -> Self {
        Error::Remote {
            status,
            detail: detail.into(),
        }
    }

    pub fn generation(status: Option<u16>, detail: impl Into<String>) -> Self {
        Error::Generation {
            status,
            detail: detail.into(),
        }
    }

    pub fn in_section(self, section: impl Into<String>) -> Self {
        Error::Section {
            section: section.into(),
            cause: Box::new(self),
        }
    }

    /// Reclassifies a remote failure as a content-service failure.
    pub fn into_generation(self) -> Self {
        match self {
            Error::Remote { status, detail } => Error::Generation { status, detail },
            other => other,
        }
    }

    /// Reclassifies a remote failure as an export failure.
    pub fn into_export(self) -> Self {
        match self {
            Error::Remote { detail, .. } | Error::Generation { detail, .. } => Error::Export(detail),
            other => other,
        }
    }

    fn root(&self) -> &Error {
        match self {
            Error::Section { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// True for remote and content-service failures (generation is a kind of remote failure).
    pub fn is_remote(&self) -> bool {
        matches!(self.root(), Error::Remote { .. } | Error::Generation { .. })
    }

    /// Whether the user has to sign in again before retrying.
    pub fn requires_reauth(&self) -> bool {
        matches!(self.root(), Error::Auth(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Error::Remote { status, .. } | Error::Generation { status, .. } => *status,
            _ => None,
        }
    }

    /// Transport failures, timeouts, throttling and server-side errors.
    pub fn is_retryable(&self) -> bool {
        if !self.is_remote() {
            return false;
        }
        match self.status() {
            None => true,
            Some(code) => code == 408 || code == 429 || code >= 500,
        }
    }
}
