use std::fmt;

/// Describes a failure to whoever called into the crate, without leaking the internal error.
#[derive(Debug)]
pub struct ExternalError {
    /// Which kind of failure this was.
    pub cause: Cause,
    /// Short text describing the problem.
    pub text: &'static str,
}

/// The kinds of failure the crate distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Something unexpected. The default.
    ServerError,
    /// The caller broke an operation's contract: a malformed payload, a query without a base table.
    /// Not recoverable by retrying the same input.
    ContractViolation,
    /// Raised by a persistence collaborator and passed through.
    Persistence,
    NotFound,
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        // Make fmt::Display the same as fmt::Debug, i.e. each variant's name.
        write!(f, "{:?}", self)
    }
}

impl Cause {
    /// Label used when counting outcomes in metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::ServerError => "server_error",
            Self::ContractViolation => "contract_violation",
            Self::Persistence => "persistence",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}: {}", self.cause, self.text)
    }
}

impl Default for ExternalError {
    // Default to ServerError and a very vague generic message.
    fn default() -> Self {
        Self {
            cause: Cause::ServerError,
            text: "Internal error",
        }
    }
}
