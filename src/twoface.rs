//! `twoface::Error` wraps a Rust error type with a caller-facing description. The internal part keeps
//! the original error (e.g. whatever the persistence layer raised) untouched, so callers can still
//! downcast it, while the external part says which kind of failure happened.

mod extensions;
pub mod externalerror;

pub use extensions::*;
pub use externalerror::{Cause, ExternalError};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Wraps a Rust error type with a caller-facing description.
#[derive(Debug)]
pub struct TfError {
    /// The underlying error, from some function or collaborator. Passed through unmodified.
    pub internal: anyhow::Error,
    /// A short description that is safe to show to whoever triggered the operation.
    pub external: ExternalError,
}

impl TfError {
    /// The caller broke the contract of an operation, e.g. handed over a payload without text.
    pub fn contract(internal: impl Into<anyhow::Error>, text: &'static str) -> Self {
        Self {
            internal: internal.into(),
            external: ExternalError {
                cause: Cause::ContractViolation,
                text,
            },
        }
    }

    /// A collaborator (store, executor, preparer) failed. Its error is kept as-is.
    pub fn persistence(internal: impl Into<anyhow::Error>) -> Self {
        Self {
            internal: internal.into(),
            external: ExternalError {
                cause: Cause::Persistence,
                text: "Persistence layer error",
            },
        }
    }

    pub fn not_found(internal: impl Into<anyhow::Error>, text: &'static str) -> Self {
        Self {
            internal: internal.into(),
            external: ExternalError {
                cause: Cause::NotFound,
                text,
            },
        }
    }

    pub fn cause(&self) -> Cause {
        self.external.cause
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self.external.cause, Cause::ContractViolation)
    }
}

/// Displaying a twoface::Error will only display the external section.
impl Display for TfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        write!(f, "{}", self.external)
    }
}

/// Return type of a function that could fail. If it fails, it includes a twoface error (an error with
/// both internal- and external-facing values).
pub type Fallible<T> = Result<T, TfError>;
