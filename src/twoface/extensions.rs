//! Turning errors from any library (serde, chrono, a collaborator) into twoface errors.
use crate::twoface::{Cause, ExternalError, TfError};

pub trait Describe {
    /// Attach the description the caller gets to see.
    fn describe(self, external: ExternalError) -> TfError;
}

impl<Internal: Into<anyhow::Error>> Describe for Internal {
    fn describe(self, external: ExternalError) -> TfError {
        TfError {
            internal: self.into(),
            external,
        }
    }
}

/// Lets `?` turn any internal error into a `TfError` with the default (server error) description.
/// Use `describe` or `describe_err` when the caller should learn more than that.
impl<Internal: Into<anyhow::Error>> From<Internal> for TfError {
    fn from(internal: Internal) -> TfError {
        internal.describe(Default::default())
    }
}

pub trait DescribeErr<T> {
    /// `map_err(|e| e.describe(external))`
    fn describe_err(self, external: ExternalError) -> Result<T, TfError>;

    /// The error means the caller handed over bad input, e.g. a payload that doesn't decode.
    fn contract_err(self, text: &'static str) -> Result<T, TfError>
    where
        Self: Sized,
    {
        self.describe_err(ExternalError {
            cause: Cause::ContractViolation,
            text,
        })
    }
}

impl<T, E> DescribeErr<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn describe_err(self, external: ExternalError) -> Result<T, TfError> {
        self.map_err(|e| e.describe(external))
    }
}
