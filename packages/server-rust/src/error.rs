//! Error taxonomy for configuration and invocation.

use conduct_core::{CastError, ResultError, Status};

use crate::dispatch::StackError;

/// Configuration-time errors. Never recovered: they surface from `configure`,
/// registration calls and `commit`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config of `{service}` is already committed; cannot register {what}")]
    Committed { service: &'static str, what: String },
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("step {index} of `{service}` reads `{input}`, which resolves to no method")]
    UnknownInput {
        service: &'static str,
        index: usize,
        input: String,
    },
    #[error("step {index} of `{service}` outputs `{output}`, which is already defined")]
    OutputAlreadyDefined {
        service: &'static str,
        index: usize,
        output: String,
    },
    #[error("step {index} of `{service}` declares `{name}` as {direction}: {reason}")]
    InvalidBinding {
        service: &'static str,
        index: usize,
        name: String,
        direction: &'static str,
        reason: &'static str,
    },
    #[error("step {index} of `{service}` targets unknown method step `{method}`")]
    UnknownStepTarget {
        service: &'static str,
        index: usize,
        method: String,
    },
    #[error("step {index} of `{organizer}` falls back to `{service}`, which does not define `{method}`")]
    FallbackNotDefined {
        organizer: &'static str,
        index: usize,
        service: &'static str,
        method: &'static str,
    },
    #[error(transparent)]
    Cast(#[from] CastError),
}

/// Invocation-time errors.
///
/// Everything except [`ServiceError::Unhandled`] is a contract violation and
/// propagates to the caller even when the rescue interceptor is installed.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("`{service}` reads `{output}` before step {index} completed")]
    NotCompletedStep {
        service: &'static str,
        index: usize,
        output: String,
    },
    #[error("`{service}` reads `{output}`, but step {index} ended as {status} and wrote no outputs")]
    StepOutputUnavailable {
        service: &'static str,
        index: usize,
        output: String,
        status: Status,
    },
    #[error("`{service}` produced more than one result ({first} then {second})")]
    DoubleResult {
        service: &'static str,
        first: Status,
        second: Status,
    },
    #[error("result of step {index} in `{service}` has no `{key}` in its data")]
    MissingOutputKey {
        service: &'static str,
        index: usize,
        key: String,
    },
    #[error("`{service}` does not override `{method}`")]
    MethodNotOverridden {
        service: &'static str,
        method: &'static str,
    },
    #[error("`{service}` has no `{method}` method; include the concern that defines it")]
    MethodNotDefined {
        service: &'static str,
        method: String,
    },
    #[error("`{service}` has no attribute, reader or step output named `{name}`")]
    UnknownAttribute { service: &'static str, name: String },
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cast(#[from] CastError),
    #[error("unhandled error: {0:#}")]
    Unhandled(anyhow::Error),
}

impl ServiceError {
    /// Whether the error came from user code rather than a framework contract.
    #[must_use]
    pub fn is_unhandled(&self) -> bool {
        matches!(self, ServiceError::Unhandled(_))
    }
}

impl From<anyhow::Error> for ServiceError {
    /// Recovers framework errors that travelled through `anyhow` (user bodies
    /// use `?` on constructors and result readers); anything else is unhandled.
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ServiceError>() {
            Ok(service) => return service,
            Err(other) => other,
        };
        let err = match err.downcast::<ResultError>() {
            Ok(result) => return ServiceError::Result(result),
            Err(other) => other,
        };
        let err = match err.downcast::<ConfigError>() {
            Ok(config) => return ServiceError::Config(config),
            Err(other) => other,
        };
        match err.downcast::<CastError>() {
            Ok(cast) => ServiceError::Cast(cast),
            Err(other) => ServiceError::Unhandled(other),
        }
    }
}
