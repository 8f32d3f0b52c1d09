//! Casting arbitrary [`Value`]s into typed result attributes.

use crate::result::{Code, Message, Status};
use crate::types::{Data, Value};

/// Errors raised while casting a value into a typed attribute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CastError {
    #[error("failed to cast `{value}` into `{target}`")]
    FailedToCast { value: String, target: &'static str },
}

impl CastError {
    #[must_use]
    pub fn failed(value: &Value, target: &'static str) -> Self {
        CastError::FailedToCast {
            value: value.to_string(),
            target,
        }
    }
}

/// Conversion from an untyped [`Value`] that fails loudly on incompatible input.
pub trait Cast: Sized {
    /// Name of the target type, reported in [`CastError::FailedToCast`].
    const TARGET: &'static str;

    /// Casts `value`, failing with [`CastError::FailedToCast`] when incompatible.
    ///
    /// # Errors
    ///
    /// Returns `CastError::FailedToCast` naming the value and [`Self::TARGET`].
    fn cast(value: &Value) -> Result<Self, CastError>;
}

impl Cast for Data {
    const TARGET: &'static str = "data";

    fn cast(value: &Value) -> Result<Self, CastError> {
        match value {
            Value::Null => Ok(Data::new()),
            Value::Map(map) => Ok(map.clone()),
            other => Err(CastError::failed(other, Self::TARGET)),
        }
    }
}

impl Cast for Message {
    const TARGET: &'static str = "message";

    fn cast(value: &Value) -> Result<Self, CastError> {
        match value {
            Value::Null => Ok(Message::default()),
            Value::String(s) => Ok(Message::new(s.clone())),
            other => Err(CastError::failed(other, Self::TARGET)),
        }
    }
}

impl Cast for Code {
    const TARGET: &'static str = "code";

    fn cast(value: &Value) -> Result<Self, CastError> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(Code::new(s.clone())),
            other => Err(CastError::failed(other, Self::TARGET)),
        }
    }
}

impl Cast for Status {
    const TARGET: &'static str = "status";

    fn cast(value: &Value) -> Result<Self, CastError> {
        match value.as_str() {
            Some("success") => Ok(Status::Success),
            Some("failure" | "fail") => Ok(Status::Failure),
            Some("error") => Ok(Status::Error),
            _ => Err(CastError::failed(value, Self::TARGET)),
        }
    }
}
