//! Input and output descriptors of a step.

use std::fmt;
use std::sync::Arc;

use conduct_core::{Cast, CastError, Value};

use crate::service::{Instance, Service};

/// Closure computing an input from the organizer.
pub type Proc<S> = Arc<dyn Fn(&Instance<S>) -> anyhow::Result<Value> + Send + Sync>;

/// How a descriptor obtains its value.
pub enum Caller<S: Service> {
    /// Reads `key` from the organizer (inputs) or the step result data (outputs).
    Read,
    /// A literal value. Inputs only.
    Value(Value),
    /// Computed from the organizer when the step runs. Inputs only.
    Proc(Proc<S>),
    /// Overwrites an existing organizer name. Outputs only.
    Reassign,
}

impl<S: Service> Clone for Caller<S> {
    fn clone(&self) -> Self {
        match self {
            Caller::Read => Caller::Read,
            Caller::Value(value) => Caller::Value(value.clone()),
            Caller::Proc(proc) => Caller::Proc(Arc::clone(proc)),
            Caller::Reassign => Caller::Reassign,
        }
    }
}

/// Normalized step binding.
///
/// For inputs, `key` is the organizer name read and `name` the keyword the
/// step receives. For outputs, `key` is the step result data key and `name`
/// the organizer name it is written to.
pub struct Method<S: Service> {
    pub key: String,
    pub name: String,
    pub caller: Caller<S>,
}

impl<S: Service> Method<S> {
    /// Same key and name.
    #[must_use]
    pub fn read(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            caller: Caller::Read,
        }
    }

    /// Reads `key`, exposed as `name`.
    #[must_use]
    pub fn alias(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            caller: Caller::Read,
        }
    }

    #[must_use]
    pub fn value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            caller: Caller::Value(value.into()),
        }
    }

    #[must_use]
    pub fn proc(
        name: impl Into<String>,
        proc: impl Fn(&Instance<S>) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            caller: Caller::Proc(Arc::new(proc)),
        }
    }

    #[must_use]
    pub fn reassign(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            caller: Caller::Reassign,
        }
    }

    #[must_use]
    pub fn is_reassignment(&self) -> bool {
        matches!(self.caller, Caller::Reassign)
    }

    /// Whether the value comes from the descriptor itself, not a lookup.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self.caller, Caller::Value(_) | Caller::Proc(_))
    }
}

impl<S: Service> Clone for Method<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            name: self.name.clone(),
            caller: self.caller.clone(),
        }
    }
}

impl<S: Service> fmt::Debug for Method<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caller = match &self.caller {
            Caller::Read => "read",
            Caller::Value(_) => "value",
            Caller::Proc(_) => "proc",
            Caller::Reassign => "reassign",
        };
        f.debug_struct("Method")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("caller", &caller)
            .finish()
    }
}

impl<S: Service> From<&str> for Method<S> {
    fn from(name: &str) -> Self {
        Method::read(name)
    }
}

impl<S: Service> From<String> for Method<S> {
    fn from(name: String) -> Self {
        Method::read(name)
    }
}

impl<S: Service> From<(&str, &str)> for Method<S> {
    fn from((key, name): (&str, &str)) -> Self {
        Method::alias(key, name)
    }
}

/// A string names a read; a one-entry map `{key: name}` names an alias.
impl<S: Service> Cast for Method<S> {
    const TARGET: &'static str = "Method";

    fn cast(value: &Value) -> Result<Self, CastError> {
        match value {
            Value::String(name) if !name.is_empty() => Ok(Method::read(name.as_str())),
            Value::Map(map) if map.len() == 1 => match map.iter().next() {
                Some((key, Value::String(name))) if !key.is_empty() && !name.is_empty() => {
                    Ok(Method::alias(key.as_str(), name.as_str()))
                }
                _ => Err(CastError::failed(value, Self::TARGET)),
            },
            _ => Err(CastError::failed(value, Self::TARGET)),
        }
    }
}
