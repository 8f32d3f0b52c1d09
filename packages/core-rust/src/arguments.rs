//! Call environment passed through interception chains.
//!
//! An [`Arguments`] value is the Rust rendition of a dynamic call site:
//! ordered positional values, named keyword values, and an optional trailing
//! callback. It is cheap to clone (the callback is reference counted).

use std::fmt;
use std::sync::Arc;

use crate::types::{Data, Value};

/// Trailing callback attached to a call.
pub type Callback = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Positional arguments, keyword arguments and an optional callback.
#[derive(Clone, Default)]
pub struct Arguments {
    /// Ordered positional values.
    pub args: Vec<Value>,
    /// Named keyword values.
    pub kwargs: Data,
    /// Optional trailing callback.
    pub block: Option<Callback>,
}

impl Arguments {
    /// Empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments made only of keyword values.
    #[must_use]
    pub fn from_kwargs(kwargs: Data) -> Self {
        Self {
            kwargs,
            ..Self::default()
        }
    }

    /// Adds a positional value.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Adds (or replaces) a keyword value.
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Attaches a trailing callback.
    #[must_use]
    pub fn with_block(mut self, block: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        self.block = Some(Arc::new(block));
        self
    }

    /// Looks up a keyword value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Whether no positional, keyword or callback argument was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty() && self.block.is_none()
    }

    /// Structural comparison ignoring the callback's identity.
    ///
    /// Two argument lists match when their positional and keyword values are
    /// equal and they either both carry a callback or both do not.
    #[must_use]
    pub fn matches(&self, other: &Arguments) -> bool {
        self.args == other.args
            && self.kwargs == other.kwargs
            && self.block.is_some() == other.block.is_some()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("block", &self.block.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl From<Data> for Arguments {
    fn from(kwargs: Data) -> Self {
        Self::from_kwargs(kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data;

    #[test]
    fn builder_collects_all_parts() {
        let args = Arguments::new()
            .arg(1)
            .kwarg("name", "ada")
            .with_block(|values| Value::Int(values.len() as i64));

        assert_eq!(args.args, vec![Value::Int(1)]);
        assert_eq!(args.get("name"), Some(&Value::from("ada")));
        let block = args.block.as_ref().unwrap();
        assert_eq!(block(&[Value::Null, Value::Null]), Value::Int(2));
    }

    #[test]
    fn matches_ignores_callback_identity() {
        let a = Arguments::from_kwargs(data! { "x" => 1 }).with_block(|_| Value::Null);
        let b = Arguments::from_kwargs(data! { "x" => 1 }).with_block(|_| Value::Bool(true));
        let c = Arguments::from_kwargs(data! { "x" => 1 });

        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn default_is_empty() {
        assert!(Arguments::default().is_empty());
        assert!(!Arguments::new().arg(Value::Null).is_empty());
    }
}
