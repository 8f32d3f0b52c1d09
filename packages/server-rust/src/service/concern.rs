//! Concerns: named behavior bundles applied to a service type at commit.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::config::Config;
use super::{Service, ERROR, FAILURE, FALLBACK_ERROR_RESULT, FALLBACK_FAILURE_RESULT, RESULT, SUCCESS};
use crate::dispatch::{Anchor, MethodKey, Middleware, Unit};
use crate::error::ConfigError;
use crate::middleware::StubbedResults;

/// A behavior unit applied to a [`Config`] when it commits.
///
/// Concerns run in concern-stack order, after every `configure` registration
/// and before method stacks are frozen, so they may still define methods and
/// edit middleware stacks.
pub trait Concern<S: Service>: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a configuration error; the commit fails with it.
    fn included(&self, config: &Config<S>) -> Result<(), ConfigError>;
}

/// Concern-stack entry, identified by the concern's type name.
pub struct ConcernEntry<S> {
    id: Cow<'static, str>,
    unit: Arc<dyn Concern<S>>,
}

impl<S: Service> ConcernEntry<S> {
    #[must_use]
    pub fn new<C: Concern<S>>(concern: C) -> Self {
        Self {
            id: Cow::Borrowed(type_name::<C>()),
            unit: Arc::new(concern),
        }
    }

    /// # Errors
    ///
    /// Returns whatever the concern fails with.
    pub fn include(&self, config: &Config<S>) -> Result<(), ConfigError> {
        self.unit.included(config)
    }
}

impl<S> Clone for ConcernEntry<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            unit: Arc::clone(&self.unit),
        }
    }
}

impl<S> Unit for ConcernEntry<S> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<S> fmt::Debug for ConcernEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConcernEntry").field(&self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in concerns
// ---------------------------------------------------------------------------

/// Defines `result` (instance and static) and the result constructors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Results;

impl<S: Service> Concern<S> for Results {
    fn included(&self, config: &Config<S>) -> Result<(), ConfigError> {
        for name in [RESULT, SUCCESS, FAILURE, ERROR] {
            config.define(MethodKey::instance(name))?;
        }
        config.define(MethodKey::static_method(RESULT))
    }
}

/// Defines the fallback result methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallbacks;

impl<S: Service> Concern<S> for Fallbacks {
    fn included(&self, config: &Config<S>) -> Result<(), ConfigError> {
        config.define(MethodKey::instance(FALLBACK_FAILURE_RESULT))?;
        config.define(MethodKey::instance(FALLBACK_ERROR_RESULT))
    }
}

/// Validates and wires the declared steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Steps;

impl<S: Service> Concern<S> for Steps {
    fn included(&self, config: &Config<S>) -> Result<(), ConfigError> {
        config.steps().commit(config).map(drop)
    }
}

/// Lets registered stubs answer the static `result` before anything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stubs;

impl<S: Service> Concern<S> for Stubs {
    fn included(&self, config: &Config<S>) -> Result<(), ConfigError> {
        config.class_middlewares(RESULT, |stack| {
            let stub = Middleware::new(StubbedResults);
            if stack.is_empty() {
                stack.push(stub)?;
            } else {
                stack.insert_before(Anchor::Index(0), stub)?;
            }
            Ok(())
        })
    }
}
