//! Observers: side-channel hooks that cannot change a call's outcome.
//!
//! An [`Observer`] sees the call environment before the rest of the chain
//! runs and the outcome after it returns. It is wrapped by [`Observe`], which
//! always hands the untouched outcome back, so adding observation to a stack
//! never changes behavior. [`CompositeObserver`] fans out to several observers.

use std::sync::Arc;

use super::chain::{Chain, Env};
use super::middleware::Interceptor;
use crate::error::ServiceError;

/// Hooks fired around a call. Both default to no-ops.
pub trait Observer<T: ?Sized, O>: Send + Sync + 'static {
    fn before(&self, _env: &Env<'_, T>) {}

    fn after(&self, _env: &Env<'_, T>, _outcome: &Result<O, ServiceError>) {}
}

/// Adapter running an [`Observer`] as an interceptor.
pub struct Observe<B> {
    observer: B,
}

impl<B> Observe<B> {
    #[must_use]
    pub fn new(observer: B) -> Self {
        Self { observer }
    }
}

impl<T, O, B> Interceptor<T, O> for Observe<B>
where
    T: ?Sized + 'static,
    O: 'static,
    B: Observer<T, O>,
{
    fn intercept(&self, chain: Chain<'_, T, O>) -> Result<O, ServiceError> {
        let env = chain.env();
        self.observer.before(&env);
        let outcome = chain.proceed();
        self.observer.after(&env, &outcome);
        outcome
    }
}

/// Observer that forwards every notification to each registered observer.
pub struct CompositeObserver<T: ?Sized + 'static, O: 'static> {
    observers: Vec<Arc<dyn Observer<T, O>>>,
}

impl<T: ?Sized + 'static, O: 'static> CompositeObserver<T, O> {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observer<T, O>>>) -> Self {
        Self { observers }
    }

    pub fn add(&mut self, observer: Arc<dyn Observer<T, O>>) {
        self.observers.push(observer);
    }
}

impl<T: ?Sized + 'static, O: 'static> Default for CompositeObserver<T, O> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<T: ?Sized + 'static, O: 'static> Observer<T, O> for CompositeObserver<T, O> {
    fn before(&self, env: &Env<'_, T>) {
        for observer in &self.observers {
            observer.before(env);
        }
    }

    fn after(&self, env: &Env<'_, T>, outcome: &Result<O, ServiceError>) {
        for observer in &self.observers {
            observer.after(env, outcome);
        }
    }
}
