//! Interceptors and their stack descriptors.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::chain::Chain;
use super::observer::{Observe, Observer};
use super::stack::Unit;
use crate::error::ServiceError;

/// A unit wrapping calls to one method.
///
/// Implementations may inspect or edit the arguments before calling
/// [`Chain::proceed`], inspect or replace the returned value afterwards, or
/// skip the rest of the chain entirely by returning without proceeding.
pub trait Interceptor<T: ?Sized, O>: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns whatever the interceptor or the rest of the chain fails with.
    fn intercept(&self, chain: Chain<'_, T, O>) -> Result<O, ServiceError>;
}

/// Closure-backed interceptor, see [`Middleware::from_fn`].
pub struct FnInterceptor<F>(F);

impl<T, O, F> Interceptor<T, O> for FnInterceptor<F>
where
    T: ?Sized + 'static,
    O: 'static,
    F: for<'c> Fn(Chain<'c, T, O>) -> Result<O, ServiceError> + Send + Sync + 'static,
{
    fn intercept(&self, chain: Chain<'_, T, O>) -> Result<O, ServiceError> {
        (self.0)(chain)
    }
}

/// Stack entry: an interceptor plus the identity it is compared by.
pub struct Middleware<T: ?Sized + 'static, O: 'static> {
    id: Cow<'static, str>,
    unit: Arc<dyn Interceptor<T, O>>,
}

impl<T: ?Sized + 'static, O: 'static> Middleware<T, O> {
    /// Wraps a typed interceptor; its identity is its type name.
    #[must_use]
    pub fn new<I: Interceptor<T, O>>(unit: I) -> Self {
        Self {
            id: Cow::Borrowed(type_name::<I>()),
            unit: Arc::new(unit),
        }
    }

    /// Wraps an interceptor under an explicit identity.
    #[must_use]
    pub fn named<I: Interceptor<T, O>>(id: impl Into<Cow<'static, str>>, unit: I) -> Self {
        Self {
            id: id.into(),
            unit: Arc::new(unit),
        }
    }

    /// Wraps a closure under an explicit identity.
    #[must_use]
    pub fn from_fn<F>(id: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: for<'c> Fn(Chain<'c, T, O>) -> Result<O, ServiceError> + Send + Sync + 'static,
    {
        Self::named(id, FnInterceptor(f))
    }

    /// Wraps an observer; its identity is the observer's type name.
    #[must_use]
    pub fn observe<B: Observer<T, O>>(observer: B) -> Self {
        Self {
            id: Cow::Borrowed(type_name::<B>()),
            unit: Arc::new(Observe::new(observer)),
        }
    }
}

impl<T: ?Sized + 'static, O: 'static> Middleware<T, O> {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// # Errors
    ///
    /// Returns whatever the wrapped interceptor fails with.
    pub fn intercept(&self, chain: Chain<'_, T, O>) -> Result<O, ServiceError> {
        self.unit.intercept(chain)
    }
}

impl<T: ?Sized + 'static, O: 'static> Clone for Middleware<T, O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            unit: Arc::clone(&self.unit),
        }
    }
}

impl<T: ?Sized + 'static, O: 'static> PartialEq for Middleware<T, O> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: ?Sized + 'static, O: 'static> Eq for Middleware<T, O> {}

impl<T: ?Sized + 'static, O: 'static> Unit for Middleware<T, O> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<T: ?Sized + 'static, O: 'static> fmt::Debug for Middleware<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.id).finish()
    }
}
