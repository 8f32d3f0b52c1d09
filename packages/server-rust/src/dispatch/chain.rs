//! Per-invocation continuation.

use conduct_core::Arguments;

use super::container::MethodKey;
use super::middleware::Middleware;
use crate::error::ServiceError;

/// Uninstrumented method body at the end of every chain.
pub type Terminal<'a, T, O> = dyn Fn(&T, &Arguments) -> Result<O, ServiceError> + 'a;

/// Snapshot of a call environment, handed to observers.
#[derive(Debug)]
pub struct Env<'a, T: ?Sized> {
    pub target: &'a T,
    pub method: &'a MethodKey,
    pub arguments: Arguments,
}

/// Cursor over the remaining interceptors of one call.
///
/// Each interceptor receives the chain by value and either returns a value
/// directly (short-circuit) or calls [`Chain::proceed`] to run the rest of the
/// chain, ending at the terminal method body.
pub struct Chain<'a, T: ?Sized + 'static, O: 'static> {
    target: &'a T,
    method: &'a MethodKey,
    arguments: Arguments,
    rest: &'a [Middleware<T, O>],
    terminal: &'a Terminal<'a, T, O>,
}

impl<'a, T: ?Sized + 'static, O: 'static> Chain<'a, T, O> {
    #[must_use]
    pub fn new(
        target: &'a T,
        method: &'a MethodKey,
        arguments: Arguments,
        rest: &'a [Middleware<T, O>],
        terminal: &'a Terminal<'a, T, O>,
    ) -> Self {
        Self {
            target,
            method,
            arguments,
            rest,
            terminal,
        }
    }

    #[must_use]
    pub fn target(&self) -> &'a T {
        self.target
    }

    #[must_use]
    pub fn method(&self) -> &'a MethodKey {
        self.method
    }

    /// Arguments the next link will receive.
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Number of interceptors still ahead of the terminal.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    #[must_use]
    pub fn env(&self) -> Env<'a, T> {
        Env {
            target: self.target,
            method: self.method,
            arguments: self.arguments.clone(),
        }
    }

    /// Runs the next interceptor, or the terminal body when none is left.
    ///
    /// # Errors
    ///
    /// Propagates whatever the rest of the chain returns.
    pub fn proceed(self) -> Result<O, ServiceError> {
        match self.rest.split_first() {
            Some((head, rest)) => head.intercept(Chain { rest, ..self }),
            None => (self.terminal)(self.target, &self.arguments),
        }
    }

    /// Like [`Chain::proceed`], forwarding a modified copy of the arguments.
    ///
    /// Parts the closure leaves untouched keep their current value, so an
    /// interceptor that only adds a keyword does not drop positional values or
    /// the callback.
    ///
    /// # Errors
    ///
    /// Propagates whatever the rest of the chain returns.
    pub fn proceed_with(mut self, edit: impl FnOnce(&mut Arguments)) -> Result<O, ServiceError> {
        edit(&mut self.arguments);
        self.proceed()
    }
}
