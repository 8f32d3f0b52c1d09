//! Dispatch containers: one interceptor stack per (target type, scope, method).

use std::fmt;
use std::sync::{Arc, OnceLock};

use conduct_core::Arguments;
use parking_lot::RwLock;

use super::chain::{Chain, Terminal};
use super::middleware::Middleware;
use super::stack::{Stack, StackError};
use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// MethodKey
// ---------------------------------------------------------------------------

/// Whether a method is called on an instance or on the type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Instance,
    Static,
}

/// Name of an intercepted method within its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub scope: Scope,
    pub name: &'static str,
}

impl MethodKey {
    #[must_use]
    pub const fn instance(name: &'static str) -> Self {
        Self {
            scope: Scope::Instance,
            name,
        }
    }

    #[must_use]
    pub const fn static_method(name: &'static str) -> Self {
        Self {
            scope: Scope::Static,
            name,
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Instance => write!(f, "#{}", self.name),
            Scope::Static => write!(f, ".{}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// MethodContainer
// ---------------------------------------------------------------------------

/// Binds a middleware stack to one method.
///
/// The stack stays editable until the first compile, which freezes it and
/// stores a read-only snapshot. Every dispatch runs a fresh [`Chain`] over
/// that snapshot, ending at the caller-supplied terminal body.
pub struct MethodContainer<T: ?Sized + 'static, O: 'static> {
    key: MethodKey,
    stack: RwLock<Stack<Middleware<T, O>>>,
    compiled: OnceLock<Arc<[Middleware<T, O>]>>,
}

impl<T: ?Sized + 'static, O: 'static> MethodContainer<T, O> {
    /// Creates an empty container; `owner` prefixes the stack name.
    #[must_use]
    pub fn new(owner: &str, key: MethodKey) -> Self {
        Self {
            key,
            stack: RwLock::new(Stack::new(format!("{owner}{key}"))),
            compiled: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> MethodKey {
        self.key
    }

    /// Edits the stack.
    ///
    /// # Errors
    ///
    /// Returns the first `StackError` raised by `edit`, e.g. `Frozen` once compiled.
    pub fn configure<R>(
        &self,
        edit: impl FnOnce(&mut Stack<Middleware<T, O>>) -> Result<R, StackError>,
    ) -> Result<R, StackError> {
        edit(&mut self.stack.write())
    }

    /// Current middleware ids, outermost first.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.stack.read().ids()
    }

    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Freezes the stack and snapshots it. Later calls return the snapshot.
    pub fn compile(&self) -> &Arc<[Middleware<T, O>]> {
        self.compiled.get_or_init(|| {
            let mut stack = self.stack.write();
            stack.freeze();
            tracing::debug!(stack = stack.name(), middlewares = stack.len(), "compiled method stack");
            stack.compile()
        })
    }

    /// Runs the compiled chain for one call.
    ///
    /// # Errors
    ///
    /// Propagates whatever an interceptor or the terminal fails with.
    pub fn dispatch(
        &self,
        target: &T,
        arguments: Arguments,
        terminal: &Terminal<'_, T, O>,
    ) -> Result<O, ServiceError> {
        let compiled = self.compile();
        Chain::new(target, &self.key, arguments, compiled, terminal).proceed()
    }
}

impl<T: ?Sized + 'static, O: 'static> fmt::Debug for MethodContainer<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodContainer")
            .field("key", &self.key)
            .field("stack", &*self.stack.read())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use conduct_core::Value;
    use parking_lot::Mutex;

    use super::*;
    use crate::dispatch::chain::Env;
    use crate::dispatch::observer::Observer;

    type Log = Mutex<Vec<String>>;

    const GREET: MethodKey = MethodKey::instance("greet");

    fn recording(name: &'static str) -> Middleware<Log, String> {
        Middleware::from_fn(name, move |chain: Chain<'_, Log, String>| {
            chain.target().lock().push(format!("{name}-before"));
            let target = chain.target();
            let out = chain.proceed();
            target.lock().push(format!("{name}-after"));
            out
        })
    }

    fn terminal(log: &Log, _args: &Arguments) -> Result<String, ServiceError> {
        log.lock().push("terminal".to_string());
        Ok("done".to_string())
    }

    #[test]
    fn runs_interceptors_in_registration_order() {
        let container = MethodContainer::new("Greeter", GREET);
        container
            .configure(|stack| {
                stack.push(recording("A"))?.push(recording("B"))?.push(recording("C"))?;
                Ok(())
            })
            .unwrap();

        let log = Log::default();
        let out = container.dispatch(&log, Arguments::new(), &terminal).unwrap();

        assert_eq!(out, "done");
        assert_eq!(
            *log.lock(),
            vec![
                "A-before", "B-before", "C-before", "terminal", "C-after", "B-after", "A-after"
            ]
        );
    }

    #[test]
    fn interceptor_can_short_circuit() {
        let container = MethodContainer::new("Greeter", GREET);
        container
            .configure(|stack| {
                stack.push(recording("A"))?;
                stack.push(Middleware::from_fn("stop", |_chain: Chain<'_, Log, String>| {
                    Ok("stopped".to_string())
                }))?;
                stack.push(recording("C"))?;
                Ok(())
            })
            .unwrap();

        let log = Log::default();
        let out = container.dispatch(&log, Arguments::new(), &terminal).unwrap();

        assert_eq!(out, "stopped");
        assert_eq!(*log.lock(), vec!["A-before", "A-after"]);
    }

    #[test]
    fn interceptor_can_rewrite_arguments_and_return_value() {
        let container: MethodContainer<Log, String> = MethodContainer::new("Greeter", GREET);
        container
            .configure(|stack| {
                stack.push(Middleware::from_fn("shout", |chain: Chain<'_, Log, String>| {
                    chain
                        .proceed_with(|args| {
                            args.kwargs.insert("name".to_string(), Value::from("ADA"));
                        })
                        .map(|out| format!("{out}!"))
                }))?;
                Ok(())
            })
            .unwrap();

        let log = Log::default();
        let args = Arguments::new().arg(1).kwarg("name", "ada");
        let out = container
            .dispatch(&log, args, &|_log: &Log, args: &Arguments| -> Result<String, ServiceError> {
                assert_eq!(args.args, vec![Value::Int(1)]);
                Ok(format!("hello {}", args.get("name").unwrap()))
            })
            .unwrap();

        assert_eq!(out, "hello ADA!");
    }

    #[test]
    fn interceptor_sees_current_arguments() {
        let container: MethodContainer<Log, String> = MethodContainer::new("Greeter", GREET);
        container
            .configure(|stack| {
                stack.push(Middleware::from_fn("guard", |chain: Chain<'_, Log, String>| {
                    if chain.arguments().get("skip").is_some() {
                        return Ok("skipped".to_string());
                    }
                    chain.proceed()
                }))?;
                Ok(())
            })
            .unwrap();

        let log = Log::default();
        let skipped = container
            .dispatch(&log, Arguments::new().kwarg("skip", true), &terminal)
            .unwrap();
        let ran = container.dispatch(&log, Arguments::new(), &terminal).unwrap();

        assert_eq!(skipped, "skipped");
        assert_eq!(ran, "done");
    }

    struct Counting(Mutex<Vec<String>>);

    impl Observer<Log, String> for Counting {
        fn before(&self, env: &Env<'_, Log>) {
            self.0.lock().push(format!("before {}", env.method));
        }

        fn after(&self, _env: &Env<'_, Log>, outcome: &Result<String, ServiceError>) {
            self.0
                .lock()
                .push(format!("after {}", outcome.as_ref().map_or("err", String::as_str)));
        }
    }

    #[test]
    fn observer_never_alters_the_outcome() {
        let seen = std::sync::Arc::new(Counting(Mutex::new(Vec::new())));
        let container: MethodContainer<Log, String> = MethodContainer::new("Greeter", GREET);
        let recorder = seen.clone();
        container
            .configure(move |stack| {
                stack.push(Middleware::from_fn(
                    "observer",
                    move |chain: Chain<'_, Log, String>| {
                        let env = chain.env();
                        recorder.before(&env);
                        let outcome = chain.proceed();
                        recorder.after(&env, &outcome);
                        outcome
                    },
                ))?;
                stack.push(Middleware::observe(Counting(Mutex::new(Vec::new()))))?;
                Ok(())
            })
            .unwrap();

        let log = Log::default();
        let out = container.dispatch(&log, Arguments::new(), &terminal).unwrap();

        assert_eq!(out, "done");
        assert_eq!(*seen.0.lock(), vec!["before #greet", "after done"]);
    }

    #[test]
    fn first_dispatch_compiles_and_freezes() {
        let container = MethodContainer::new("Greeter", GREET);
        container.configure(|stack| stack.push(recording("A")).map(drop)).unwrap();
        assert!(!container.is_compiled());

        let log = Log::default();
        container.dispatch(&log, Arguments::new(), &terminal).unwrap();

        assert!(container.is_compiled());
        let err = container
            .configure(|stack| stack.push(recording("B")).map(drop))
            .unwrap_err();
        assert_eq!(
            err,
            StackError::Frozen {
                stack: "Greeter#greet".to_string()
            }
        );
        assert_eq!(container.ids(), vec!["A"]);
    }

    #[test]
    fn empty_stack_calls_terminal_directly() {
        let container: MethodContainer<Log, String> = MethodContainer::new("Greeter", GREET);
        let log = Log::default();
        assert_eq!(
            container.dispatch(&log, Arguments::new(), &terminal).unwrap(),
            "done"
        );
        assert_eq!(*log.lock(), vec!["terminal"]);
    }

    #[test]
    fn method_key_display() {
        assert_eq!(MethodKey::instance("result").to_string(), "#result");
        assert_eq!(MethodKey::static_method("result").to_string(), ".result");
    }
}
