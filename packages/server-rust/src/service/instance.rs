//! Service instances and the static call target.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use conduct_core::result::FALLBACK_RESULT_KEY;
use conduct_core::{
    Arguments, Cast, Code, Data, Message, Overrides, ResultParts, ServiceId, ServiceResult,
    Status, Value,
};
use parking_lot::{Mutex, RwLock};

use super::config::Config;
use super::{Service, ERROR, FAILURE, RESULT, SUCCESS};
use crate::error::ServiceError;
use crate::step::FallbackKind;

// ---------------------------------------------------------------------------
// Class
// ---------------------------------------------------------------------------

/// Static call target of a service type: the committed type config.
pub struct Class<S: Service> {
    config: Arc<Config<S>>,
}

impl<S: Service> Class<S> {
    /// Fetches and commits the type config.
    ///
    /// # Errors
    ///
    /// Returns the configuration error that prevents committing.
    pub fn new() -> Result<Self, ServiceError> {
        let config = S::config();
        config.commit()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config<S>> {
        &self.config
    }

    /// Runs the static `result` stack, which builds an instance and returns
    /// its `result`.
    ///
    /// # Errors
    ///
    /// Returns contract violations and errors the rescue interceptor did not
    /// convert.
    pub fn call(&self, arguments: Arguments) -> Result<ServiceResult, ServiceError> {
        let terminal = |class: &Class<S>, arguments: &Arguments| -> Result<ServiceResult, ServiceError> {
            Instance::with_config(Arc::clone(&class.config), arguments.clone())?.result()
        };
        self.config.dispatch_class(RESULT, self, arguments, &terminal)
    }

    /// Success result attributed to the type rather than an instance.
    #[must_use]
    pub fn success(&self, data: Data) -> ServiceResult {
        ServiceResult::success(ServiceId::new(self.config.name()), data)
    }

    #[must_use]
    pub fn failure(&self, data: Data, message: impl Into<Message>) -> ServiceResult {
        ServiceResult::failure(ServiceId::new(self.config.name()), data, message)
    }

    /// Error result attributed to the type. `code` defaults to `default_error`.
    #[must_use]
    pub fn error(&self, message: impl Into<Message>, code: Option<&str>) -> ServiceResult {
        let code = code.map_or_else(|| Status::Error.default_code(), Code::from);
        ServiceResult::error(ServiceId::new(self.config.name()), message, code)
    }
}

impl<S: Service> fmt::Debug for Class<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Class").field(&self.config.name()).finish()
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// One invocation of a service: the built value plus per-call state.
///
/// Derefs to the service value, so bodies can read its fields directly.
pub struct Instance<S: Service> {
    service: S,
    id: ServiceId,
    arguments: Arguments,
    config: Arc<Config<S>>,
    /// Statuses produced by the result constructors, in call order.
    constructed: Mutex<Vec<Status>>,
    /// Status of the first completed `result`.
    returned: Mutex<Option<Status>>,
    /// Memoized method results, keyed by method name.
    memo: Mutex<HashMap<&'static str, ServiceResult>>,
    step_results: Vec<OnceLock<ServiceResult>>,
    outputs: RwLock<Data>,
}

impl<S: Service> Instance<S> {
    /// Commits the type config if needed and builds the service value.
    ///
    /// # Errors
    ///
    /// Returns configuration errors, or the build error as `Unhandled`.
    pub fn new(arguments: Arguments) -> Result<Self, ServiceError> {
        Self::with_config(S::config(), arguments)
    }

    pub(crate) fn with_config(
        config: Arc<Config<S>>,
        arguments: Arguments,
    ) -> Result<Self, ServiceError> {
        config.commit()?;
        let service = S::build(&arguments).map_err(ServiceError::from)?;
        let step_results = (0..config.steps().len()).map(|_| OnceLock::new()).collect();
        Ok(Self {
            service,
            id: ServiceId::new(config.name()),
            arguments,
            config,
            constructed: Mutex::new(Vec::new()),
            returned: Mutex::new(None),
            memo: Mutex::new(HashMap::new()),
            step_results,
            outputs: RwLock::new(Data::new()),
        })
    }

    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    #[must_use]
    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config<S>> {
        &self.config
    }

    pub(crate) fn constructed(&self) -> &Mutex<Vec<Status>> {
        &self.constructed
    }

    pub(crate) fn returned(&self) -> &Mutex<Option<Status>> {
        &self.returned
    }

    pub(crate) fn memo(&self) -> &Mutex<HashMap<&'static str, ServiceResult>> {
        &self.memo
    }

    // -- result -------------------------------------------------------------

    /// Runs the instance `result` stack around [`Service::result`].
    ///
    /// # Errors
    ///
    /// Returns contract violations and errors the rescue interceptor did not
    /// convert.
    pub fn result(&self) -> Result<ServiceResult, ServiceError> {
        self.config.dispatch_instance(
            RESULT,
            self,
            self.arguments.clone(),
            &|instance: &Instance<S>, _: &Arguments| S::result(instance).map_err(ServiceError::from),
        )
    }

    /// Builds a success result owned by this instance.
    ///
    /// # Errors
    ///
    /// Returns `DoubleResult` when a result was already constructed.
    pub fn success(&self, data: Data) -> Result<ServiceResult, ServiceError> {
        self.success_with(Arguments::new().kwarg("data", data))
    }

    /// Builds a failure result owned by this instance.
    ///
    /// # Errors
    ///
    /// Returns `DoubleResult` when a result was already constructed.
    pub fn failure(
        &self,
        data: Data,
        message: impl Into<String>,
    ) -> Result<ServiceResult, ServiceError> {
        self.failure_with(
            Arguments::new()
                .kwarg("data", data)
                .kwarg("message", message.into()),
        )
    }

    /// Builds an error result owned by this instance. `code` defaults to
    /// `default_error`.
    ///
    /// # Errors
    ///
    /// Returns `DoubleResult` when a result was already constructed.
    pub fn error(
        &self,
        message: impl Into<String>,
        code: Option<&str>,
    ) -> Result<ServiceResult, ServiceError> {
        let mut arguments = Arguments::new().kwarg("message", message.into());
        if let Some(code) = code {
            arguments = arguments.kwarg("code", code);
        }
        self.error_with(arguments)
    }

    /// `success` from raw keyword arguments (`data`).
    ///
    /// # Errors
    ///
    /// Returns `DoubleResult`, or a cast error for malformed keywords.
    pub fn success_with(&self, arguments: Arguments) -> Result<ServiceResult, ServiceError> {
        self.construct(SUCCESS, Status::Success, arguments)
    }

    /// `failure` from raw keyword arguments (`data`, `message`, `code`).
    ///
    /// # Errors
    ///
    /// Returns `DoubleResult`, or a cast error for malformed keywords.
    pub fn failure_with(&self, arguments: Arguments) -> Result<ServiceResult, ServiceError> {
        self.construct(FAILURE, Status::Failure, arguments)
    }

    /// `error` from raw keyword arguments (`data`, `message`, `code`).
    ///
    /// # Errors
    ///
    /// Returns `DoubleResult`, or a cast error for malformed keywords.
    pub fn error_with(&self, arguments: Arguments) -> Result<ServiceResult, ServiceError> {
        self.construct(ERROR, Status::Error, arguments)
    }

    fn construct(
        &self,
        method: &'static str,
        status: Status,
        arguments: Arguments,
    ) -> Result<ServiceResult, ServiceError> {
        self.config.dispatch_instance(
            method,
            self,
            arguments,
            &move |instance: &Instance<S>, arguments: &Arguments| -> Result<ServiceResult, ServiceError> {
                let mut parts = ResultParts::new(status, instance.id.clone());
                parts.data = cast_keyword::<Data>(arguments, "data")?;
                parts.message = cast_keyword::<Message>(arguments, "message")?;
                parts.code = match arguments.get("code") {
                    None | Some(Value::Null) => None,
                    Some(code) => Some(Code::cast(code)?),
                };
                Ok(ServiceResult::from_parts(parts))
            },
        )
    }

    /// Runs the overridden fallback method and marks the result as a fallback.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotOverridden` when no fallback body is registered, or
    /// `MethodNotDefined` without the fallbacks concern.
    pub fn fallback_result(&self, kind: FallbackKind) -> Result<ServiceResult, ServiceError> {
        let result = self.config.dispatch_instance(
            kind.method(),
            self,
            Arguments::new(),
            &move |instance: &Instance<S>, _: &Arguments| -> Result<ServiceResult, ServiceError> {
                let body = instance.config.fallback_body(kind).ok_or(
                    ServiceError::MethodNotOverridden {
                        service: instance.config.name(),
                        method: kind.method(),
                    },
                )?;
                body(instance).map_err(ServiceError::from)
            },
        )?;
        Ok(result.copy(Overrides::new().extra(FALLBACK_RESULT_KEY, true)))
    }

    // -- attributes and steps -----------------------------------------------

    /// Resolves a name the way step inputs do.
    ///
    /// Written step outputs come first, then outputs whose step has not run
    /// yet or did not succeed (an error), then readers, then declared keyword
    /// attributes.
    ///
    /// # Errors
    ///
    /// Returns `NotCompletedStep`, `StepOutputUnavailable` or
    /// `UnknownAttribute`.
    pub fn read(&self, name: &str) -> Result<Value, ServiceError> {
        if let Some(value) = self.outputs.read().get(name) {
            return Ok(value.clone());
        }
        if let Some(index) = self.config.steps().binding(name) {
            let output = name.to_string();
            let service = self.config.name();
            return Err(match self.step_results.get(index).and_then(OnceLock::get) {
                Some(result) => ServiceError::StepOutputUnavailable {
                    service,
                    index,
                    output,
                    status: result.status(),
                },
                None => ServiceError::NotCompletedStep {
                    service,
                    index,
                    output,
                },
            });
        }
        if let Some(value) = self.config.read_reader(name, &self.service) {
            return Ok(value);
        }
        if self.config.has_attribute(name) {
            return Ok(self.arguments.get(name).cloned().unwrap_or(Value::Null));
        }
        Err(ServiceError::UnknownAttribute {
            service: self.config.name(),
            name: name.to_string(),
        })
    }

    pub(crate) fn write_output(&self, name: &str, value: Value) {
        self.outputs.write().insert(name.to_string(), value);
    }

    /// Result of step `index`, computed on first access.
    ///
    /// # Errors
    ///
    /// Returns the step's contract violations, e.g. `NotCompletedStep` when an
    /// input is produced by a later step.
    pub fn step_result(&self, index: usize) -> Result<ServiceResult, ServiceError> {
        let (Some(slot), Some(step)) = (self.step_results.get(index), self.config.steps().get(index))
        else {
            return Err(ServiceError::MethodNotDefined {
                service: self.config.name(),
                method: format!("step {index}"),
            });
        };
        if let Some(result) = slot.get() {
            return Ok(result.clone());
        }
        let result = step.run(self)?;
        Ok(slot.get_or_init(|| result).clone())
    }

    /// Whether step `index` has produced its result.
    #[must_use]
    pub fn is_step_completed(&self, index: usize) -> bool {
        self.step_results
            .get(index)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Default organizer `result`: runs steps in order.
    ///
    /// Stops at the first step that does not succeed. The returned result is
    /// a copy attributed to this instance with the step result as parent.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotOverridden` when the service declares no steps, and
    /// any error raised by a step.
    pub fn run_steps(&self) -> Result<ServiceResult, ServiceError> {
        let count = self.step_results.len();
        if count == 0 {
            return Err(ServiceError::MethodNotOverridden {
                service: self.config.name(),
                method: RESULT,
            });
        }

        let mut last = None;
        for index in 0..count {
            let result = self.step_result(index)?;
            let stop = result.status() != Status::Success;
            last = Some(result);
            if stop {
                break;
            }
        }

        let last = last.ok_or(ServiceError::MethodNotOverridden {
            service: self.config.name(),
            method: RESULT,
        })?;
        Ok(last.copy(
            Overrides::new()
                .service(self.id.clone())
                .parent(Some(last.clone())),
        ))
    }

    /// Runs a registered organizer method.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotDefined` for unknown names, or the body's error.
    pub fn call_method(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ServiceResult, ServiceError> {
        let body = self
            .config
            .method_body(name)
            .ok_or_else(|| ServiceError::MethodNotDefined {
                service: self.config.name(),
                method: name.to_string(),
            })?;
        body(self, arguments).map_err(ServiceError::from)
    }
}

impl<S: Service> Deref for Instance<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.service
    }
}

impl<S: Service> fmt::Debug for Instance<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("arguments", &self.arguments)
            .field("outputs", &*self.outputs.read())
            .finish_non_exhaustive()
    }
}

fn cast_keyword<T: Cast>(arguments: &Arguments, key: &str) -> Result<T, ServiceError> {
    let value = arguments.get(key).unwrap_or(&Value::Null);
    Ok(T::cast(value)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
