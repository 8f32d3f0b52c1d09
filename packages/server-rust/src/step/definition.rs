//! Step declarations and the runners behind them.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use conduct_core::{Arguments, Data, ServiceResult, Status, Value};

use super::method::{Caller, Method};
use crate::error::{ConfigError, ServiceError};
use crate::service::{Config, Instance, Service, FALLBACK_ERROR_RESULT, FALLBACK_FAILURE_RESULT};

// ---------------------------------------------------------------------------
// FallbackKind
// ---------------------------------------------------------------------------

/// Which non-success status a step falls back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackKind {
    Failure,
    Error,
}

impl FallbackKind {
    /// Name of the fallback method on the target service.
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            FallbackKind::Failure => FALLBACK_FAILURE_RESULT,
            FallbackKind::Error => FALLBACK_ERROR_RESULT,
        }
    }

    #[must_use]
    pub fn handles(self, status: Status) -> bool {
        matches!(
            (self, status),
            (FallbackKind::Failure, Status::Failure) | (FallbackKind::Error, Status::Error)
        )
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// What a step runs: another service, or a method of the organizer.
pub trait StepRunner<S: Service>: Send + Sync + 'static {
    fn label(&self) -> String;

    /// Commit-time checks for this target.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStepTarget` or `FallbackNotDefined`.
    fn validate(
        &self,
        config: &Config<S>,
        index: usize,
        fallbacks: &[FallbackKind],
    ) -> Result<(), ConfigError>;

    /// # Errors
    ///
    /// Returns whatever the target's pipeline fails with.
    fn run(&self, organizer: &Instance<S>, arguments: Arguments)
        -> Result<ServiceResult, ServiceError>;

    /// # Errors
    ///
    /// Returns whatever the target's fallback method fails with.
    fn fallback(
        &self,
        organizer: &Instance<S>,
        arguments: Arguments,
        kind: FallbackKind,
    ) -> Result<ServiceResult, ServiceError>;
}

/// Runs the full static pipeline of `Sub`.
pub struct ServiceStep<Sub>(PhantomData<fn() -> Sub>);

impl<Sub> ServiceStep<Sub> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<Sub> Default for ServiceStep<Sub> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Service, Sub: Service> StepRunner<S> for ServiceStep<Sub> {
    fn label(&self) -> String {
        Sub::name().to_string()
    }

    fn validate(
        &self,
        config: &Config<S>,
        index: usize,
        fallbacks: &[FallbackKind],
    ) -> Result<(), ConfigError> {
        if fallbacks.is_empty() {
            return Ok(());
        }
        let sub = Sub::config();
        sub.commit()?;
        for &kind in fallbacks {
            if !sub.has_fallback(kind) {
                return Err(ConfigError::FallbackNotDefined {
                    organizer: config.name(),
                    index,
                    service: sub.name(),
                    method: kind.method(),
                });
            }
        }
        Ok(())
    }

    fn run(
        &self,
        _organizer: &Instance<S>,
        arguments: Arguments,
    ) -> Result<ServiceResult, ServiceError> {
        Sub::call(arguments)
    }

    fn fallback(
        &self,
        _organizer: &Instance<S>,
        arguments: Arguments,
        kind: FallbackKind,
    ) -> Result<ServiceResult, ServiceError> {
        Instance::<Sub>::new(arguments)?.fallback_result(kind)
    }
}

/// Runs a method registered with [`Config::method_step`] on the organizer.
///
/// Results the method constructs do not count towards the organizer's own
/// double-result detection.
pub struct MethodStep {
    name: String,
}

impl MethodStep {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn isolated<S: Service>(
        organizer: &Instance<S>,
        run: impl FnOnce() -> Result<ServiceResult, ServiceError>,
    ) -> Result<ServiceResult, ServiceError> {
        let mark = organizer.constructed().lock().len();
        let outcome = run();
        organizer.constructed().lock().truncate(mark);
        outcome
    }
}

impl<S: Service> StepRunner<S> for MethodStep {
    fn label(&self) -> String {
        format!("#{}", self.name)
    }

    fn validate(
        &self,
        config: &Config<S>,
        index: usize,
        fallbacks: &[FallbackKind],
    ) -> Result<(), ConfigError> {
        if !config.has_method_step(&self.name) {
            return Err(ConfigError::UnknownStepTarget {
                service: config.name(),
                index,
                method: self.name.clone(),
            });
        }
        for &kind in fallbacks {
            if !config.has_fallback(kind) {
                return Err(ConfigError::FallbackNotDefined {
                    organizer: config.name(),
                    index,
                    service: config.name(),
                    method: kind.method(),
                });
            }
        }
        Ok(())
    }

    fn run(
        &self,
        organizer: &Instance<S>,
        arguments: Arguments,
    ) -> Result<ServiceResult, ServiceError> {
        Self::isolated(organizer, || organizer.call_method(&self.name, &arguments))
    }

    fn fallback(
        &self,
        organizer: &Instance<S>,
        _arguments: Arguments,
        kind: FallbackKind,
    ) -> Result<ServiceResult, ServiceError> {
        Self::isolated(organizer, || organizer.fallback_result(kind))
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One sequenced sub-computation of an organizer.
///
/// ```ignore
/// config.step(
///     Step::service::<Normalize>()
///         .input(("raw_name", "name"))
///         .output("name")
///         .fallback(FallbackKind::Failure),
/// )?;
/// ```
pub struct Step<S: Service> {
    pub(crate) index: usize,
    runner: Arc<dyn StepRunner<S>>,
    inputs: Vec<Method<S>>,
    outputs: Vec<Method<S>>,
    fallbacks: Vec<FallbackKind>,
}

impl<S: Service> Step<S> {
    /// Step running another service.
    #[must_use]
    pub fn service<Sub: Service>() -> Self {
        Self::with_runner(ServiceStep::<Sub>::new())
    }

    /// Step running a registered organizer method.
    #[must_use]
    pub fn method(name: impl Into<String>) -> Self {
        Self::with_runner(MethodStep::new(name))
    }

    #[must_use]
    pub fn with_runner(runner: impl StepRunner<S>) -> Self {
        Self {
            index: 0,
            runner: Arc::new(runner),
            inputs: Vec::new(),
            outputs: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    #[must_use]
    pub fn input(mut self, input: impl Into<Method<S>>) -> Self {
        self.inputs.push(input.into());
        self
    }

    #[must_use]
    pub fn output(mut self, output: impl Into<Method<S>>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// Replaces a failure or error result with the target's fallback result.
    #[must_use]
    pub fn fallback(mut self, kind: FallbackKind) -> Self {
        if !self.fallbacks.contains(&kind) {
            self.fallbacks.push(kind);
        }
        self
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.runner.label()
    }

    #[must_use]
    pub fn inputs(&self) -> &[Method<S>] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[Method<S>] {
        &self.outputs
    }

    #[must_use]
    pub fn fallbacks(&self) -> &[FallbackKind] {
        &self.fallbacks
    }

    pub(crate) fn runner(&self) -> &dyn StepRunner<S> {
        self.runner.as_ref()
    }

    /// Resolves inputs, runs the target, applies a fallback and writes the
    /// outputs of a successful result to the organizer.
    ///
    /// # Errors
    ///
    /// Returns input resolution errors, the target's errors, or
    /// `MissingOutputKey` when a success lacks a declared output.
    pub fn run(&self, organizer: &Instance<S>) -> Result<ServiceResult, ServiceError> {
        let arguments = self.resolve_inputs(organizer)?;
        let mut result = self.runner.run(organizer, arguments.clone())?;

        let status = result.status();
        if let Some(&kind) = self.fallbacks.iter().find(|kind| kind.handles(status)) {
            tracing::debug!(
                organizer = %organizer.id(),
                step = self.index,
                target = %self.label(),
                fallback = kind.method(),
                "step falls back"
            );
            result = self.runner.fallback(organizer, arguments, kind)?;
        }

        if result.status() == Status::Success {
            self.write_outputs(organizer, &result)?;
        }
        Ok(result)
    }

    fn resolve_inputs(&self, organizer: &Instance<S>) -> Result<Arguments, ServiceError> {
        let mut kwargs = Data::new();
        for input in &self.inputs {
            let value = match &input.caller {
                Caller::Read | Caller::Reassign => organizer.read(&input.key)?,
                Caller::Value(value) => value.clone(),
                Caller::Proc(proc) => proc(organizer).map_err(ServiceError::from)?,
            };
            kwargs.insert(input.name.clone(), value);
        }
        Ok(Arguments::from_kwargs(kwargs))
    }

    fn write_outputs(
        &self,
        organizer: &Instance<S>,
        result: &ServiceResult,
    ) -> Result<(), ServiceError> {
        let data = result.data_unchecked();
        let values = self
            .outputs
            .iter()
            .map(|output| {
                let value = data.get(&output.key).cloned().ok_or_else(|| {
                    ServiceError::MissingOutputKey {
                        service: organizer.config().name(),
                        index: self.index,
                        key: output.key.clone(),
                    }
                })?;
                Ok((output.name.as_str(), value))
            })
            .collect::<Result<Vec<(&str, Value)>, ServiceError>>()?;
        for (name, value) in values {
            organizer.write_output(name, value);
        }
        Ok(())
    }
}

impl<S: Service> fmt::Debug for Step<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("index", &self.index)
            .field("target", &self.label())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}
