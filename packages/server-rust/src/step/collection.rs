use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::definition::Step;
use super::method::Caller;
use crate::error::ConfigError;
use crate::service::{Config, Service};

// ---------------------------------------------------------------------------
// StepCollection
// ---------------------------------------------------------------------------

/// Ordered steps of one organizer type.
///
/// Steps are appended while the type is configured. [`StepCollection::commit`]
/// validates every step, then publishes the output bindings and the frozen
/// step list in one go, so a rejected step leaves nothing wired.
pub struct StepCollection<S: Service> {
    organizer: &'static str,
    pending: RwLock<Vec<Arc<Step<S>>>>,
    /// Output name -> index of the step producing it.
    bindings: OnceLock<HashMap<String, usize>>,
    committed: OnceLock<Arc<[Arc<Step<S>>]>>,
}

impl<S: Service> StepCollection<S> {
    #[must_use]
    pub fn new(organizer: &'static str) -> Self {
        Self {
            organizer,
            pending: RwLock::new(Vec::new()),
            bindings: OnceLock::new(),
            committed: OnceLock::new(),
        }
    }

    /// Appends a step.
    ///
    /// # Errors
    ///
    /// Returns `Committed` once the collection is committed.
    pub(crate) fn push(&self, mut step: Step<S>) -> Result<(), ConfigError> {
        let mut pending = self.pending.write();
        if self.is_committed() {
            return Err(ConfigError::Committed {
                service: self.organizer,
                what: format!("step {}", step.label()),
            });
        }
        step.index = pending.len();
        pending.push(Arc::new(step));
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.committed.get() {
            Some(steps) => steps.len(),
            None => self.pending.read().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed.get().is_some()
    }

    /// Committed step at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<Step<S>>> {
        self.committed.get()?.get(index).cloned()
    }

    /// Index of the step that defines output `name`. Reassignments define
    /// nothing new and are not bound.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<usize> {
        self.bindings.get()?.get(name).copied()
    }

    /// Validates every step, then defines every output binding.
    ///
    /// Returns `Ok(true)` the first time and `Ok(false)` afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first invalid binding in declaration order.
    pub fn commit(&self, config: &Config<S>) -> Result<bool, ConfigError> {
        if self.is_committed() {
            return Ok(false);
        }
        let steps: Vec<Arc<Step<S>>> = self.pending.read().clone();
        let bindings = self.validate(config, &steps)?;

        // Publish under the write lock so `push` sees either the open list or
        // the committed one. A step pushed during validation is validated too.
        let pending = self.pending.write();
        if pending.len() != steps.len() {
            drop(pending);
            return self.commit(config);
        }
        let _ = self.bindings.set(bindings);
        let _ = self.committed.set(steps.into());
        drop(pending);
        tracing::debug!(organizer = self.organizer, steps = self.len(), "committed steps");
        Ok(true)
    }

    fn validate(
        &self,
        config: &Config<S>,
        steps: &[Arc<Step<S>>],
    ) -> Result<HashMap<String, usize>, ConfigError> {
        // Any output in the collection is a valid input name; reading it
        // before its step ran is caught at run time.
        let produced: HashSet<&str> = steps
            .iter()
            .flat_map(|step| step.outputs())
            .filter(|output| !output.is_reassignment())
            .map(|output| output.name.as_str())
            .collect();

        let mut bindings = HashMap::new();
        for step in steps {
            let index = step.index();

            for input in step.inputs() {
                match input.caller {
                    Caller::Reassign => {
                        return Err(self.invalid(
                            index,
                            &input.name,
                            "input",
                            "reassignment is output-only",
                        ));
                    }
                    Caller::Read => {
                        let known = config.has_input(&input.key)
                            || produced.contains(input.key.as_str());
                        if !known {
                            return Err(ConfigError::UnknownInput {
                                service: self.organizer,
                                index,
                                input: input.key.clone(),
                            });
                        }
                    }
                    Caller::Value(_) | Caller::Proc(_) => {}
                }
            }

            for output in step.outputs() {
                let name = output.name.as_str();
                let exists = config.has_input(name) || bindings.contains_key(name);
                match output.caller {
                    Caller::Value(_) | Caller::Proc(_) => {
                        return Err(self.invalid(
                            index,
                            name,
                            "output",
                            "literal values cannot be written",
                        ));
                    }
                    Caller::Reassign if !exists => {
                        return Err(self.invalid(
                            index,
                            name,
                            "output",
                            "reassigns a name that is not defined",
                        ));
                    }
                    Caller::Reassign => {}
                    Caller::Read if exists => {
                        return Err(ConfigError::OutputAlreadyDefined {
                            service: self.organizer,
                            index,
                            output: name.to_string(),
                        });
                    }
                    Caller::Read => {
                        bindings.insert(name.to_string(), index);
                    }
                }
            }

            step.runner().validate(config, index, step.fallbacks())?;
        }
        Ok(bindings)
    }

    fn invalid(
        &self,
        index: usize,
        name: &str,
        direction: &'static str,
        reason: &'static str,
    ) -> ConfigError {
        ConfigError::InvalidBinding {
            service: self.organizer,
            index,
            name: name.to_string(),
            direction,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use conduct_core::{data, Arguments, Data, ServiceResult, Status, Value};

    use super::*;
    use crate::error::ServiceError;
    use crate::middleware::pipeline;
    use crate::service::Instance;
    use crate::step::{FallbackKind, Method, Step};

    /// Succeeds with its keyword arguments as data.
    struct Echo(Data);

    impl Service for Echo {
        fn build(arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self(arguments.kwargs.clone()))
        }

        fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
            Ok(this.success(this.0.clone())?)
        }
    }

    struct Double(i64);

    impl Service for Double {
        fn build(arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self(arguments.get("n").and_then(Value::as_i64).unwrap_or_default()))
        }

        fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
            Ok(this.success(data! { "n" => this.0 * 2 })?)
        }
    }

    /// Always fails; its failure fallback yields zero.
    struct Reject;

    impl Service for Reject {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn configure(config: &Config<Self>) -> Result<(), ConfigError> {
            pipeline::configure(config)?;
            config.fallback(FallbackKind::Failure, |this| {
                Ok(this.success(data! { "n" => 0 })?)
            })
        }

        fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
            Ok(this.failure(data! { "reason" => "rejected" }, "rejected")?)
        }
    }

    struct Org;

    impl Service for Org {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    fn organizer(
        setup: impl FnOnce(&Config<Org>) -> Result<(), ConfigError>,
    ) -> Config<Org> {
        let config = Config::<Org>::new();
        pipeline::configure(&config).unwrap();
        config.attributes(["n"]).unwrap();
        setup(&config).unwrap();
        config
    }

    fn rejected(setup: impl FnOnce(&Config<Org>) -> Result<(), ConfigError>) -> ConfigError {
        organizer(setup).commit().unwrap_err()
    }

    fn run(setup: impl FnOnce(&Config<Org>) -> Result<(), ConfigError>) -> Instance<Org> {
        let config = organizer(setup);
        Instance::with_config(Arc::new(config), Arguments::new().kwarg("n", 21)).unwrap()
    }

    // -- running --------------------------------------------------------------

    #[test]
    fn steps_run_in_order_and_bind_outputs() {
        let instance = run(|config| {
            config.step(Step::service::<Echo>().input("n").output(("n", "x")))?;
            config.step(
                Step::service::<Double>()
                    .input(("x", "n"))
                    .output(("n", "doubled")),
            )
        });

        let result = instance.result().unwrap();
        assert!(result.is_success());
        assert_eq!(result.data().unwrap().get("n"), Some(&Value::from(42)));
        assert_eq!(result.service(), instance.id());
        assert_eq!(result.parent().unwrap().service().service, "Double");
        assert_eq!(instance.read("x").unwrap(), Value::from(21));
        assert_eq!(instance.read("doubled").unwrap(), Value::from(42));
    }

    #[test]
    fn reading_a_later_output_is_not_completed() {
        let instance = run(|config| {
            config.step(
                Step::service::<Double>()
                    .input(("x", "n"))
                    .output(("n", "doubled")),
            )?;
            config.step(Step::service::<Echo>().input("n").output(("n", "x")))
        });

        let err = instance.result().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotCompletedStep { service: "Org", index: 1, ref output } if output == "x"
        ));
    }

    #[test]
    fn stops_at_the_first_unsuccessful_step() {
        let instance = run(|config| {
            config.step(Step::service::<Reject>().input("n"))?;
            config.step(Step::service::<Double>().input("n").output(("n", "doubled")))
        });

        let result = instance.result().unwrap();
        assert!(result.is_failure());
        assert_eq!(result.message().unwrap().as_str(), "rejected");
        assert_eq!(result.service().service, "Org");
        assert_eq!(result.parent().unwrap().service().service, "Reject");
        assert!(instance.is_step_completed(0));
        assert!(!instance.is_step_completed(1));
    }

    #[test]
    fn failure_fallback_replaces_the_step_result() {
        let instance = run(|config| {
            config.step(
                Step::service::<Reject>()
                    .input("n")
                    .output(("n", "x"))
                    .fallback(FallbackKind::Failure),
            )?;
            config.step(
                Step::service::<Double>()
                    .input(("x", "n"))
                    .output(("n", "doubled")),
            )
        });

        let result = instance.result().unwrap();
        assert!(result.is_success());
        assert!(instance.step_result(0).unwrap().is_fallback_result());
        assert_eq!(instance.read("doubled").unwrap(), Value::from(0));
    }

    #[test]
    fn outputs_of_an_unsuccessful_step_are_unavailable() {
        let instance = run(|config| {
            config.step(Step::service::<Reject>().input("n").output(("n", "x")))
        });

        assert!(instance.step_result(0).unwrap().is_failure());
        let err = instance.read("x").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::StepOutputUnavailable {
                index: 0,
                status: Status::Failure,
                ref output,
                ..
            } if output == "x"
        ));
    }

    #[test]
    fn pushing_after_commit_is_rejected() {
        let config = organizer(|config| config.step(Step::service::<Echo>().input("n")));
        config.commit().unwrap();

        let err = config
            .steps()
            .push(Step::service::<Double>().input("n"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Committed { service: "Org", .. }));
        assert_eq!(config.steps().len(), 1);
    }

    #[test]
    fn missing_output_key_is_reported() {
        let instance = run(|config| {
            config.step(Step::service::<Echo>().input("n").output(("absent", "y")))
        });

        let err = instance.result().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MissingOutputKey { index: 0, ref key, .. } if key == "absent"
        ));
    }

    #[test]
    fn step_results_are_memoized() {
        let instance = run(|config| config.step(Step::service::<Echo>().input("n")));

        assert!(!instance.is_step_completed(0));
        let first = instance.step_result(0).unwrap();
        let second = instance.step_result(0).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(instance.is_step_completed(0));
    }

    #[test]
    fn repeated_reassignments_overwrite() {
        let instance = run(|config| {
            config.step(
                Step::service::<Double>()
                    .input("n")
                    .output(Method::reassign("n")),
            )?;
            config.step(
                Step::service::<Double>()
                    .input("n")
                    .output(Method::reassign("n")),
            )
        });

        instance.result().unwrap();
        assert_eq!(instance.read("n").unwrap(), Value::from(84));
    }

    #[test]
    fn method_steps_run_on_the_organizer() {
        let instance = run(|config| {
            config.method_step("triple", |this, arguments| {
                let n = arguments.get("n").and_then(Value::as_i64).unwrap_or_default();
                Ok(this.success(data! { "n" => n * 3 })?)
            })?;
            config.step(
                Step::method("triple")
                    .input(Method::proc("n", |this: &Instance<Org>| {
                        let n = this.read("n")?.as_i64().unwrap_or_default();
                        Ok(Value::from(n + 1))
                    }))
                    .output(("n", "tripled")),
            )
        });

        let result = instance.result().unwrap();
        assert!(result.is_success());
        assert_eq!(instance.read("tripled").unwrap(), Value::from(66));
        assert!(instance.constructed().lock().is_empty());
    }

    // -- commit-time validation ---------------------------------------------

    #[test]
    fn unknown_input_is_rejected() {
        let err = rejected(|config| config.step(Step::service::<Echo>().input("missing")));
        assert_eq!(
            err,
            ConfigError::UnknownInput {
                service: "Org",
                index: 0,
                input: "missing".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_outputs_are_rejected() {
        let err = rejected(|config| config.step(Step::service::<Echo>().output("n")));
        assert!(matches!(err, ConfigError::OutputAlreadyDefined { index: 0, .. }));

        let err = rejected(|config| {
            config.step(Step::service::<Echo>().input("n").output(("n", "x")))?;
            config.step(Step::service::<Echo>().input("n").output(("n", "x")))
        });
        assert_eq!(
            err,
            ConfigError::OutputAlreadyDefined {
                service: "Org",
                index: 1,
                output: "x".to_string(),
            }
        );
    }

    #[test]
    fn misplaced_callers_are_rejected() {
        let err = rejected(|config| {
            config.step(Step::service::<Echo>().input(Method::reassign("n")))
        });
        assert!(matches!(err, ConfigError::InvalidBinding { direction: "input", .. }));

        let err = rejected(|config| {
            config.step(Step::service::<Echo>().output(Method::value("x", 1)))
        });
        assert!(matches!(err, ConfigError::InvalidBinding { direction: "output", .. }));

        let err = rejected(|config| {
            config.step(Step::service::<Echo>().output(Method::reassign("ghost")))
        });
        assert!(matches!(
            err,
            ConfigError::InvalidBinding { direction: "output", ref name, .. } if name == "ghost"
        ));
    }

    #[test]
    fn unknown_targets_and_fallbacks_are_rejected() {
        let err = rejected(|config| config.step(Step::method("nope")));
        assert!(matches!(err, ConfigError::UnknownStepTarget { index: 0, .. }));

        let err = rejected(|config| {
            config.step(Step::service::<Echo>().fallback(FallbackKind::Failure))
        });
        assert_eq!(
            err,
            ConfigError::FallbackNotDefined {
                organizer: "Org",
                index: 0,
                service: "Echo",
                method: "fallback_failure_result",
            }
        );
    }

    #[test]
    fn failed_commit_binds_nothing() {
        let config = organizer(|config| {
            config.step(Step::service::<Echo>().input("n").output(("n", "x")))?;
            config.step(Step::service::<Echo>().input("missing"))
        });

        assert!(config.commit().is_err());
        assert!(!config.steps().is_committed());
        assert_eq!(config.steps().binding("x"), None);
        assert!(config.steps().get(0).is_none());
    }
}
