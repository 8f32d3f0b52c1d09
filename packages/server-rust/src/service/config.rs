//! Per-type configuration: concerns, method stacks, steps and readers.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use conduct_core::{Arguments, ServiceResult, Value};
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::concern::{Concern, ConcernEntry};
use super::instance::{Class, Instance};
use super::Service;
use crate::dispatch::{MethodContainer, MethodKey, Middleware, Scope, Stack, StackError, Terminal};
use crate::error::{ConfigError, ServiceError};
use crate::middleware::Stub;
use crate::settings::Settings;
use crate::step::{FallbackKind, Step, StepCollection};

/// Middleware on an instance method of `S`.
pub type InstanceMiddleware<S> = Middleware<Instance<S>, ServiceResult>;
/// Middleware on a static method of `S`.
pub type ClassMiddleware<S> = Middleware<Class<S>, ServiceResult>;
/// Organizer method runnable as a step.
pub type MethodBody<S> =
    Arc<dyn Fn(&Instance<S>, &Arguments) -> anyhow::Result<ServiceResult> + Send + Sync>;
/// Body of a fallback result method.
pub type FallbackBody<S> = Arc<dyn Fn(&Instance<S>) -> anyhow::Result<ServiceResult> + Send + Sync>;
/// Named accessor over the service value.
pub type Reader<S> = Arc<dyn Fn(&S) -> Value + Send + Sync>;

type InstanceContainer<S> = Arc<MethodContainer<Instance<S>, ServiceResult>>;
type ClassContainer<S> = Arc<MethodContainer<Class<S>, ServiceResult>>;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration of one service type.
///
/// Everything is registered through `&self`, so the config can be shared
/// behind an `Arc` from the moment it is built. [`Config::commit`] applies
/// the concerns, freezes every stack and makes further registration fail
/// with [`ConfigError::Committed`]. Stubs are the exception: they may be
/// registered and cleared at any time.
pub struct Config<S: Service> {
    name: &'static str,
    settings: Settings,
    concerns: RwLock<Stack<ConcernEntry<S>>>,
    instance_methods: RwLock<HashMap<&'static str, InstanceContainer<S>>>,
    class_methods: RwLock<HashMap<&'static str, ClassContainer<S>>>,
    defined: RwLock<HashSet<MethodKey>>,
    steps: StepCollection<S>,
    readers: RwLock<BTreeMap<String, Reader<S>>>,
    attributes: RwLock<BTreeSet<String>>,
    method_steps: RwLock<HashMap<String, MethodBody<S>>>,
    fallbacks: RwLock<HashMap<FallbackKind, FallbackBody<S>>>,
    stubs: RwLock<Vec<Stub>>,
    /// Holds `true` while a commit is running on the current thread.
    commit_lock: ReentrantMutex<Cell<bool>>,
    committed: AtomicBool,
    setup_error: Mutex<Option<ConfigError>>,
}

impl<S: Service> Config<S> {
    pub(crate) fn new() -> Self {
        let name = S::name();
        Self {
            name,
            settings: S::settings(),
            concerns: RwLock::new(Stack::new(format!("{name} concerns"))),
            instance_methods: RwLock::new(HashMap::new()),
            class_methods: RwLock::new(HashMap::new()),
            defined: RwLock::new(HashSet::new()),
            steps: StepCollection::new(name),
            readers: RwLock::new(BTreeMap::new()),
            attributes: RwLock::new(BTreeSet::new()),
            method_steps: RwLock::new(HashMap::new()),
            fallbacks: RwLock::new(HashMap::new()),
            stubs: RwLock::new(Vec::new()),
            commit_lock: ReentrantMutex::new(Cell::new(false)),
            committed: AtomicBool::new(false),
            setup_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    pub(crate) fn record_setup_error(&self, err: ConfigError) {
        self.setup_error.lock().get_or_insert(err);
    }

    fn ensure_open(&self, what: impl FnOnce() -> String) -> Result<(), ConfigError> {
        if self.is_committed() {
            return Err(ConfigError::Committed {
                service: self.name,
                what: what(),
            });
        }
        Ok(())
    }

    // -- concerns -----------------------------------------------------------

    /// Edits the concern stack.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit, or the stack error raised by `edit`.
    pub fn concerns(
        &self,
        edit: impl FnOnce(&mut Stack<ConcernEntry<S>>) -> Result<(), StackError>,
    ) -> Result<(), ConfigError> {
        self.ensure_open(|| "concerns".to_string())?;
        edit(&mut self.concerns.write())?;
        Ok(())
    }

    /// Appends a concern.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn include<C: Concern<S>>(&self, concern: C) -> Result<(), ConfigError> {
        self.concerns(|stack| stack.push(ConcernEntry::new(concern)).map(drop))
    }

    #[must_use]
    pub fn concern_ids(&self) -> Vec<String> {
        self.concerns.read().ids()
    }

    // -- method stacks ------------------------------------------------------

    /// Edits the middleware stack of an instance method.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit, or the stack error raised by `edit`.
    pub fn middlewares(
        &self,
        method: &'static str,
        edit: impl FnOnce(&mut Stack<InstanceMiddleware<S>>) -> Result<(), StackError>,
    ) -> Result<(), ConfigError> {
        self.ensure_open(|| format!("middlewares for #{method}"))?;
        self.instance_container(method).configure(edit)?;
        Ok(())
    }

    /// Edits the middleware stack of a static method.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit, or the stack error raised by `edit`.
    pub fn class_middlewares(
        &self,
        method: &'static str,
        edit: impl FnOnce(&mut Stack<ClassMiddleware<S>>) -> Result<(), StackError>,
    ) -> Result<(), ConfigError> {
        self.ensure_open(|| format!("middlewares for .{method}"))?;
        self.class_container(method).configure(edit)?;
        Ok(())
    }

    /// Middleware ids of a method, outermost first. Empty for a method that
    /// has no container yet; looking one up never creates it.
    #[must_use]
    pub fn middleware_ids(&self, key: MethodKey) -> Vec<String> {
        let ids = match key.scope {
            Scope::Instance => self.instance_methods.read().get(key.name).map(|c| c.ids()),
            Scope::Static => self.class_methods.read().get(key.name).map(|c| c.ids()),
        };
        ids.unwrap_or_default()
    }

    /// Marks a method as dispatchable. Concerns call this from `included`.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn define(&self, key: MethodKey) -> Result<(), ConfigError> {
        self.ensure_open(|| format!("method {key}"))?;
        match key.scope {
            Scope::Instance => drop(self.instance_container(key.name)),
            Scope::Static => drop(self.class_container(key.name)),
        }
        self.defined.write().insert(key);
        Ok(())
    }

    #[must_use]
    pub fn is_defined(&self, key: MethodKey) -> bool {
        self.defined.read().contains(&key)
    }

    fn instance_container(&self, method: &'static str) -> InstanceContainer<S> {
        if let Some(container) = self.instance_methods.read().get(method) {
            return Arc::clone(container);
        }
        let mut methods = self.instance_methods.write();
        Arc::clone(methods.entry(method).or_insert_with(|| {
            Arc::new(MethodContainer::new(self.name, MethodKey::instance(method)))
        }))
    }

    fn class_container(&self, method: &'static str) -> ClassContainer<S> {
        if let Some(container) = self.class_methods.read().get(method) {
            return Arc::clone(container);
        }
        let mut methods = self.class_methods.write();
        Arc::clone(methods.entry(method).or_insert_with(|| {
            Arc::new(MethodContainer::new(self.name, MethodKey::static_method(method)))
        }))
    }

    pub(crate) fn dispatch_instance(
        &self,
        method: &'static str,
        target: &Instance<S>,
        arguments: Arguments,
        terminal: &Terminal<'_, Instance<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        let key = MethodKey::instance(method);
        self.ensure_defined(key)?;
        self.instance_container(method)
            .dispatch(target, arguments, terminal)
    }

    pub(crate) fn dispatch_class(
        &self,
        method: &'static str,
        target: &Class<S>,
        arguments: Arguments,
        terminal: &Terminal<'_, Class<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        let key = MethodKey::static_method(method);
        self.ensure_defined(key)?;
        self.class_container(method).dispatch(target, arguments, terminal)
    }

    fn ensure_defined(&self, key: MethodKey) -> Result<(), ServiceError> {
        if self.is_defined(key) {
            return Ok(());
        }
        Err(ServiceError::MethodNotDefined {
            service: self.name,
            method: key.to_string(),
        })
    }

    // -- steps and attributes -----------------------------------------------

    /// Declares the next step.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn step(&self, step: Step<S>) -> Result<(), ConfigError> {
        self.ensure_open(|| format!("step {}", step.label()))?;
        self.steps.push(step)
    }

    #[must_use]
    pub fn steps(&self) -> &StepCollection<S> {
        &self.steps
    }

    /// Declares a named accessor over the service value.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn reader(
        &self,
        name: impl Into<String>,
        read: impl Fn(&S) -> Value + Send + Sync + 'static,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        self.ensure_open(|| format!("reader `{name}`"))?;
        self.readers.write().insert(name, Arc::new(read));
        Ok(())
    }

    /// Declares keyword arguments readable by name.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn attributes<I, N>(&self, names: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.ensure_open(|| "attributes".to_string())?;
        self.attributes
            .write()
            .extend(names.into_iter().map(Into::into));
        Ok(())
    }

    /// Whether `name` resolves to a reader or a declared attribute.
    #[must_use]
    pub fn has_input(&self, name: &str) -> bool {
        self.readers.read().contains_key(name) || self.attributes.read().contains(name)
    }

    pub(crate) fn read_reader(&self, name: &str, service: &S) -> Option<Value> {
        let reader = self.readers.read().get(name).cloned()?;
        Some(reader(service))
    }

    pub(crate) fn has_attribute(&self, name: &str) -> bool {
        self.attributes.read().contains(name)
    }

    /// Registers an organizer method that steps may target by name.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn method_step(
        &self,
        name: impl Into<String>,
        body: impl Fn(&Instance<S>, &Arguments) -> anyhow::Result<ServiceResult> + Send + Sync + 'static,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        self.ensure_open(|| format!("method step `{name}`"))?;
        self.method_steps.write().insert(name, Arc::new(body));
        Ok(())
    }

    pub(crate) fn method_body(&self, name: &str) -> Option<MethodBody<S>> {
        self.method_steps.read().get(name).cloned()
    }

    #[must_use]
    pub fn has_method_step(&self, name: &str) -> bool {
        self.method_steps.read().contains_key(name)
    }

    /// Overrides a fallback result method.
    ///
    /// # Errors
    ///
    /// Returns `Committed` after commit.
    pub fn fallback(
        &self,
        kind: FallbackKind,
        body: impl Fn(&Instance<S>) -> anyhow::Result<ServiceResult> + Send + Sync + 'static,
    ) -> Result<(), ConfigError> {
        self.ensure_open(|| format!("fallback #{}", kind.method()))?;
        self.fallbacks.write().insert(kind, Arc::new(body));
        Ok(())
    }

    pub(crate) fn fallback_body(&self, kind: FallbackKind) -> Option<FallbackBody<S>> {
        self.fallbacks.read().get(&kind).cloned()
    }

    /// Whether the fallback method is both defined and overridden.
    #[must_use]
    pub fn has_fallback(&self, kind: FallbackKind) -> bool {
        self.is_defined(MethodKey::instance(kind.method()))
            && self.fallbacks.read().contains_key(&kind)
    }

    // -- stubs ----------------------------------------------------------------

    /// Registers a canned result for the static `result`.
    pub fn stub(&self, stub: Stub) {
        tracing::debug!(service = self.name, "registered result stub");
        self.stubs.write().push(stub);
    }

    pub fn clear_stubs(&self) {
        self.stubs.write().clear();
    }

    /// Most recent stub matching `arguments`. Stubs with explicit arguments
    /// win over catch-all stubs.
    pub(crate) fn find_stub(&self, arguments: &Arguments) -> Option<Stub> {
        let stubs = self.stubs.read();
        stubs
            .iter()
            .rev()
            .find(|stub| stub.matches_exactly(arguments))
            .or_else(|| stubs.iter().rev().find(|stub| stub.is_catch_all()))
            .cloned()
    }

    // -- commit ---------------------------------------------------------------

    /// Applies concerns, compiles every method stack and freezes the config.
    ///
    /// Returns `Ok(true)` the first time and `Ok(false)` afterwards, including
    /// when re-entered from a concern of the commit in progress.
    ///
    /// # Errors
    ///
    /// Returns the error recorded while configuring, or the first concern
    /// error. A failed commit keeps failing with the same error.
    pub fn commit(&self) -> Result<bool, ConfigError> {
        let running = self.commit_lock.lock();
        if self.is_committed() || running.get() {
            return Ok(false);
        }
        if let Some(err) = self.setup_error.lock().clone() {
            return Err(err);
        }

        running.set(true);
        let applied = self.apply();
        running.set(false);

        if let Err(err) = applied {
            self.record_setup_error(err.clone());
            return Err(err);
        }
        self.committed.store(true, Ordering::Release);
        tracing::debug!(
            service = self.name,
            concerns = ?self.concern_ids(),
            steps = self.steps.len(),
            "committed service config"
        );
        Ok(true)
    }

    fn apply(&self) -> Result<(), ConfigError> {
        let concerns = {
            let mut stack = self.concerns.write();
            stack.freeze();
            stack.compile()
        };
        for concern in concerns.iter() {
            concern.include(self)?;
        }

        let instance: Vec<_> = self.instance_methods.read().values().cloned().collect();
        for container in instance {
            container.compile();
        }
        let class: Vec<_> = self.class_methods.read().values().cloned().collect();
        for container in class {
            container.compile();
        }
        Ok(())
    }
}

impl<S: Service> fmt::Debug for Config<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("concerns", &self.concern_ids())
            .field("steps", &self.steps.len())
            .field("committed", &self.is_committed())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use conduct_core::data;

    use super::*;
    use crate::dispatch::Anchor;
    use crate::middleware::{pipeline, StubbedResults};
    use crate::service::{Results, RESULT};

    struct Plain;

    impl Service for Plain {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
            Ok(this.success(data! { "ok" => true })?)
        }
    }

    fn configured() -> Config<Plain> {
        let config = Config::<Plain>::new();
        pipeline::configure(&config).unwrap();
        config
    }

    fn short(ids: Vec<String>) -> Vec<String> {
        ids.into_iter()
            .map(|id| id.rsplit("::").next().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn commit_is_idempotent() {
        let config = configured();
        let before = config.concern_ids();

        assert_eq!(config.commit(), Ok(true));
        assert_eq!(config.commit(), Ok(false));
        assert!(config.is_committed());
        assert_eq!(config.concern_ids(), before);
    }

    #[test]
    fn standard_concerns_and_result_stack() {
        let config = configured();
        config.commit().unwrap();

        assert_eq!(
            short(config.concern_ids()),
            vec!["Results", "Fallbacks", "Steps", "Stubs"]
        );
        assert_eq!(
            short(config.middleware_ids(MethodKey::instance(RESULT))),
            vec!["CachesReturnValue", "RescuesUnhandledErrors", "DetectsDoubleResult"]
        );
        assert_eq!(
            short(config.middleware_ids(MethodKey::static_method(RESULT))),
            vec!["StubbedResults"]
        );
        assert!(config.is_defined(MethodKey::instance("success")));
        assert!(config.is_defined(MethodKey::instance("fallback_error_result")));
    }

    #[test]
    fn looking_up_middleware_ids_leaves_the_config_untouched() {
        let config = configured();
        config.commit().unwrap();
        let before = (config.instance_methods.read().len(), config.class_methods.read().len());

        assert!(config.middleware_ids(MethodKey::instance("unknown")).is_empty());
        assert!(config.middleware_ids(MethodKey::static_method("unknown")).is_empty());
        assert_eq!(
            (config.instance_methods.read().len(), config.class_methods.read().len()),
            before
        );
        assert!(!config.instance_methods.read().contains_key("unknown"));
    }

    #[test]
    fn registration_after_commit_fails() {
        let config = configured();
        config.commit().unwrap();

        let committed = |err: ConfigError| matches!(err, ConfigError::Committed { service: "Plain", .. });
        assert!(committed(config.include(Results).unwrap_err()));
        assert!(committed(
            config
                .middlewares(RESULT, |stack| stack.delete(0).map(drop))
                .unwrap_err()
        ));
        assert!(committed(
            config
                .class_middlewares(RESULT, |stack| stack
                    .insert_before(Anchor::Index(0), Middleware::new(StubbedResults))
                    .map(drop))
                .unwrap_err()
        ));
        assert!(committed(config.step(Step::method("late")).unwrap_err()));
        assert!(committed(config.reader("late", |_| Value::Null).unwrap_err()));
        assert!(committed(config.attributes(["late"]).unwrap_err()));
        assert!(committed(
            config
                .fallback(FallbackKind::Error, |this| Ok(this.success(Default::default())?))
                .unwrap_err()
        ));
    }

    #[test]
    fn stubs_stay_registrable_after_commit() {
        let config = configured();
        config.commit().unwrap();

        config.stub(Stub::success(data! { "n" => 1 }));
        config.stub(Stub::failure(data! {}, "specific").with_arguments(Arguments::new().kwarg("n", 2)));

        let any = config.find_stub(&Arguments::new()).unwrap();
        let specific = config.find_stub(&Arguments::new().kwarg("n", 2)).unwrap();
        assert!(any.is_catch_all());
        assert!(!specific.is_catch_all());

        config.clear_stubs();
        assert!(config.find_stub(&Arguments::new()).is_none());
    }

    #[test]
    fn stack_errors_surface_as_config_errors() {
        let config = configured();
        let err = config
            .middlewares(RESULT, |stack| stack.delete("missing").map(drop))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Stack(StackError::MissingAnchor { .. })
        ));
    }

    #[test]
    fn undefined_method_cannot_be_dispatched() {
        let config = Arc::new(Config::<Plain>::new());
        config.commit().unwrap();

        let instance = Instance::with_config(Arc::clone(&config), Arguments::new()).unwrap();
        let err = instance.result().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MethodNotDefined { service: "Plain", ref method } if method == "#result"
        ));
    }

    #[test]
    fn failed_commit_keeps_failing() {
        struct Failing;

        impl Concern<Plain> for Failing {
            fn included(&self, config: &Config<Plain>) -> Result<(), ConfigError> {
                Err(ConfigError::UnknownStepTarget {
                    service: config.name(),
                    index: 0,
                    method: "nothing".to_string(),
                })
            }
        }

        let config = configured();
        config.include(Failing).unwrap();

        let first = config.commit().unwrap_err();
        assert_eq!(config.commit().unwrap_err(), first);
        assert!(!config.is_committed());
    }
}
