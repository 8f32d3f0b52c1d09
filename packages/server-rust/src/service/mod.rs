//! Services: the `Service` trait, per-type configuration and instances.
//!
//! A service type implements [`Service`]; the first time it is used, its
//! [`Config`] is built by the global registry and configured by
//! [`Service::configure`]. The first call through a public entry point commits
//! the config, which applies its concerns and freezes every method stack.
//! Calls then flow through the static `result` stack of a [`Class`], into the
//! instance `result` stack of a fresh [`Instance`], and finally into the
//! user's [`Service::result`] body.

use std::any::type_name;
use std::sync::Arc;

use conduct_core::{Arguments, ServiceResult};

use crate::error::{ConfigError, ServiceError};
use crate::settings::Settings;

pub mod concern;
pub mod config;
pub mod instance;
pub mod registry;

pub use concern::{Concern, ConcernEntry, Fallbacks, Results, Steps, Stubs};
pub use config::{ClassMiddleware, Config, FallbackBody, InstanceMiddleware, MethodBody, Reader};
pub use instance::{Class, Instance};

// ---------------------------------------------------------------------------
// Method names
// ---------------------------------------------------------------------------

pub const RESULT: &str = "result";
pub const SUCCESS: &str = "success";
pub const FAILURE: &str = "failure";
pub const ERROR: &str = "error";
pub const FALLBACK_FAILURE_RESULT: &str = "fallback_failure_result";
pub const FALLBACK_ERROR_RESULT: &str = "fallback_error_result";

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// A unit of business logic producing a [`ServiceResult`].
///
/// Only [`Service::build`] is required. A service either overrides
/// [`Service::result`] or declares steps in [`Service::configure`], in which
/// case the default `result` runs them in order.
pub trait Service: Sized + Send + Sync + 'static {
    /// Name used in results, errors and logs. Defaults to the bare type name.
    fn name() -> &'static str {
        let full = type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Builds the service value from call arguments.
    ///
    /// # Errors
    ///
    /// Any error is reported to the caller as [`ServiceError::Unhandled`].
    fn build(arguments: &Arguments) -> anyhow::Result<Self>;

    /// Registers concerns, middlewares, steps and readers on the type config.
    ///
    /// # Errors
    ///
    /// Returns the first registration error; it is reported again by every
    /// commit attempt.
    fn configure(config: &Config<Self>) -> Result<(), ConfigError> {
        crate::middleware::pipeline::configure(config)
    }

    /// The instance computation.
    ///
    /// # Errors
    ///
    /// Errors that are not framework errors are turned into an error result
    /// by the rescue interceptor when it is installed.
    fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
        Ok(this.run_steps()?)
    }

    fn settings() -> Settings {
        Settings::default()
    }

    /// The type config, built and configured on first access.
    fn config() -> Arc<Config<Self>> {
        registry::config::<Self>()
    }

    /// Runs the static `result` pipeline for one call.
    ///
    /// # Errors
    ///
    /// Returns configuration errors, contract violations and unrescued errors.
    fn call(arguments: Arguments) -> Result<ServiceResult, ServiceError> {
        Class::<Self>::new()?.call(arguments)
    }
}
