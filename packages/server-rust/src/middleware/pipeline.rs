//! Standard configuration applied by [`Service::configure`].

use conduct_core::ServiceResult;

use super::{CachesReturnValue, DetectsDoubleResult, RescuesUnhandledErrors, TracesCalls};
use crate::dispatch::Middleware;
use crate::error::ConfigError;
use crate::service::{
    Config, ConcernEntry, Fallbacks, Instance, Results, Service, Steps, Stubs, ERROR, FAILURE,
    RESULT, SUCCESS,
};

/// Installs the standard concerns and middlewares, driven by the type settings.
///
/// Concerns, in order: results, fallbacks, steps, stubs. The instance
/// `result` stack, outermost first: cache (optional), rescue, double-result
/// detection, tracing (optional). Each constructor gets double-result
/// detection.
///
/// The cache wraps the rescue interceptor so a rescued error, or a failure
/// returned by an interceptor inserted after the rescue, is memoized like a
/// result the body returned.
///
/// # Errors
///
/// Returns `Committed` when the config is already committed.
pub fn configure<S: Service>(config: &Config<S>) -> Result<(), ConfigError> {
    config.concerns(|stack| {
        stack
            .push(ConcernEntry::new(Results))?
            .push(ConcernEntry::new(Fallbacks))?
            .push(ConcernEntry::new(Steps))?
            .push(ConcernEntry::new(Stubs))?;
        Ok(())
    })?;

    let settings = config.settings().clone();
    config.middlewares(RESULT, |stack| {
        if settings.cache_results {
            stack.push(Middleware::new(CachesReturnValue))?;
        }
        stack.push(Middleware::new(RescuesUnhandledErrors))?;
        stack.push(Middleware::new(DetectsDoubleResult))?;
        if settings.trace_calls {
            stack.push(Middleware::observe(TracesCalls))?;
        }
        Ok(())
    })?;

    for method in [SUCCESS, FAILURE, ERROR] {
        config.middlewares(method, |stack| {
            stack.push(Middleware::<Instance<S>, ServiceResult>::new(DetectsDoubleResult))?;
            Ok(())
        })?;
    }
    Ok(())
}
