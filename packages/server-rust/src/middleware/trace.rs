use conduct_core::ServiceResult;

use crate::dispatch::{Env, Observer};
use crate::error::ServiceError;
use crate::service::{Instance, Service};

/// Logs every call of an instance method and its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracesCalls;

impl<S: Service> Observer<Instance<S>, ServiceResult> for TracesCalls {
    fn before(&self, env: &Env<'_, Instance<S>>) {
        tracing::debug!(service = %env.target.id(), method = %env.method, "call started");
    }

    fn after(&self, env: &Env<'_, Instance<S>>, outcome: &Result<ServiceResult, ServiceError>) {
        match outcome {
            Ok(result) => tracing::info!(
                service = %env.target.id(),
                method = %env.method,
                status = %result.status(),
                "call finished"
            ),
            Err(err) => tracing::warn!(
                service = %env.target.id(),
                method = %env.method,
                error = %err,
                "call failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use conduct_core::{data, Arguments, Value};

    use super::*;
    use crate::dispatch::MethodKey;
    use crate::service::RESULT;
    use crate::settings::Settings;

    struct Traced;

    impl Service for Traced {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn settings() -> Settings {
            Settings {
                trace_calls: true,
                ..Settings::default()
            }
        }

        fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
            Ok(this.success(data! { "traced" => true })?)
        }
    }

    #[test]
    fn tracing_is_innermost_and_transparent() {
        let ids = Traced::config().middleware_ids(MethodKey::instance(RESULT));
        assert!(ids.last().is_some_and(|id| id.ends_with("TracesCalls")));

        let result = Traced::call(Arguments::new()).unwrap();
        assert!(result.is_success());
        assert_eq!(result.data().unwrap().get("traced"), Some(&Value::from(true)));
    }
}
