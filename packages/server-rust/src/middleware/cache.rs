use conduct_core::ServiceResult;

use crate::dispatch::{Chain, Interceptor};
use crate::error::ServiceError;
use crate::service::{Instance, Service};

/// Memoizes an instance method's first successful return value.
///
/// Later calls on the same instance return the memoized result without
/// running the rest of the chain. Errors are not memoized.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachesReturnValue;

impl<S: Service> Interceptor<Instance<S>, ServiceResult> for CachesReturnValue {
    fn intercept(
        &self,
        chain: Chain<'_, Instance<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        let instance = chain.target();
        let method = chain.method().name;

        if let Some(hit) = instance.memo().lock().get(method).cloned() {
            tracing::trace!(service = %instance.id(), method, "returning memoized result");
            return Ok(hit);
        }

        let result = chain.proceed()?;
        Ok(instance
            .memo()
            .lock()
            .entry(method)
            .or_insert(result)
            .clone())
    }
}
