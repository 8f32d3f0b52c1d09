use conduct_core::{ServiceResult, Status};

use crate::dispatch::{Chain, Interceptor};
use crate::error::ServiceError;
use crate::service::{Instance, Service, RESULT};

/// Rejects a second result from one instance.
///
/// On `result` it fails when `result` already completed once. On the result
/// constructors it fails when a constructor already ran, so a body calling
/// `success` twice never hands the first result to its caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectsDoubleResult;

impl<S: Service> Interceptor<Instance<S>, ServiceResult> for DetectsDoubleResult {
    fn intercept(
        &self,
        chain: Chain<'_, Instance<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        let instance = chain.target();
        let is_result = chain.method().name == RESULT;

        let result = chain.proceed()?;
        let second = result.status();
        let first: Option<Status> = if is_result {
            instance.returned().lock().replace(second)
        } else {
            let mut constructed = instance.constructed().lock();
            let first = constructed.first().copied();
            constructed.push(second);
            first
        };

        match first {
            Some(first) => Err(ServiceError::DoubleResult {
                service: S::name(),
                first,
                second,
            }),
            None => Ok(result),
        }
    }
}
