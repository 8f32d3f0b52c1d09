//! Argument validation in front of the instance `result`.

use std::collections::BTreeMap;

use conduct_core::{Arguments, Data, ServiceResult, Value};

use crate::dispatch::{Chain, Interceptor};
use crate::error::ServiceError;
use crate::service::{Instance, Service};

/// Field name -> first error message. Empty when the arguments are valid.
pub type Errors = BTreeMap<String, String>;

/// Checks call arguments before the service body runs.
pub trait ArgumentValidator: Send + Sync + 'static {
    fn validate(&self, arguments: &Arguments) -> Errors;
}

/// Requires keyword arguments to be present, non-null and non-blank.
#[derive(Debug, Clone, Default)]
pub struct RequiredArguments {
    fields: Vec<String>,
}

impl RequiredArguments {
    #[must_use]
    pub fn new<I, N>(fields: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl ArgumentValidator for RequiredArguments {
    fn validate(&self, arguments: &Arguments) -> Errors {
        self.fields
            .iter()
            .filter(|field| match arguments.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(text)) => text.trim().is_empty(),
                Some(_) => false,
            })
            .map(|field| (field.clone(), "can't be blank".to_string()))
            .collect()
    }
}

/// Closure-backed validator.
pub struct FnValidator<F>(pub F);

impl<F> ArgumentValidator for FnValidator<F>
where
    F: Fn(&Arguments) -> Errors + Send + Sync + 'static,
{
    fn validate(&self, arguments: &Arguments) -> Errors {
        (self.0)(arguments)
    }
}

/// Returns a failure result instead of running the body when the validator
/// reports errors.
///
/// The failure data maps each field to its message; the failure message is
/// `"<field> <message>"` for the first field.
pub struct ValidatesArguments<V> {
    validator: V,
}

impl<V: ArgumentValidator> ValidatesArguments<V> {
    #[must_use]
    pub fn new(validator: V) -> Self {
        Self { validator }
    }
}

impl<S: Service, V: ArgumentValidator> Interceptor<Instance<S>, ServiceResult>
    for ValidatesArguments<V>
{
    fn intercept(
        &self,
        chain: Chain<'_, Instance<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        let errors = self.validator.validate(chain.arguments());
        let Some((field, message)) = errors.iter().next() else {
            return chain.proceed();
        };

        let instance = chain.target();
        tracing::debug!(service = %instance.id(), ?errors, "arguments failed validation");
        let summary = format!("{field} {message}");
        let data: Data = errors
            .into_iter()
            .map(|(field, message)| (field, Value::from(message)))
            .collect();
        instance.failure(data, summary)
    }
}
