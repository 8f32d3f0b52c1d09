//! Canned results for the static `result`, used in tests.

use conduct_core::result::STUBBED_RESULT_KEY;
use conduct_core::{Arguments, Code, Data, Message, ResultParts, ServiceId, ServiceResult, Status};

use crate::dispatch::{Chain, Interceptor};
use crate::error::ServiceError;
use crate::service::{Class, Service};

/// A canned result, optionally restricted to matching arguments.
#[derive(Debug, Clone)]
pub struct Stub {
    arguments: Option<Arguments>,
    status: Status,
    data: Data,
    message: Message,
    code: Option<Code>,
}

impl Stub {
    #[must_use]
    pub fn success(data: Data) -> Self {
        Self::new(Status::Success, data, Message::default())
    }

    #[must_use]
    pub fn failure(data: Data, message: impl Into<Message>) -> Self {
        Self::new(Status::Failure, data, message.into())
    }

    #[must_use]
    pub fn error(message: impl Into<Message>) -> Self {
        Self::new(Status::Error, Data::new(), message.into())
    }

    fn new(status: Status, data: Data, message: Message) -> Self {
        Self {
            arguments: None,
            status,
            data,
            message,
            code: None,
        }
    }

    /// Only answers calls whose arguments match.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = Some(arguments);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<Code>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub(crate) fn is_catch_all(&self) -> bool {
        self.arguments.is_none()
    }

    pub(crate) fn matches_exactly(&self, arguments: &Arguments) -> bool {
        self.arguments
            .as_ref()
            .is_some_and(|expected| expected.matches(arguments))
    }

    fn to_result(&self, service: &'static str) -> ServiceResult {
        let mut parts = ResultParts::new(self.status, ServiceId::new(service));
        parts.data = self.data.clone();
        parts.message = self.message.clone();
        parts.code = self.code.clone();
        parts.extra.insert(STUBBED_RESULT_KEY.to_string(), true.into());
        ServiceResult::from_parts(parts)
    }
}

/// First interceptor on the static `result` once the stubs concern is
/// included. Short-circuits with a matching stub.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubbedResults;

impl<S: Service> Interceptor<Class<S>, ServiceResult> for StubbedResults {
    fn intercept(
        &self,
        chain: Chain<'_, Class<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        match chain.target().config().find_stub(chain.arguments()) {
            Some(stub) => {
                tracing::debug!(service = S::name(), "returning stubbed result");
                Ok(stub.to_result(S::name()))
            }
            None => chain.proceed(),
        }
    }
}
