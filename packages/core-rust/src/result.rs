//! JSend-style three-state service result.
//!
//! A [`ServiceResult`] is an immutable snapshot with status `success`,
//! `failure` or `error`, carrying data, a message and a code. Reading any of
//! those three attributes is only allowed after the status was inspected
//! through one of the predicates ([`ServiceResult::is_success`] and friends);
//! earlier reads fail with [`ResultError::StatusNotChecked`].
//!
//! Results are cheap to clone: clones share identity, including the checked
//! gate. [`ServiceResult::copy`] builds a new result instead.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Data, Value};

/// Default bound for [`ServiceResult::parents`] traversal.
pub const DEFAULT_PARENTS_LIMIT: usize = 1000;

/// Extra attribute set by the rescue interceptor: the rescued error's text.
pub const EXCEPTION_KEY: &str = "exception";
/// Extra attribute set by the rescue interceptor: bounded backtrace lines.
pub const BACKTRACE_KEY: &str = "backtrace";
/// Extra attribute marking results produced by a fallback.
pub const FALLBACK_RESULT_KEY: &str = "fallback_result";
/// Extra attribute marking results returned by a stub.
pub const STUBBED_RESULT_KEY: &str = "stubbed_result";

// ---------------------------------------------------------------------------
// Status, Message, Code
// ---------------------------------------------------------------------------

/// Terminal state of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Error,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Error => "error",
        }
    }

    /// Spelling used on the wire by the JSend convention.
    #[must_use]
    pub fn jsend(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "fail",
            Status::Error => "error",
        }
    }

    /// Code used when a constructor is not given one explicitly.
    #[must_use]
    pub fn default_code(self) -> Code {
        match self {
            Status::Success => Code::new("default_success"),
            Status::Failure => Code::new("default_failure"),
            Status::Error => Code::new("default_error"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable result message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message(String);

impl Message {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Machine-readable result code (a symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code(String);

impl Code {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// ServiceId
// ---------------------------------------------------------------------------

/// Identity of the service instance that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    /// Name of the service type.
    pub service: &'static str,
    /// Unique id of the instance.
    pub instance: Uuid,
}

impl ServiceId {
    /// Fresh id for a new instance of `service`.
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            instance: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.service, self.instance.simple())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Contract violations on result access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    #[error("status of the result from `{service}` is not checked before reading `{attribute}`")]
    StatusNotChecked {
        service: &'static str,
        attribute: &'static str,
    },
}

// ---------------------------------------------------------------------------
// ServiceResult
// ---------------------------------------------------------------------------

/// Raw parts of a result, used by constructors and [`ServiceResult::copy`].
#[derive(Debug, Clone)]
pub struct ResultParts {
    pub status: Status,
    pub data: Data,
    pub message: Message,
    /// Falls back to [`Status::default_code`] when `None`.
    pub code: Option<Code>,
    pub service: ServiceId,
    pub parent: Option<ServiceResult>,
    pub extra: Data,
}

impl ResultParts {
    #[must_use]
    pub fn new(status: Status, service: ServiceId) -> Self {
        Self {
            status,
            data: Data::new(),
            message: Message::default(),
            code: None,
            service,
            parent: None,
            extra: Data::new(),
        }
    }
}

/// Attribute overrides applied by [`ServiceResult::copy`].
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    service: Option<ServiceId>,
    parent: Option<Option<ServiceResult>>,
    extra: Data,
}

impl Overrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes the copy to another service.
    #[must_use]
    pub fn service(mut self, service: ServiceId) -> Self {
        self.service = Some(service);
        self
    }

    /// Replaces the parent link.
    #[must_use]
    pub fn parent(mut self, parent: Option<ServiceResult>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Merges an extra attribute.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

struct Inner {
    status: Status,
    data: Data,
    message: Message,
    code: Code,
    service: ServiceId,
    parent: Option<ServiceResult>,
    extra: Data,
    checked: AtomicBool,
}

/// Immutable three-state result with a checked-access gate.
#[derive(Clone)]
pub struct ServiceResult {
    inner: Arc<Inner>,
}

impl ServiceResult {
    #[must_use]
    pub fn from_parts(parts: ResultParts) -> Self {
        let code = parts.code.unwrap_or_else(|| parts.status.default_code());
        Self {
            inner: Arc::new(Inner {
                status: parts.status,
                data: parts.data,
                message: parts.message,
                code,
                service: parts.service,
                parent: parts.parent,
                extra: parts.extra,
                checked: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn success(service: ServiceId, data: Data) -> Self {
        Self::from_parts(ResultParts {
            data,
            ..ResultParts::new(Status::Success, service)
        })
    }

    #[must_use]
    pub fn failure(service: ServiceId, data: Data, message: impl Into<Message>) -> Self {
        Self::from_parts(ResultParts {
            data,
            message: message.into(),
            ..ResultParts::new(Status::Failure, service)
        })
    }

    #[must_use]
    pub fn error(service: ServiceId, message: impl Into<Message>, code: impl Into<Code>) -> Self {
        Self::from_parts(ResultParts {
            message: message.into(),
            code: Some(code.into()),
            ..ResultParts::new(Status::Error, service)
        })
    }

    /// The status. Reading it does not open the gate; use the predicates.
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.status
    }

    fn check(&self, status: Status) -> bool {
        self.inner.checked.store(true, Ordering::Release);
        self.inner.status == status
    }

    pub fn is_success(&self) -> bool {
        self.check(Status::Success)
    }

    pub fn is_failure(&self) -> bool {
        self.check(Status::Failure)
    }

    pub fn is_error(&self) -> bool {
        self.check(Status::Error)
    }

    pub fn is_not_success(&self) -> bool {
        !self.is_success()
    }

    pub fn is_not_failure(&self) -> bool {
        !self.is_failure()
    }

    pub fn is_not_error(&self) -> bool {
        !self.is_error()
    }

    /// Whether a status predicate has been evaluated on this result.
    #[must_use]
    pub fn is_checked(&self) -> bool {
        self.inner.checked.load(Ordering::Acquire)
    }

    fn gate(&self, attribute: &'static str) -> Result<(), ResultError> {
        if self.is_checked() {
            Ok(())
        } else {
            Err(ResultError::StatusNotChecked {
                service: self.inner.service.service,
                attribute,
            })
        }
    }

    /// # Errors
    ///
    /// Returns `ResultError::StatusNotChecked` if no predicate was evaluated yet.
    pub fn data(&self) -> Result<&Data, ResultError> {
        self.gate("data")?;
        Ok(&self.inner.data)
    }

    /// # Errors
    ///
    /// Returns `ResultError::StatusNotChecked` if no predicate was evaluated yet.
    pub fn message(&self) -> Result<&Message, ResultError> {
        self.gate("message")?;
        Ok(&self.inner.message)
    }

    /// # Errors
    ///
    /// Returns `ResultError::StatusNotChecked` if no predicate was evaluated yet.
    pub fn code(&self) -> Result<&Code, ResultError> {
        self.gate("code")?;
        Ok(&self.inner.code)
    }

    /// Data without the gate. Reserved for diagnostics (logging, inspection).
    #[must_use]
    pub fn data_unchecked(&self) -> &Data {
        &self.inner.data
    }

    #[must_use]
    pub fn message_unchecked(&self) -> &Message {
        &self.inner.message
    }

    #[must_use]
    pub fn service(&self) -> &ServiceId {
        &self.inner.service
    }

    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.inner.extra.get(key)
    }

    #[must_use]
    pub fn extras(&self) -> &Data {
        &self.inner.extra
    }

    #[must_use]
    pub fn is_fallback_result(&self) -> bool {
        self.extra(FALLBACK_RESULT_KEY) == Some(&Value::Bool(true))
    }

    #[must_use]
    pub fn is_stubbed_result(&self) -> bool {
        self.extra(STUBBED_RESULT_KEY) == Some(&Value::Bool(true))
    }

    /// Whether `self` and `other` are the same result (not merely equal).
    #[must_use]
    pub fn ptr_eq(&self, other: &ServiceResult) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// New result with the same status, data, message and code, plus overrides.
    ///
    /// The copy starts with a closed gate.
    #[must_use]
    pub fn copy(&self, overrides: Overrides) -> ServiceResult {
        let mut extra = self.inner.extra.clone();
        extra.extend(overrides.extra);
        Self::from_parts(ResultParts {
            status: self.inner.status,
            data: self.inner.data.clone(),
            message: self.inner.message.clone(),
            code: Some(self.inner.code.clone()),
            service: overrides
                .service
                .unwrap_or_else(|| self.inner.service.clone()),
            parent: overrides
                .parent
                .unwrap_or_else(|| self.inner.parent.clone()),
            extra,
        })
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ServiceResult> {
        self.inner.parent.as_ref()
    }

    /// Walks the parent chain, yielding at most `limit` results in total.
    /// With `include_self` this result is the first of them.
    ///
    /// Traversal stops without an error when the bound is reached.
    #[must_use]
    pub fn parents(&self, include_self: bool, limit: usize) -> Parents<'_> {
        Parents {
            next: if include_self {
                Some(self)
            } else {
                self.parent()
            },
            yielded: 0,
            limit,
        }
    }

    /// Renders the JSend object: `status`, `data`, `message`, `code`.
    ///
    /// Rendering evaluates the status, so it opens the gate.
    #[must_use]
    pub fn to_jsend(&self) -> serde_json::Value {
        self.inner.checked.store(true, Ordering::Release);
        let data = Value::Map(self.inner.data.clone()).to_json();
        serde_json::json!({
            "status": self.inner.status.jsend(),
            "data": data,
            "message": self.inner.message.as_str(),
            "code": self.inner.code.as_str(),
        })
    }
}

impl fmt::Debug for ServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceResult")
            .field("status", &self.inner.status)
            .field("service", &self.inner.service)
            .field("checked", &self.is_checked())
            .field("has_parent", &self.inner.parent.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// Lazy, bounded traversal over a result's parent chain.
pub struct Parents<'a> {
    next: Option<&'a ServiceResult>,
    yielded: usize,
    limit: usize,
}

impl<'a> Iterator for Parents<'a> {
    type Item = &'a ServiceResult;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if self.yielded >= self.limit {
            tracing::warn!(
                limit = self.limit,
                service = %current.service(),
                "parent traversal stopped at its limit"
            );
            self.next = None;
            return None;
        }
        self.yielded += 1;
        self.next = current.parent();
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::data;

    fn id() -> ServiceId {
        ServiceId::new("TestService")
    }

    #[test]
    fn reading_data_before_check_fails() {
        let result = ServiceResult::success(id(), data! { "x" => 1 });
        assert_eq!(
            result.data().unwrap_err(),
            ResultError::StatusNotChecked {
                service: "TestService",
                attribute: "data"
            }
        );
        assert!(result.message().is_err());
        assert!(result.code().is_err());
    }

    #[test]
    fn reading_data_after_check_returns_constructor_value() {
        let result = ServiceResult::success(id(), data! { "x" => 1 });
        assert!(result.is_success());
        assert_eq!(result.data().unwrap(), &data! { "x" => 1 });
        assert_eq!(result.code().unwrap().as_str(), "default_success");
    }

    #[test]
    fn negated_predicates_also_open_the_gate() {
        let result = ServiceResult::error(id(), "boom", "crashed");
        assert!(result.is_not_success());
        assert_eq!(result.message().unwrap().as_str(), "boom");
        assert_eq!(result.code().unwrap().as_str(), "crashed");
    }

    #[test]
    fn clones_share_the_gate() {
        let result = ServiceResult::failure(id(), Data::new(), "nope");
        let clone = result.clone();
        assert!(clone.is_failure());
        assert!(result.message().is_ok());
        assert!(result.ptr_eq(&clone));
    }

    #[test]
    fn copy_keeps_attributes_and_merges_extras() {
        let original = ServiceResult::failure(id(), data! { "f" => "bad" }, "invalid");
        let copy = original.copy(Overrides::new().extra(FALLBACK_RESULT_KEY, true));

        assert!(!original.ptr_eq(&copy));
        assert!(!copy.is_checked());
        assert!(copy.is_failure());
        assert_eq!(copy.data().unwrap(), &data! { "f" => "bad" });
        assert_eq!(copy.message().unwrap().as_str(), "invalid");
        assert!(copy.is_fallback_result());
        assert!(!original.is_fallback_result());
    }

    #[test]
    fn copy_can_reattribute_and_link_parent() {
        let child = ServiceResult::success(id(), Data::new());
        let organizer = ServiceId::new("Organizer");
        let copy = child.copy(
            Overrides::new()
                .service(organizer.clone())
                .parent(Some(child.clone())),
        );
        assert_eq!(copy.service(), &organizer);
        assert!(copy.parent().unwrap().ptr_eq(&child));
    }

    fn chain(depth: usize) -> ServiceResult {
        let mut current = ServiceResult::success(id(), Data::new());
        for _ in 0..depth {
            current = current.copy(Overrides::new().parent(Some(current.clone())));
        }
        current
    }

    #[test]
    fn parents_walks_the_chain() {
        let result = chain(3);
        assert_eq!(result.parents(false, DEFAULT_PARENTS_LIMIT).count(), 3);
        assert_eq!(result.parents(true, DEFAULT_PARENTS_LIMIT).count(), 4);
        assert!(result.parents(true, 10).next().unwrap().ptr_eq(&result));
    }

    #[test]
    fn parents_stops_silently_at_limit() {
        let result = chain(20);
        assert_eq!(result.parents(false, 5).count(), 5);
        assert_eq!(result.parents(true, 5).count(), 5);
        assert!(result.parents(true, 5).next().unwrap().ptr_eq(&result));
        assert_eq!(result.parents(false, 0).count(), 0);
        assert_eq!(result.parents(true, 0).count(), 0);
    }

    #[test]
    fn jsend_rendering() {
        let result = ServiceResult::failure(id(), data! { "name" => "is required" }, "invalid");
        assert_eq!(
            result.to_jsend(),
            serde_json::json!({
                "status": "fail",
                "data": { "name": "is required" },
                "message": "invalid",
                "code": "default_failure",
            })
        );
        assert!(result.is_checked());
    }

    proptest! {
        #[test]
        fn parents_never_exceed_the_limit(depth in 0usize..40, limit in 0usize..40) {
            let result = chain(depth);
            prop_assert_eq!(result.parents(false, limit).count(), depth.min(limit));
            prop_assert_eq!(result.parents(true, limit).count(), (depth + 1).min(limit));
        }
    }
}
