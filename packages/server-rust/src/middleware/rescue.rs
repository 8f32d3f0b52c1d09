//! Rescue interceptor: turns unhandled errors into error results.

use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::panic::{self, AssertUnwindSafe};

use conduct_core::result::{BACKTRACE_KEY, EXCEPTION_KEY};
use conduct_core::{Code, Message, ResultParts, ServiceResult, Status, Value};

use crate::dispatch::{Chain, Interceptor};
use crate::error::ServiceError;
use crate::service::{Instance, Service};

/// Code of results produced by [`RescuesUnhandledErrors`].
pub const UNHANDLED_ERROR_CODE: &str = "unhandled_error";

/// Outermost interceptor on the instance `result` that reaches the body.
/// Only the result cache sits in front of it.
///
/// Only [`ServiceError::Unhandled`] errors and panics become data; framework
/// contract violations keep propagating.
#[derive(Debug, Clone, Copy, Default)]
pub struct RescuesUnhandledErrors;

impl<S: Service> Interceptor<Instance<S>, ServiceResult> for RescuesUnhandledErrors {
    fn intercept(
        &self,
        chain: Chain<'_, Instance<S>, ServiceResult>,
    ) -> Result<ServiceResult, ServiceError> {
        let instance = chain.target();
        match panic::catch_unwind(AssertUnwindSafe(|| chain.proceed())) {
            Ok(Err(ServiceError::Unhandled(err))) => {
                let limit = instance.config().settings().backtrace_limit;
                Ok(rescue(instance, &err, backtrace_frames(&err, limit)))
            }
            Ok(other) => other,
            // The unwind has already left the panic site, so no backtrace
            // captured here would point at it.
            Err(payload) => {
                let err = anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()));
                Ok(rescue(instance, &err, Vec::new()))
            }
        }
    }
}

fn rescue<S: Service>(
    instance: &Instance<S>,
    err: &anyhow::Error,
    backtrace: Vec<Value>,
) -> ServiceResult {
    let message = format!("{err:#}");
    tracing::error!(service = %instance.id(), error = %message, "rescued unhandled error");

    let mut parts = ResultParts::new(Status::Error, instance.id().clone());
    parts.message = Message::new(message);
    parts.code = Some(Code::new(UNHANDLED_ERROR_CODE));
    parts
        .extra
        .insert(EXCEPTION_KEY.to_string(), Value::from(err.to_string()));
    parts
        .extra
        .insert(BACKTRACE_KEY.to_string(), Value::Array(backtrace));
    ServiceResult::from_parts(parts)
}

/// Captured backtrace of `err` as at most `limit` frames. Empty when
/// backtraces are disabled (`RUST_BACKTRACE` unset).
fn backtrace_frames(err: &anyhow::Error, limit: usize) -> Vec<Value> {
    let backtrace = err.backtrace();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    frames(&backtrace.to_string(), limit)
}

/// Folds a rendered backtrace into one entry per frame: the `N: symbol` line
/// followed by its `at file:line` lines.
fn frames(rendered: &str, limit: usize) -> Vec<Value> {
    let mut frames: Vec<String> = Vec::new();
    for line in rendered.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match frame_symbol(line) {
            Some(symbol) => {
                if frames.len() == limit {
                    break;
                }
                frames.push(symbol.to_string());
            }
            None => {
                if let Some(frame) = frames.last_mut() {
                    frame.push(' ');
                    frame.push_str(line);
                }
            }
        }
    }
    frames.into_iter().map(Value::from).collect()
}

fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.split_once(": ")?;
    (!index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())).then_some(symbol)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERED: &str = "   0: app::charge
             at ./src/charge.rs:10:5
   1: app::checkout
             at ./src/checkout.rs:22:9
   2: core::ops::function::FnOnce::call_once
             at /rustc/library/core/src/ops/function.rs:250:5
   3: std::rt::lang_start";

    #[test]
    fn backtrace_is_capped_by_frames() {
        let frames = frames(RENDERED, 2);

        assert_eq!(
            frames,
            vec![
                Value::from("app::charge at ./src/charge.rs:10:5"),
                Value::from("app::checkout at ./src/checkout.rs:22:9"),
            ]
        );
    }

    #[test]
    fn frames_without_location_are_kept() {
        let frames = frames(RENDERED, 10);

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3], Value::from("std::rt::lang_start"));
        assert!(super::frames(RENDERED, 0).is_empty());
    }

    #[test]
    fn panic_payloads_are_described() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&7_u8), "non-string panic payload");
    }
}
