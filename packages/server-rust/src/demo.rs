//! Greeting services used by the `conduct-demo` binary.
//!
//! [`Greet`] organizes three steps: [`NormalizeName`] (with a failure
//! fallback), [`BuildGreeting`], and the organizer's own `punctuate` method.

use conduct_core::{data, Arguments, ServiceResult, Value};

use crate::dispatch::Middleware;
use crate::error::ConfigError;
use crate::middleware::{pipeline, RequiredArguments, RescuesUnhandledErrors, ValidatesArguments};
use crate::service::{Config, Instance, Service, RESULT};
use crate::step::{FallbackKind, Method, Step};

/// Fallback name used when normalization fails.
pub const ANONYMOUS: &str = "stranger";

fn text(arguments: &Arguments, key: &str) -> String {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// NormalizeName
// ---------------------------------------------------------------------------

/// Trims and capitalizes a name. Names with digits are a failure.
pub struct NormalizeName {
    raw: String,
}

impl Service for NormalizeName {
    fn build(arguments: &Arguments) -> anyhow::Result<Self> {
        Ok(Self {
            raw: text(arguments, "name"),
        })
    }

    fn configure(config: &Config<Self>) -> Result<(), ConfigError> {
        pipeline::configure(config)?;
        config.attributes(["name"])?;
        config.middlewares(RESULT, |stack| {
            stack.insert_after(
                std::any::type_name::<RescuesUnhandledErrors>(),
                Middleware::new(ValidatesArguments::new(RequiredArguments::new(["name"]))),
            )?;
            Ok(())
        })?;
        config.fallback(FallbackKind::Failure, |this| {
            Ok(this.success(data! { "name" => ANONYMOUS })?)
        })
    }

    fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
        if this.raw.chars().any(|c| c.is_ascii_digit()) {
            return Ok(this.failure(
                data! { "name" => "must not contain digits" },
                "name must not contain digits",
            )?);
        }
        let trimmed = this.raw.trim();
        let mut chars = trimmed.chars();
        let name = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect(),
            None => String::new(),
        };
        Ok(this.success(data! { "name" => name })?)
    }
}

// ---------------------------------------------------------------------------
// BuildGreeting
// ---------------------------------------------------------------------------

/// Joins a greeting word and a name.
pub struct BuildGreeting {
    greeting: String,
    name: String,
}

impl Service for BuildGreeting {
    fn build(arguments: &Arguments) -> anyhow::Result<Self> {
        Ok(Self {
            greeting: text(arguments, "greeting"),
            name: text(arguments, "name"),
        })
    }

    fn result(this: &Instance<Self>) -> anyhow::Result<ServiceResult> {
        let greeting = format!("{}, {}", this.greeting, this.name);
        Ok(this.success(data! { "greeting" => greeting })?)
    }
}

// ---------------------------------------------------------------------------
// Greet
// ---------------------------------------------------------------------------

/// Organizer: normalize, greet, punctuate.
pub struct Greet;

impl Service for Greet {
    fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn configure(config: &Config<Self>) -> Result<(), ConfigError> {
        pipeline::configure(config)?;
        config.attributes(["name", "excited"])?;
        config.method_step("punctuate", |this, arguments| {
            let mark = if arguments.get("excited").and_then(Value::as_bool) == Some(true) {
                "!"
            } else {
                "."
            };
            let sentence = format!("{}{mark}", text(arguments, "greeting"));
            Ok(this.success(data! { "text" => sentence })?)
        })?;

        config.step(
            Step::service::<NormalizeName>()
                .input("name")
                .output(Method::reassign("name"))
                .fallback(FallbackKind::Failure),
        )?;
        config.step(
            Step::service::<BuildGreeting>()
                .input("name")
                .input(Method::value("greeting", "Hello"))
                .output("greeting"),
        )?;
        config.step(
            Step::method("punctuate")
                .input("greeting")
                .input("excited")
                .output(("text", "message")),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use conduct_core::Status;

    use super::*;

    #[test]
    fn greets_a_normalized_name() {
        let arguments = Arguments::new().kwarg("name", "  ada ").kwarg("excited", true);
        let result = Greet::call(arguments).unwrap();

        assert!(result.is_success());
        assert_eq!(
            result.data().unwrap().get("text"),
            Some(&Value::from("Hello, Ada!"))
        );
        let parent = result.parent().unwrap();
        assert_eq!(parent.service().service, "Greet");
    }

    #[test]
    fn falls_back_to_anonymous_name() {
        let instance = Instance::<Greet>::new(Arguments::new().kwarg("name", "r2d2")).unwrap();
        let result = instance.result().unwrap();

        assert!(result.is_success());
        assert_eq!(instance.read("name").unwrap(), Value::from(ANONYMOUS));
        let first = instance.step_result(0).unwrap();
        assert!(first.is_fallback_result());
        assert_eq!(
            result.data().unwrap().get("text"),
            Some(&Value::from("Hello, stranger."))
        );
    }

    #[test]
    fn blank_name_fails_validation() {
        let result = NormalizeName::call(Arguments::new().kwarg("name", "  ")).unwrap();

        assert!(result.is_failure());
        assert_eq!(result.message().unwrap().as_str(), "name can't be blank");
        assert_eq!(result.status(), Status::Failure);
    }

    #[test]
    fn validation_failure_is_returned_again() {
        let arguments = Arguments::new().kwarg("name", "  ");
        let instance = Instance::<NormalizeName>::new(arguments).unwrap();

        let first = instance.result().unwrap();
        let second = instance.result().unwrap();
        assert!(second.is_failure());
        assert!(first.ptr_eq(&second));
    }
}
