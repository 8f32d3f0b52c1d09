//! Step orchestration.
//!
//! An organizer declares [`Step`]s in its `configure`. Each step names a
//! target (another service or an organizer method), the organizer names it
//! reads as inputs and the result data keys it writes back as outputs.
//! Outputs become readable on the organizer only once their step has run,
//! which keeps steps strictly sequential without a scheduler.

pub mod collection;
pub mod definition;
pub mod method;

pub use collection::StepCollection;
pub use definition::{FallbackKind, MethodStep, ServiceStep, Step, StepRunner};
pub use method::{Caller, Method, Proc};
