//! Built-in interceptors and the standard pipeline.

pub mod cache;
pub mod double_result;
pub mod pipeline;
pub mod rescue;
pub mod stub;
pub mod trace;
pub mod validation;

pub use cache::CachesReturnValue;
pub use double_result::DetectsDoubleResult;
pub use rescue::{RescuesUnhandledErrors, UNHANDLED_ERROR_CODE};
pub use stub::{Stub, StubbedResults};
pub use trace::TracesCalls;
pub use validation::{ArgumentValidator, Errors, FnValidator, RequiredArguments, ValidatesArguments};
