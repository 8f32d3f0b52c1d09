//! `Conduct` core: JSend results, call arguments, runtime values and casting.

pub mod arguments;
pub mod cast;
pub mod result;
pub mod types;

pub use arguments::{Arguments, Callback};
pub use cast::{Cast, CastError};
pub use result::{
    Code, Message, Overrides, Parents, ResultError, ResultParts, ServiceId, ServiceResult, Status,
    DEFAULT_PARENTS_LIMIT,
};
pub use types::{Data, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
