//! Method-interception engine.
//!
//! A [`MethodContainer`] owns an ordered [`Stack`] of [`Middleware`] for one
//! method. On dispatch the frozen stack is walked by a [`Chain`]: each
//! interceptor runs in registration order and decides whether to call
//! [`Chain::proceed`], so the first registered interceptor is the outermost.

pub mod chain;
pub mod container;
pub mod middleware;
pub mod observer;
pub mod stack;

pub use chain::{Chain, Env, Terminal};
pub use container::{MethodContainer, MethodKey, Scope};
pub use middleware::{FnInterceptor, Interceptor, Middleware};
pub use observer::{CompositeObserver, Observe, Observer};
pub use stack::{Anchor, Stack, StackError, Unit};
