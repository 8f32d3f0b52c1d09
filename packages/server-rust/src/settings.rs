use conduct_core::DEFAULT_PARENTS_LIMIT;
use serde::{Deserialize, Serialize};

/// Per-service-type settings read while the type's config is built.
///
/// Controls which optional interceptors the standard pipeline installs and the
/// bounds used when results are decorated or traversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of backtrace frames attached to a rescued error result.
    pub backtrace_limit: usize,
    /// Maximum number of parent hops walked when rendering a result chain.
    pub parents_limit: usize,
    /// Memoize the instance `result` so repeated calls return the same value.
    pub cache_results: bool,
    /// Log every instance `result` call through the tracing observer.
    pub trace_calls: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backtrace_limit: 10,
            parents_limit: DEFAULT_PARENTS_LIMIT,
            cache_results: true,
            trace_calls: false,
        }
    }
}
