//! Session configuration.

use brindle_language::eval::DEFAULT_MAX_CALL_DEPTH;

/// Limits applied to a session's firing loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum firings in one call to `fire_all_rules`/`fire_until`.
    /// `None` means unbounded.
    pub max_activations: Option<u32>,
    /// Maximum nesting of local function calls.
    pub max_call_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_activations: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the firing kill switch.
    #[must_use]
    pub fn with_max_activations(mut self, limit: u32) -> Self {
        self.max_activations = Some(limit);
        self
    }

    /// Sets the call depth limit.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
