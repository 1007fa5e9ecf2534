//! Configuration for session tracing.

/// Where formatted trace lines go as they are recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceOutput {
    /// Nowhere; records are only kept in the buffer.
    #[default]
    None,
    /// Written to stderr.
    Stderr,
    /// Emitted as `tracing` events under the `brindle::trace` target.
    Log,
}

/// Configuration for a [`Tracer`](crate::Tracer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracerConfig {
    /// Whether events are recorded at all.
    pub enabled: bool,
    /// Maximum records kept; older ones are evicted.
    pub buffer_size: usize,
    /// Live output destination.
    pub output: TraceOutput,
    /// Event types to keep (see [`event_type`](crate::event_type)). Empty keeps all.
    pub event_filter: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_size: 10_000,
            output: TraceOutput::None,
            event_filter: Vec::new(),
        }
    }
}

impl TracerConfig {
    /// Creates a disabled configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable tracing.
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Builder method to set buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builder method to set the live output.
    #[must_use]
    pub fn with_output(mut self, output: TraceOutput) -> Self {
        self.output = output;
        self
    }

    /// Builder method to keep only the named event types.
    #[must_use]
    pub fn filter_events<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_filter = types.into_iter().map(Into::into).collect();
        self
    }
}
