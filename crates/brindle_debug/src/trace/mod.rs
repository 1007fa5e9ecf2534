//! Tracing of session execution.
//!
//! A [`Tracer`] is a [`SessionListener`]: attach it to a session and every
//! fact change, activation, and firing is recorded into a [`TraceBuffer`].
//! Nothing is recorded while it is disabled. Sessions own their listeners, so
//! to read the trace afterwards attach a [`SharedTracer`] and keep a clone.
//!
//! ```text
//! let tracer = SharedTracer::new(TracerConfig::new().enabled());
//! session.add_listener(Box::new(tracer.clone()));
//! session.fire_all_rules()?;
//! println!("{}", tracer.with(|t| t.format_recent(20)));
//! ```

pub mod buffer;
pub mod format;
pub mod record;

pub use buffer::{TraceBuffer, TraceBufferStats};
pub use format::{HumanFormatter, TraceFormatter};
pub use record::{TraceRecord, event_type};

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use brindle_engine::{SessionEvent, SessionListener};

use crate::config::{TraceOutput, TracerConfig};

// =============================================================================
// Tracer
// =============================================================================

/// Records session events.
#[derive(Debug)]
pub struct Tracer {
    config: TracerConfig,
    buffer: TraceBuffer,
    firings: u64,
    start_time: Instant,
    formatter: HumanFormatter,
}

impl Tracer {
    /// Creates a new tracer with the given configuration.
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        let buffer = TraceBuffer::new(config.buffer_size);
        Self {
            config,
            buffer,
            firings: 0,
            start_time: Instant::now(),
            formatter: HumanFormatter::new(),
        }
    }

    /// Creates a tracer that records nothing until enabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(TracerConfig::default())
    }

    /// Creates an enabled tracer that also writes to stderr.
    #[must_use]
    pub fn to_stderr() -> Self {
        Self::new(
            TracerConfig::new()
                .enabled()
                .with_output(TraceOutput::Stderr),
        )
    }

    /// Returns whether tracing is enabled.
    #[must_use]
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Enables tracing.
    pub fn enable(&mut self) {
        self.config.enabled = true;
    }

    /// Disables tracing.
    pub fn disable(&mut self) {
        self.config.enabled = false;
    }

    /// Sets the live output destination.
    pub fn set_output(&mut self, output: TraceOutput) {
        self.config.output = output;
    }

    /// Returns the number of firings seen while enabled.
    #[must_use]
    pub fn firings(&self) -> u64 {
        self.firings
    }

    /// Records an event.
    #[inline]
    pub fn record(&mut self, event: &SessionEvent) {
        if !self.config.enabled {
            return;
        }
        self.record_internal(event);
    }

    fn record_internal(&mut self, event: &SessionEvent) {
        if matches!(event, SessionEvent::BeforeFire { .. }) {
            self.firings += 1;
        }
        let kind = event_type(event);
        if !self.config.event_filter.is_empty()
            && !self.config.event_filter.iter().any(|f| f == kind)
        {
            return;
        }

        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ns = self.start_time.elapsed().as_nanos() as u64;
        self.buffer.push(self.firings, timestamp_ns, event.clone());

        if self.config.output == TraceOutput::None {
            return;
        }
        let Some(line) = self.buffer.last().map(|record| self.formatter.format(record)) else {
            return;
        };
        match self.config.output {
            TraceOutput::Stderr => self.write_line(&line, &mut io::stderr().lock()),
            TraceOutput::Log => tracing::info!(target: "brindle::trace", "{line}"),
            TraceOutput::None => {}
        }
    }

    /// Writes one live line. If the destination fails, this line and every
    /// later one go to the log instead.
    fn write_line(&mut self, line: &str, out: &mut dyn Write) {
        if let Err(err) = writeln!(out, "{line}") {
            tracing::warn!(
                target: "brindle::trace",
                error = %err,
                "trace output failed, switching to the log"
            );
            tracing::info!(target: "brindle::trace", "{line}");
            self.config.output = TraceOutput::Log;
        }
    }

    /// Returns the trace buffer.
    #[must_use]
    pub fn buffer(&self) -> &TraceBuffer {
        &self.buffer
    }

    /// Clears the trace buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns buffer statistics.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        self.buffer.stats()
    }

    /// Formats the most recent records, one per line.
    #[must_use]
    pub fn format_recent(&self, count: usize) -> String {
        self.formatter.format_many(&self.buffer.recent(count))
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl SessionListener for Tracer {
    fn on_event(&mut self, event: &SessionEvent) {
        self.record(event);
    }
}

// =============================================================================
// Shared Tracer
// =============================================================================

/// A [`Tracer`] behind a mutex, readable after being handed to a session.
#[derive(Clone, Debug, Default)]
pub struct SharedTracer(Arc<Mutex<Tracer>>);

impl SharedTracer {
    /// Creates a shared tracer.
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        Self(Arc::new(Mutex::new(Tracer::new(config))))
    }

    /// Runs `f` with the tracer locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Tracer) -> R) -> R {
        let mut tracer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracer)
    }

    /// Copies out every buffered record.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.with(|t| t.buffer().iter().cloned().collect())
    }
}

impl SessionListener for SharedTracer {
    fn on_event(&mut self, event: &SessionEvent) {
        self.with(|t| t.record(event));
    }
}

// =============================================================================
// Tests
// =============================================================================
