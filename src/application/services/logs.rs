//! Log aggregation: the rolling console ring, the per-deployment build log,
//! and the detachable forward that splices early runtime output into it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::ports::LineSink;

/// Default console ring capacity, in lines.
pub const DEFAULT_CONSOLE_CAPACITY: usize = 5000;

// ── Console ring ──────────────────────────────────────────────────────────────

/// Fixed-capacity ring of raw console lines; the oldest line is evicted once
/// the ring is full. Append and snapshot take only the ring's own lock, so
/// status polling stays responsive while a deployment is in flight.
pub struct ConsoleBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl ConsoleBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(VecDeque::new()),
        }
    }

    /// Append one raw line, evicting the oldest lines when full.
    pub fn push(&self, raw_line: &str) {
        let mut lines = self.lock();
        while lines.len() >= self.capacity && lines.pop_front().is_some() {}
        lines.push_back(raw_line.to_owned());
    }

    /// Consistent snapshot of the ring, concatenated in arrival order. Raw
    /// lines keep their terminators, so the result reads as a transcript.
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.lock().iter().map(String::as_str).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Build log ─────────────────────────────────────────────────────────────────

/// Append-only transcript of the deployment in flight. Backed by one growable
/// buffer; each append extends it in place.
#[derive(Default)]
pub struct BuildLog {
    text: Mutex<String>,
}

impl BuildLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&self, line: &str) {
        let mut text = self.lock();
        text.push_str(line);
        text.push('\n');
    }

    #[must_use]
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Detachable forward ────────────────────────────────────────────────────────

/// Atomically swappable optional line sink. The console sink forwards early
/// runtime output through this slot until the orchestrator detaches it, at
/// which point the build log is frozen.
pub struct DetachableForward {
    slot: Mutex<Option<Arc<dyn LineSink>>>,
}

impl DetachableForward {
    #[must_use]
    pub fn attached(sink: Arc<dyn LineSink>) -> Self {
        Self {
            slot: Mutex::new(Some(sink)),
        }
    }

    /// Forward one line to the attached sink, if any. The sink is cloned out
    /// of the slot and invoked outside the lock; a forward racing `detach`
    /// may observe either state.
    pub fn forward(&self, line: &str) {
        let sink = self.lock().clone();
        if let Some(sink) = sink {
            sink.line(line);
        }
    }

    /// Clear the slot. Subsequent forwards are no-ops.
    pub fn detach(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn LineSink>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Sink for orchestrator progress lines and build-phase output: mirrors every
/// line to the external progress sink, then appends it to the build log.
pub struct BuildLogSink {
    progress: Arc<dyn LineSink>,
    log: Arc<BuildLog>,
}

impl BuildLogSink {
    #[must_use]
    pub fn new(progress: Arc<dyn LineSink>, log: Arc<BuildLog>) -> Self {
        Self { progress, log }
    }
}

impl LineSink for BuildLogSink {
    fn line(&self, line: &str) {
        self.progress.line(line);
        self.log.append_line(line);
    }
}

/// Sink for runtime console output. Per line, in order: forward through the
/// detachable slot with trailing terminators stripped, then append the raw
/// line to the ring.
pub struct ConsoleSink {
    forward: Arc<DetachableForward>,
    console: Arc<ConsoleBuffer>,
}

impl ConsoleSink {
    #[must_use]
    pub fn new(forward: Arc<DetachableForward>, console: Arc<ConsoleBuffer>) -> Self {
        Self { forward, console }
    }
}

impl LineSink for ConsoleSink {
    fn line(&self, raw_line: &str) {
        self.forward.forward(raw_line.trim_end_matches(['\r', '\n']));
        self.console.push(raw_line);
    }
}
