//! Process-scoped runtime state.
//!
//! The cold-start flag starts as `true` when the context is created and is
//! cleared by the first [`RuntimeContext::consume_cold_start_flag`] call.
//! It is never persisted, so a new process always starts cold.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RuntimeContext {
    cold: AtomicBool,
    started: Instant,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self {
            cold: AtomicBool::new(true),
            started: Instant::now(),
        }
    }

    /// Atomically read and clear the cold-start flag.
    ///
    /// Returns `true` for exactly one caller over the context's lifetime.
    pub fn consume_cold_start_flag(&self) -> bool {
        self.cold.swap(false, Ordering::AcqRel)
    }

    /// Time elapsed since the context was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_CONTEXT: LazyLock<RuntimeContext> = LazyLock::new(RuntimeContext::new);

/// The context shared by the whole process.
pub fn process_context() -> &'static RuntimeContext {
    &PROCESS_CONTEXT
}

/// Pin the init marker to "now". Call first thing in `main` so uptime
/// covers the whole process lifetime rather than starting at the first request.
pub fn mark_process_start() {
    LazyLock::force(&PROCESS_CONTEXT);
}
