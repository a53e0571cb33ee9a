//! No-op progress reporter

use crate::world::Invocation;

use super::{Phase, Progress};

/// A no-op implementation of the Progress trait.
/// Useful for tests or environments where progress reporting is not desired.
pub struct NoopProgress;

impl Progress for NoopProgress {
    fn phase_started(&self, _phase: Phase) {}

    fn command_started(&self, _invocation: &Invocation) {}

    fn command_finished(&self, _invocation: &Invocation, _exit_code: i32) {}
}

/// A global no-op progress instance for convenience.
pub static NOOP_PROGRESS: NoopProgress = NoopProgress;
