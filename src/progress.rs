//! Progress reporting facility

use crate::world::Invocation;

pub mod dumb;
pub mod noop;

pub use dumb::DumbConsoleProgress;
pub use noop::{NOOP_PROGRESS, NoopProgress};

/// A stage of the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Clobber,
    Regenerate,
    Build,
    Run,
}

/// Trait for reporting what the builder is doing.
pub trait Progress {
    /// Callback when the builder enters a new phase.
    fn phase_started(&self, phase: Phase);

    /// Callback right before a child process is launched. In no-op mode this
    /// is the only callback a command gets.
    fn command_started(&self, invocation: &Invocation);

    /// Callback when a child process exits, or fails to launch.
    fn command_finished(&self, invocation: &Invocation, exit_code: i32);
}
