//! Dumb console progress reporting

use crate::{
    progress::{Phase, Progress},
    world::Invocation,
};

/// Prints every command line before it runs, like a shell with `set -x`.
pub struct DumbConsoleProgress {
    print_cmds: bool,
}

impl DumbConsoleProgress {
    pub fn new(print_cmds: bool) -> Self {
        Self { print_cmds }
    }
}

impl Progress for DumbConsoleProgress {
    fn phase_started(&self, _phase: Phase) {}

    fn command_started(&self, invocation: &Invocation) {
        if self.print_cmds {
            println!("{}", invocation.human_readable());
        }
    }

    fn command_finished(&self, invocation: &Invocation, exit_code: i32) {
        if exit_code != 0 {
            eprintln!("{} exited with {exit_code}", invocation.argv.join(" "));
        }
    }
}
