//! Text shown to the user around a build.

use std::{fmt::Write, time::Duration};

use crbuild::{Configuration, Failure};

/// `"42 sec"`, `"MM:SS"` below an hour, `"HH:MM:SS"` otherwise.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        return format!("{seconds} sec");
    }
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    if minutes < 60 {
        return format!("{minutes:02}:{seconds:02}");
    }
    let (hours, minutes) = (minutes / 60, minutes % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// The help epilog: every explicitly configured target, sorted by name, with its title.
pub fn target_epilog(config: &Configuration) -> String {
    let mut targets: Vec<_> = config
        .targets()
        .filter(|(_, target)| target.explicit)
        .map(|(_, target)| (target.name.as_str(), target.title.as_deref()))
        .collect();
    targets.sort();

    let mut epilog = String::from("Targets:");
    for (name, title) in targets {
        match title {
            Some(title) => write!(epilog, "\n  {name}: {title}"),
            None => write!(epilog, "\n  {name}"),
        }
        .ok();
    }
    epilog
}

/// One line per failed command, with its exit code.
pub fn failure_report(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(|failure| format!("Failed: {failure}\n"))
        .collect()
}

/// The process exit code for a finished invocation: the first failure's
/// exit code, or 0.
pub fn exit_code(failures: &[Failure]) -> i32 {
    failures.first().map_or(0, |failure| failure.exit_code)
}
