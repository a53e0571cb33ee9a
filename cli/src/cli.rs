use std::{ffi::OsString, path::PathBuf};

use crbuild::BuildFlags;

const TARGETS_HELP: &str = "Target(s) to build/run. The target name can be one of the \
targets defined in the configuration file. If not then it is assumed to be a target \
defined in the GN files.";

#[derive(Debug, clap::Parser)]
#[clap(
    name = "crbuild",
    version,
    about = "A tool to make building and running Chromium targets easier."
)]
pub struct Args {
    #[arg(help = TARGETS_HELP)]
    pub targets: Vec<String>,

    /// Arguments passed verbatim to every launched executable
    #[arg(last = true, value_name = "RUN_ARGS")]
    pub run_args: Vec<String>,

    /// The configuration file (default: crbuild.toml next to the executable)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do a debug build (default: debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Do a release build (default: debug)
    #[arg(short, long)]
    pub release: bool,

    /// Regenerate the build directory before building
    #[arg(short, long)]
    pub gn: bool,

    /// Be verbose, can be used multiple times
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Delete the build directory before building
    #[arg(short, long)]
    pub clobber: bool,

    /// Don't do anything, print what would be done
    #[arg(short, long)]
    pub noop: bool,

    /// Do not run targets after building
    #[arg(short = 'R', long)]
    pub no_run: bool,

    /// Do a control flow integrity build
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub cfi: Option<bool>,

    /// Do an AddressSanitizer build
    #[arg(short = 'A', long)]
    pub asan: bool,

    /// Do a ThreadSanitizer build
    #[arg(short, long)]
    pub tsan: bool,

    /// Do a LeakSanitizer build
    #[arg(short, long)]
    pub lsan: bool,

    /// Do a MemorySanitizer build
    #[arg(short, long)]
    pub msan: bool,

    /// Do a component build
    #[arg(
        short = 'C',
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub component: Option<bool>,

    /// Enable DCHECKs in release builds
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub dcheck: Option<bool>,

    /// Do an official build
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub official: Option<bool>,

    /// Do a Chrome branded build
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub branded: Option<bool>,

    /// Use goma for distributed compilation
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub goma: Option<bool>,

    /// The target OS
    #[arg(long)]
    pub os: Option<String>,

    /// The target CPU architecture
    #[arg(long)]
    pub cpu: Option<String>,

    /// Profile the executable
    #[arg(short, long)]
    pub profile: bool,

    /// Number of jobs when both building and running
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Do a fuzzer build (implies asan)
    #[arg(long)]
    pub fuzzer: bool,

    /// Build for Valgrind (memcheck)
    #[arg(long)]
    pub valgrind: bool,

    /// Run the debug variant of the run commands
    #[arg(short = 'D', long)]
    pub debugger: bool,

    /// Use the clang compiler
    #[arg(long, conflicts_with = "no_use_clang")]
    pub use_clang: bool,

    /// Don't use the clang compiler
    #[arg(long)]
    pub no_use_clang: bool,

    /// The string to pass to the --gtest_filter parameter
    #[arg(long, value_name = "FILTER")]
    pub gtest: Option<String>,
}

impl Args {
    pub fn to_flags(&self) -> BuildFlags {
        let use_clang = match (self.use_clang, self.no_use_clang) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        BuildFlags {
            debug: self.debug,
            release: self.release,
            regenerate: self.gn,
            verbosity: self.verbose,
            clobber: self.clobber,
            noop: self.noop,
            no_run: self.no_run,
            cfi: self.cfi,
            asan: self.asan,
            tsan: self.tsan,
            lsan: self.lsan,
            msan: self.msan,
            component: self.component,
            dcheck: self.dcheck,
            official: self.official,
            branded: self.branded,
            goma: self.goma,
            os: self.os.clone(),
            cpu: self.cpu.clone(),
            profile: self.profile,
            jobs: self.jobs,
            fuzzer: self.fuzzer,
            valgrind: self.valgrind,
            debugger: self.debugger,
            use_clang,
            gtest: self.gtest.clone(),
            targets: self.targets.clone(),
            run_args: self.run_args.clone(),
        }
    }
}

/// Find the value of `--config` before the full parse, so that the help
/// text can list the targets of the right configuration.
pub fn config_arg(argv: &[OsString]) -> Option<PathBuf> {
    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        if arg == "--config" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(value) = arg.to_str().and_then(|a| a.strip_prefix("--config=")) {
            return Some(PathBuf::from(value));
        }
    }
    None
}
