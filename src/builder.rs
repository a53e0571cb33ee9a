//! Orchestration of one invocation: regenerate, build, then run.

use std::{
    fmt,
    io,
    path::{Path, PathBuf},
};

use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::{
    command::RunCommand,
    expand::{ExpandError, VariableExpander},
    gn::Gn,
    graph::{Configuration, ResolveError},
    options::BuildOptions,
    progress::{Phase, Progress},
    settings::{SettingsError, SettingsStore},
    world::{Invocation, LaunchEnv, World},
};

/// The exit code reported for a command that could not be launched.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// A child process that exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub argv: Vec<String>,
    pub exit_code: i32,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exit code {})", self.argv.join(" "), self.exit_code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Expand(#[from] ExpandError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Runs the stages of one invocation against a [`World`].
///
/// Child processes never see changes to the environment of this process:
/// everything they need is in the [`LaunchEnv`] computed on creation.
pub struct Builder<'a> {
    world: &'a dyn World,
    progress: &'a dyn Progress,
    options: &'a BuildOptions,
    config: &'a Configuration,
    /// Relative to the source root.
    build_dir: PathBuf,
    launch_env: LaunchEnv,
}

impl<'a> Builder<'a> {
    pub fn new(
        world: &'a dyn World,
        progress: &'a dyn Progress,
        options: &'a BuildOptions,
        config: &'a Configuration,
    ) -> Self {
        let build_dir = VariableExpander::new(options).build_dir();
        let launch_env = launch_env(options, &options.env.src_root_dir.join(&build_dir));
        let settings = &options.settings;
        info!(
            target_os = settings.target_os(),
            host_os = %options.env.build_platform,
            official = settings.is_official_build,
            clang = settings.use_clang,
            goma = settings.use_goma,
            build_dir = %build_dir.display(),
            "configured build"
        );
        Self {
            world,
            progress,
            options,
            config,
            build_dir,
            launch_env,
        }
    }

    /// The build directory, relative to the source root.
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn launch_env(&self) -> &LaunchEnv {
        &self.launch_env
    }

    fn rooted_build_dir(&self) -> PathBuf {
        self.options.env.src_root_dir.join(&self.build_dir)
    }

    fn gn(&self) -> Gn<'_> {
        Gn::new(self.world, &self.options.env, &self.build_dir)
    }

    fn settings_store(&self) -> SettingsStore<'_> {
        SettingsStore::new(self.world, &self.rooted_build_dir())
    }

    /// Whether the build directory must be regenerated before building.
    ///
    /// That is the case unless both the settings snapshot and `args.gn`
    /// match what the current options produce.
    pub fn needs_regenerate(&self) -> Result<bool, BuilderError> {
        if self.options.regenerate {
            debug!("regeneration requested");
            return Ok(true);
        }
        match self.settings_store().load() {
            None => {
                debug!("no settings snapshot");
                return Ok(true);
            }
            Some(previous) if previous != self.options.settings => {
                debug!("settings changed");
                return Ok(true);
            }
            Some(_) => {}
        }
        let gn = self.gn();
        let existing = match gn.read_args() {
            Ok(Some(existing)) => existing,
            Ok(None) => return Ok(true),
            Err(e) => {
                debug!(error = %e, "can't read GN args");
                return Ok(true);
            }
        };
        let computed = gn
            .compute_args(&self.options.settings)
            .map_err(|source| self.io_error(gn.args_path(), source))?;
        Ok(existing != computed)
    }

    /// Delete the settings snapshot and the build directory.
    pub fn clobber(&self) -> Result<(), BuilderError> {
        self.progress.phase_started(Phase::Clobber);
        let dir = self.rooted_build_dir();
        if self.options.noop {
            info!(dir = %dir.display(), "would delete build directory");
            return Ok(());
        }
        let store = self.settings_store();
        store
            .remove()
            .map_err(|source| self.io_error(store.path().to_path_buf(), source))?;
        if self.world.exists(&dir) {
            info!(dir = %dir.display(), "deleting build directory");
            self.world
                .remove_dir_all(&dir)
                .map_err(|source| self.io_error(dir.clone(), source))?;
        }
        Ok(())
    }

    /// Write `args.gn`, run `gn gen` and store the settings snapshot.
    ///
    /// Returns the failure of `gn gen`, if any. The snapshot is only stored
    /// after a successful generation.
    pub fn regenerate(&self) -> Result<Option<Failure>, BuilderError> {
        self.progress.phase_started(Phase::Regenerate);
        let gn = self.gn();
        let invocation = gn.generate_invocation();
        if self.options.noop {
            self.progress.command_started(&invocation);
            return Ok(None);
        }

        let dir = self.rooted_build_dir();
        self.world
            .create_dir_all(&dir)
            .map_err(|source| self.io_error(dir.clone(), source))?;
        let args = gn
            .compute_args(&self.options.settings)
            .map_err(|source| self.io_error(gn.args_path(), source))?;
        gn.write_args(&args)
            .map_err(|source| self.io_error(gn.args_path(), source))?;

        let exit_code = self.launch(&invocation);
        if exit_code != 0 {
            return Ok(Some(Failure {
                argv: invocation.argv,
                exit_code,
            }));
        }
        self.settings_store().store(&self.options.settings)?;
        Ok(None)
    }

    /// The build-tool command line for `targets`.
    pub fn build_invocation<S: AsRef<str>>(&self, targets: &[S]) -> Invocation {
        let settings = &self.options.settings;
        let jobs = if settings.use_goma {
            if settings.target_os() == "mac" { 100 } else { 4096 }
        } else {
            self.options.jobs
        };
        let mut argv: Vec<String> = vec![
            "ninja".into(),
            "-C".into(),
            self.build_dir.to_string_lossy().into_owned(),
            "-j".into(),
            jobs.to_string(),
        ];
        if self.options.keep_going {
            argv.extend(["-k".into(), "50000".into()]);
        }
        argv.extend(["-l".into(), "40".into()]);
        if self.options.verbosity > 1 {
            argv.push("-v".into());
        }
        if self.options.noop {
            argv.push("-n".into());
        }
        argv.extend(targets.iter().map(|t| t.as_ref().to_string()));

        let mut invocation = Invocation::new(argv);
        invocation.cwd = Some(self.options.env.src_root_dir.clone());
        invocation
    }

    /// Build `target_names`, skipping run-only targets.
    ///
    /// Nothing is launched if no target is left.
    pub fn build<S: AsRef<str>>(&self, target_names: &[S]) -> Vec<Failure> {
        let targets: Vec<&str> = target_names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.config.is_run_only(name))
            .collect();
        if targets.is_empty() {
            debug!("nothing to build");
            return vec![];
        }
        self.progress.phase_started(Phase::Build);
        info!(?targets, "building");

        let invocation = self.build_invocation(&targets);
        // In no-op mode the build tool runs with `-n` and only reports.
        let exit_code = self.launch(&invocation);
        if exit_code == 0 {
            return vec![];
        }
        vec![Failure {
            argv: invocation.argv,
            exit_code,
        }]
    }

    /// Expand and launch one run command.
    ///
    /// A failing command is returned, not raised. In no-op mode the command
    /// is only reported.
    pub fn run(&self, run_command: &RunCommand) -> Result<Vec<Failure>, BuilderError> {
        let invocation = self.run_invocation(run_command)?;
        if self.options.noop {
            self.progress.command_started(&invocation);
            return Ok(vec![]);
        }
        let exit_code = self.launch(&invocation);
        if exit_code == 0 {
            return Ok(vec![]);
        }
        Ok(vec![Failure {
            argv: invocation.argv,
            exit_code,
        }])
    }

    /// The expanded launch of a run command, with the trailing run arguments
    /// appended unless the command already places them with `${run_args}`.
    pub fn run_invocation(&self, run_command: &RunCommand) -> Result<Invocation, BuilderError> {
        let cmd_line = run_command.cmd_line();
        let mut argv = VariableExpander::new(self.options).expand(&cmd_line)?;
        let places_run_args = cmd_line.iter().any(|token| token.contains("${run_args}"));
        if !places_run_args {
            argv.extend(self.options.run_args.iter().cloned());
        }
        let mut invocation = Invocation::new(argv);
        invocation.env = run_command.env_var.clone();
        invocation.shell = run_command.shell;
        invocation.cwd = Some(self.options.env.src_root_dir.clone());
        Ok(invocation)
    }

    /// Run every stage for the active targets.
    ///
    /// Returns the failed child processes. A failure before the run stage
    /// stops the invocation; failing run commands don't stop their siblings.
    pub fn execute(&self) -> Result<Vec<Failure>, BuilderError> {
        if self.options.clobber {
            self.clobber()?;
        }
        if self.needs_regenerate()?
            && let Some(failure) = self.regenerate()?
        {
            return Ok(vec![failure]);
        }

        let build_targets: Vec<SmolStr> = self
            .config
            .build_targets(&self.options.active_targets, self.options)
            .into_iter()
            .collect();
        let failures = self.build(&build_targets);
        if !failures.is_empty() || !self.options.run_targets {
            return Ok(failures);
        }

        let run_commands = self
            .config
            .run_commands(&self.options.active_targets, self.options)?;
        if !run_commands.is_empty() {
            self.progress.phase_started(Phase::Run);
        }
        let mut failures = vec![];
        for run_command in &run_commands {
            failures.extend(self.run(run_command)?);
        }
        Ok(failures)
    }

    /// Launch a child process, reporting it. Launch errors are reported as
    /// [`SPAWN_FAILURE_EXIT_CODE`].
    fn launch(&self, invocation: &Invocation) -> i32 {
        self.progress.command_started(invocation);
        let exit_code = match self.world.execute(invocation, &self.launch_env) {
            Ok(code) => code,
            Err(e) => {
                warn!(program = ?invocation.argv.first(), error = %e, "failed to launch");
                SPAWN_FAILURE_EXIT_CODE
            }
        };
        self.progress.command_finished(invocation, exit_code);
        exit_code
    }

    fn io_error(&self, path: PathBuf, source: io::Error) -> BuilderError {
        BuilderError::Io { path, source }
    }
}

/// The environment of every child process of an invocation.
///
/// `build_dir` must be rooted.
pub fn launch_env(options: &BuildOptions, build_dir: &Path) -> LaunchEnv {
    let settings = &options.settings;
    let mut env = LaunchEnv::new();
    if settings.use_clang {
        env.set("CC", "clang");
        env.set("CXX", "clang++");
        env.prepend_path(&options.env.llvm_path);
    }
    // Prepended last so goma's compiler wrappers come first.
    if settings.use_goma
        && let Some(goma_dir) = &settings.goma_dir
    {
        env.prepend_path(goma_dir);
    }
    if options.profile {
        env.set("CPUPROFILE", options.profile_file.to_string_lossy());
    }
    if settings.is_asan {
        env.set(
            "CHROME_DEVEL_SANDBOX",
            build_dir.join("chrome_sandbox").to_string_lossy(),
        );
    }
    env
}
