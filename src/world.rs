use std::{
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use indexmap::IndexMap;

use crate::command::EnvVar;

/// A trait that abstracts over how the builder interacts with the outside world.
///
/// All file and process operations performed while building and running
/// targets are directed through this trait. A mock world can be used to test
/// the builder without a Chromium checkout, a build tool or a generator.
///
/// A default implementation is available at [`LocalWorld`].
pub trait World {
    /// Test whether a file or directory exists.
    fn exists(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of a file, creating it if necessary.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Run a child process to completion and return its exit code.
    ///
    /// `env` is applied on top of the inherited environment of the child only.
    fn execute(&self, invocation: &Invocation, env: &LaunchEnv) -> io::Result<i32>;
}

/// The default implementation of [`World`], which interacts with the local
/// filesystem and spawns local processes.
pub struct LocalWorld;
pub static LOCAL_WORLD: LocalWorld = LocalWorld;

impl World for LocalWorld {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn execute(&self, invocation: &Invocation, env: &LaunchEnv) -> io::Result<i32> {
        let mut cmd = invocation.to_command();
        for (name, value) in env.vars() {
            cmd.env(name, value);
        }
        if let Some(path) = env.joined_path(std::env::var_os("PATH").as_deref())? {
            cmd.env("PATH", path);
        }
        if let Some(var) = &invocation.env {
            cmd.env(&var.name, var.values_str());
        }

        let mut child = cmd.spawn()?;
        let status = child.wait()?;
        Ok(exit_code(status))
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// The environment every child process is launched with.
///
/// Built once per invocation by the builder. It is never written back into
/// the environment of the current process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnv {
    vars: IndexMap<String, String>,
    path_prefix: Vec<PathBuf>,
}

impl LaunchEnv {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Prepend a directory to `PATH`. The most recently prepended directory
    /// is searched first.
    pub fn prepend_path(&mut self, dir: impl Into<PathBuf>) {
        self.path_prefix.push(dir.into());
    }

    /// The prepended directories in search order.
    pub fn path_prefix(&self) -> impl Iterator<Item = &Path> {
        self.path_prefix.iter().rev().map(PathBuf::as_path)
    }

    /// Compute the `PATH` of a child given the inherited one. Returns `None`
    /// when nothing was prepended and the inherited value can be kept.
    pub fn joined_path(&self, inherited: Option<&OsStr>) -> io::Result<Option<OsString>> {
        if self.path_prefix.is_empty() {
            return Ok(None);
        }
        let mut dirs: Vec<PathBuf> = self.path_prefix().map(Path::to_path_buf).collect();
        if let Some(inherited) = inherited {
            dirs.extend(std::env::split_paths(inherited));
        }
        std::env::join_paths(dirs)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

/// A single child process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The program followed by its arguments.
    pub argv: Vec<String>,
    /// An environment variable set for this child only.
    pub env: Option<EnvVar>,
    /// Pass the command line through the system shell instead of executing
    /// `argv[0]` directly.
    pub shell: bool,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: None,
            shell: false,
            cwd: None,
        }
    }

    /// Render the command line the way a user would type it.
    ///
    /// Shell commands are printed verbatim, others are quoted per argument.
    pub fn human_readable(&self) -> String {
        let cmd_line = if self.shell {
            self.argv.join(" ")
        } else {
            self.argv
                .iter()
                .map(|arg| match shlex::try_quote(arg) {
                    Ok(quoted) => quoted.into_owned(),
                    Err(_) => arg.clone(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        };
        match self.env.as_ref().and_then(EnvVar::cmd_line_str) {
            Some(env) => format!("{env} {cmd_line}"),
            None => cmd_line,
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = if self.shell {
            let script = self.argv.join(" ");
            if cfg!(windows) {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(script);
                cmd
            } else {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                cmd
            }
        } else {
            let (program, args) = match self.argv.split_first() {
                Some((program, args)) => (program.as_str(), args),
                None => ("", &[][..]),
            };
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        };
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}
