//! Test in a mock environment

use std::{
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crbuild::{
    BuildFlags, BuildOptions, Checkout, Env,
    options::InvalidOption,
    world::{Invocation, LaunchEnv, World},
};

/// The source root all fixtures live in.
pub const SRC_ROOT: &str = "/src/chromium/src";

/// A mock [`World`] implementation that works entirely in-memory.
pub struct MockWorld {
    inner: Mutex<MockWorldInner>,
}

/// Decides the exit code of a mocked command. Returning an error simulates a
/// command that can't be launched.
pub type MockCallback = Arc<dyn Fn(&Invocation) -> io::Result<i32> + Send + Sync>;

struct MockWorldInner {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
    /// A log of executed commands
    exec_log: Vec<MockExecResult>,
    /// Execution callback
    callback: Option<MockCallback>,
}

#[derive(Debug, Clone)]
pub struct MockExecResult {
    pub invocation: Invocation,
    pub env: LaunchEnv,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl World for MockWorld {
    fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.files.contains_key(path) || inner.dirs.contains(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.insert(path.to_owned(), contents.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for dir in path.ancestors() {
            inner.dirs.insert(dir.to_owned());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(path).map(drop).ok_or_else(|| not_found(path))
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.dirs.contains(path) {
            return Err(not_found(path));
        }
        inner.files.retain(|p, _| !p.starts_with(path));
        inner.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn execute(&self, invocation: &Invocation, env: &LaunchEnv) -> io::Result<i32> {
        let callback = {
            let mut inner = self.inner.lock().unwrap();
            inner.exec_log.push(MockExecResult {
                invocation: invocation.clone(),
                env: env.clone(),
            });
            inner.callback.clone()
        };
        match callback {
            Some(cb) => cb(invocation),
            None => Ok(0),
        }
    }
}

#[allow(unused)]
impl MockWorld {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockWorldInner {
                files: HashMap::new(),
                dirs: HashSet::new(),
                exec_log: Vec::new(),
                callback: None,
            }),
        }
    }

    /// Create a file with the given contents.
    pub fn put_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .files
            .insert(path.as_ref().to_owned(), contents.as_ref().to_vec());
    }

    pub fn file_string(&self, path: impl AsRef<Path>) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(path.as_ref())
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Take and clear the execution log.
    pub fn take_log(&self) -> Vec<MockExecResult> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.exec_log)
    }

    /// Take and clear the execution log, keeping only the command lines.
    pub fn take_argv_log(&self) -> Vec<Vec<String>> {
        self.take_log()
            .into_iter()
            .map(|e| e.invocation.argv)
            .collect()
    }

    /// Set an execution callback to customize command execution behavior.
    pub fn set_callback(
        &self,
        callback: impl Fn(&Invocation) -> io::Result<i32> + Send + Sync + 'static,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.callback = Some(Arc::new(callback));
    }
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// A Linux host without the bundled toolchains.
#[allow(unused)]
pub fn test_env() -> Env {
    Env::with_platform(SRC_ROOT, "linux", Some("/home/user".into()))
}

/// A checkout synced for Linux, Android and Chrome OS.
#[allow(unused)]
pub fn test_checkout() -> Checkout {
    Checkout::new(["linux", "android", "chromeos"]).unwrap()
}

#[allow(unused)]
pub fn options_with(flags: BuildFlags) -> Result<BuildOptions, InvalidOption> {
    BuildOptions::from_flags(test_env(), &test_checkout(), &flags)
}

/// The default options for the test checkout.
#[allow(unused)]
pub fn default_options() -> BuildOptions {
    BuildOptions::new(test_env(), &test_checkout())
}
