//! Discovery of the host and of the Chromium checkout being built.

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::options::DeviceInfo;

/// Directories that must all exist for a directory to be a Chromium `src`.
const SOURCE_ROOT_FINGERPRINTS: &[&str] = &["chrome", "net", "v8", "build", "skia"];

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("not a Chrome (sub)directory: {0}")]
    NotInCheckout(PathBuf),

    #[error("unknown host platform: {0}")]
    UnknownPlatform(String),

    #[error("no target_os list in {0}")]
    NoTargetOs(PathBuf),

    #[error("a checkout must target at least one OS")]
    EmptyTargetOs,

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Attributes of the host and of the location being built.
#[derive(Debug, Clone)]
pub struct Env {
    pub src_root_dir: PathBuf,
    /// The host platform, named the way GN names it (`linux`, `mac`, `win`).
    pub build_platform: String,
    pub num_cpus: usize,
    /// `None` when the current user has no known home directory.
    pub home_dir: Option<PathBuf>,
    /// The checked-out branch, if known.
    pub branch: Option<String>,
    /// Directory holding the bundled clang toolchain.
    pub llvm_path: PathBuf,
    pub llvm_available: bool,
    /// `~/goma`, if there is a home directory.
    pub goma_dir: Option<PathBuf>,
    pub goma_available: bool,
    /// Supplemental GN arguments (API keys) for Chrome OS builds.
    pub api_keys_path: Option<PathBuf>,
    /// Attached Android devices, as reported by the device query.
    pub android_devices: Vec<DeviceInfo>,
}

impl Env {
    /// Create an environment for the given source root on the current host.
    pub fn new(src_root_dir: impl Into<PathBuf>) -> Result<Self, EnvError> {
        let build_platform = gn_platform(std::env::consts::OS)?;
        let home_dir = dirs::home_dir();
        if home_dir.is_none() {
            warn!("no home directory, goma and ${{HOME}} are unavailable");
        }
        let mut env = Self::with_platform(src_root_dir, build_platform, home_dir);
        env.num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        env.llvm_available = env.llvm_path.is_dir();
        env.goma_available = env.goma_dir.as_deref().is_some_and(Path::is_dir);
        Ok(env)
    }

    /// Create an environment without inspecting the host. Toolchains are
    /// reported as unavailable.
    pub fn with_platform(
        src_root_dir: impl Into<PathBuf>,
        build_platform: &str,
        home_dir: Option<PathBuf>,
    ) -> Self {
        let src_root_dir = src_root_dir.into();
        let llvm_path = src_root_dir
            .join("third_party")
            .join("llvm-build")
            .join("Release+Asserts")
            .join("bin");
        let goma_dir = home_dir.as_ref().map(|home| home.join("goma"));

        Self {
            build_platform: build_platform.to_string(),
            num_cpus: 1,
            branch: None,
            llvm_path,
            llvm_available: false,
            goma_dir,
            goma_available: false,
            api_keys_path: None,
            android_devices: vec![],
            src_root_dir,
            home_dir,
        }
    }

    /// Discover the environment from a directory somewhere inside a checkout.
    pub fn discover(dir_in_source_root: &Path) -> Result<Self, EnvError> {
        let root = find_source_root(dir_in_source_root)?;
        debug!(root = %root.display(), "found source root");
        let mut env = Env::new(root)?;
        env.branch = read_current_branch(&env.src_root_dir);
        Ok(env)
    }

    /// Path to the `.gclient` file describing the checkout.
    pub fn gclient_path(&self) -> PathBuf {
        self.src_root_dir.join("..").join(".gclient")
    }
}

/// Map a Rust target OS name to the name GN uses for it.
pub fn gn_platform(os: &str) -> Result<&'static str, EnvError> {
    match os {
        "linux" => Ok("linux"),
        "macos" => Ok("mac"),
        "windows" => Ok("win"),
        other => Err(EnvError::UnknownPlatform(other.to_string())),
    }
}

/// Walk up from `dir` to the Chromium `src` directory.
pub fn find_source_root(dir: &Path) -> Result<PathBuf, EnvError> {
    dir.ancestors()
        .find(|candidate| {
            SOURCE_ROOT_FINGERPRINTS
                .iter()
                .all(|fp| candidate.join(fp).is_dir())
        })
        .map(Path::to_path_buf)
        .ok_or_else(|| EnvError::NotInCheckout(dir.to_path_buf()))
}

/// The git directory of a checkout. In worktrees and submodules `.git` is a
/// file holding a `gitdir:` line instead.
fn git_dir(src_root_dir: &Path) -> Option<PathBuf> {
    let dot_git = src_root_dir.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    let text = std::fs::read_to_string(&dot_git).ok()?;
    let target = text.trim().strip_prefix("gitdir:")?.trim();
    // Relative paths are relative to the directory holding `.git`.
    Some(src_root_dir.join(target))
}

fn read_current_branch(src_root_dir: &Path) -> Option<String> {
    let head = std::fs::read_to_string(git_dir(src_root_dir)?.join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_string)
}

/// The source-checkout descriptor: which OSes the checkout was synced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// Target OSes, the first being the default. Never empty.
    target_os: Vec<String>,
}

impl Checkout {
    pub fn new(target_os: impl IntoIterator<Item = impl Into<String>>) -> Result<Self, EnvError> {
        let target_os: Vec<String> = target_os.into_iter().map(Into::into).collect();
        if target_os.is_empty() {
            return Err(EnvError::EmptyTargetOs);
        }
        Ok(Self { target_os })
    }

    pub fn read(path: &Path) -> Result<Self, EnvError> {
        let text = std::fs::read_to_string(path).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).ok_or_else(|| EnvError::NoTargetOs(path.to_path_buf()))
    }

    /// Extract the `target_os = [...]` list from the text of a `.gclient`
    /// file. Returns `None` if there is no non-empty list.
    pub fn parse(text: &str) -> Option<Self> {
        for (pos, _) in text.match_indices("target_os") {
            let preceded_by_ident = text[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if preceded_by_ident {
                continue;
            }
            let Some(rest) = text[pos + "target_os".len()..]
                .trim_start()
                .strip_prefix('=')
            else {
                continue;
            };
            let Some(rest) = rest.trim_start().strip_prefix('[') else {
                continue;
            };
            let list = &rest[..rest.find(']')?];
            let target_os = quoted_strings(list);
            if target_os.is_empty() {
                return None;
            }
            return Some(Self { target_os });
        }
        None
    }

    pub fn target_os(&self) -> &[String] {
        &self.target_os
    }

    pub fn default_target_os(&self) -> &str {
        &self.target_os[0]
    }

    pub fn supports(&self, os: &str) -> bool {
        self.target_os.iter().any(|t| t == os)
    }
}

fn quoted_strings(list: &str) -> Vec<String> {
    let mut out = vec![];
    let mut chars = list.chars();
    while let Some(c) = chars.next() {
        if c == '"' || c == '\'' {
            let s: String = chars.by_ref().take_while(|&q| q != c).collect();
            out.push(s);
        }
    }
    out
}
