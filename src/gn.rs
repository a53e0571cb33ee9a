//! Interaction with GN: the `args.gn` file and `gn gen`.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    env::Env,
    options::BuildSettings,
    world::{Invocation, World},
};

const ARGS_HEADER: &str = "\
# Build arguments go here. Examples:
#   is_component_build = true
#   is_debug = false
# See \"gn args <out_dir> --list\" for available build arguments.
";

/// GN build arguments, keyed by name. Values are kept as GN source text,
/// so strings include their quotes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnArgs(BTreeMap<String, String>);

impl GnArgs {
    pub fn new() -> Self {
        Default::default()
    }

    /// Parse `key = value` lines. Later duplicates win.
    pub fn parse(text: &str) -> Self {
        let mut args = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                args.insert(key.trim(), value.trim());
            }
        }
        args
    }

    pub fn render(&self) -> String {
        let mut out = String::from(ARGS_HEADER);
        out.push('\n');
        for (key, value) in &self.0 {
            // Writing to a String can't fail.
            let _ = writeln!(out, "{key} = {value}");
        }
        out
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    fn insert_bool(&mut self, key: &str, value: bool) {
        self.insert(key, if value { "true" } else { "false" });
    }

    fn insert_str(&mut self, key: &str, value: &str) {
        self.insert(key, format!("\"{value}\""));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite with every argument of `other`.
    pub fn merge(&mut self, other: GnArgs) {
        self.0.extend(other.0);
    }

    /// Compute the arguments for `settings`, built on the host described by
    /// `env`. Supplemental API keys are merged separately, see
    /// [`Gn::compute_args`].
    pub fn from_settings(settings: &BuildSettings, env: &Env) -> Self {
        let mut args = Self::new();
        args.insert_bool("dcheck_always_on", settings.dcheck_always_on);
        args.insert_bool("is_chrome_branded", settings.is_chrome_branded);
        args.insert_bool("is_clang", settings.use_clang);
        args.insert_bool("is_component_build", settings.is_component_build);
        args.insert_bool("is_debug", settings.is_debug);
        args.insert_bool("is_official_build", settings.is_official_build);
        args.insert_str("target_os", settings.target_os());
        args.insert_bool("use_goma", settings.use_goma);
        // NaCl builds are broken on every platform.
        args.insert_bool("enable_nacl", false);

        for (enabled, key) in [
            (settings.is_asan, "is_asan"),
            (settings.is_lsan, "is_lsan"),
            (settings.is_msan, "is_msan"),
            (settings.is_tsan, "is_tsan"),
            (settings.use_libfuzzer, "use_libfuzzer"),
            (settings.enable_profiling, "enable_profiling"),
            (settings.enable_cros_assistant, "enable_cros_assistant"),
            (settings.enable_callgrind, "enable_callgrind"),
        ] {
            if enabled {
                args.insert_bool(key, true);
            }
        }
        if let Some(cpu) = &settings.target_cpu {
            args.insert_str("target_cpu", cpu);
        }
        if settings.use_goma
            && let Some(goma_dir) = &settings.goma_dir
        {
            args.insert_str("goma_dir", &goma_dir.to_string_lossy());
        }

        if env.build_platform == "win" {
            args.insert_bool("is_win_fastlink", settings.use_goma);
            args.insert("symbol_level", if settings.is_official_build { "2" } else { "1" });
        }
        if settings.is_asan || settings.is_tsan {
            args.insert("symbol_level", "1");
            if !settings.is_tsan {
                args.insert_bool("enable_full_stack_frames_for_profiling", true);
            }
            args.insert_bool("strip_absolute_paths_from_debug_symbols", true);
        }
        if settings.is_cfi && !settings.is_official_build {
            for key in ["is_cfi", "use_cfi_cast", "use_cfi_diag", "use_thin_lto"] {
                args.insert_bool(key, true);
            }
        }

        if let Some(release) = &settings.android_sdk_release {
            args.insert_str("android_sdk_release", release);
        }
        if let Some(package) = &settings.system_webview_package_name {
            args.insert_str("system_webview_package_name", package);
        }
        if settings.use_signing_keys {
            args.insert_bool("use_signing_keys", true);
        }
        if let Some(use_rtti) = settings.use_rtti {
            args.insert_bool("use_rtti", use_rtti);
        }
        args.insert_bool("enable_ipc_fuzzer", settings.enable_ipc_fuzzer);
        args.insert_bool("v8_enable_verify_heap", settings.v8_enable_verify_heap);
        args
    }
}

/// GN operations on one build directory.
///
/// The build directory is relative to the source root, which is also the
/// working directory of `gn gen`.
pub struct Gn<'a> {
    world: &'a dyn World,
    env: &'a Env,
    build_dir: PathBuf,
}

impl<'a> Gn<'a> {
    pub fn new(world: &'a dyn World, env: &'a Env, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            world,
            env,
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn args_path(&self) -> PathBuf {
        self.env.src_root_dir.join(&self.build_dir).join("args.gn")
    }

    /// Read the arguments the build directory was last generated with, or
    /// `None` if there is no `args.gn`.
    pub fn read_args(&self) -> io::Result<Option<GnArgs>> {
        let path = self.args_path();
        if !self.world.exists(&path) {
            return Ok(None);
        }
        let bytes = self.world.read(&path)?;
        Ok(Some(GnArgs::parse(&String::from_utf8_lossy(&bytes))))
    }

    /// Replace `args.gn` with exactly `args`.
    pub fn write_args(&self, args: &GnArgs) -> io::Result<()> {
        let path = self.args_path();
        debug!(path = %path.display(), count = args.len(), "writing GN args");
        self.world.write(&path, args.render().as_bytes())
    }

    /// The arguments for `settings`, including the API keys of Chrome OS
    /// builds if the keys file exists.
    pub fn compute_args(&self, settings: &BuildSettings) -> io::Result<GnArgs> {
        let mut args = GnArgs::from_settings(settings, self.env);
        if settings.target_os() == "chromeos"
            && let Some(keys_path) = &self.env.api_keys_path
            && self.world.exists(keys_path)
        {
            let bytes = self.world.read(keys_path)?;
            args.merge(GnArgs::parse(&String::from_utf8_lossy(&bytes)));
        }
        Ok(args)
    }

    /// The `gn gen` command for the build directory.
    pub fn generate_invocation(&self) -> Invocation {
        let mut invocation = Invocation::new(vec![
            "gn".into(),
            "gen".into(),
            self.build_dir.to_string_lossy().into_owned(),
        ]);
        // GN fails to start on Windows without a shell if the build
        // directory doesn't exist yet.
        invocation.shell = self.env.build_platform == "win";
        invocation.cwd = Some(self.env.src_root_dir.clone());
        invocation
    }
}
