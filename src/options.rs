//! Build configuration for one invocation.
//!
//! [`BuildOptions`] is created from defaults, mutated once by applying the
//! command-line [`BuildFlags`] and then only read. [`BuildSettings`] is the
//! half of it that decides the contents of the build directory and is
//! persisted between invocations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::env::{Checkout, Env};

/// The CPU architectures accepted for `--cpu`.
pub const VALID_CPUS: &[&str] = &["x86", "x64", "arm", "arm64", "mipsel", "mips64el"];

/// The package an Android build prefers to install as the system webview.
const PREFERRED_WEBVIEW_PACKAGE: &str = "com.chrome.canary";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOption {
    #[error("can only do debug OR release, not both")]
    DebugAndRelease,

    #[error("official builds cannot be component builds")]
    OfficialComponent,

    #[error("CFI build is release build only")]
    CfiDebug,

    #[error("CFI build is static build only")]
    CfiComponent,

    #[error("{os} must be one of {allowed:?}")]
    UnknownOs { os: String, allowed: Vec<String> },

    #[error("\"{0}\" is not a valid CPU, must be one of {cpus:?}", cpus = VALID_CPUS)]
    UnknownCpu(String),

    #[error("{0} only works on a release build")]
    SanitizerNeedsRelease(Sanitizer),

    #[error("can't do both TSan and ASan builds")]
    AsanAndTsan,

    #[error("must specify target cpu if {0} Android devices are attached")]
    AmbiguousAndroidCpu(usize),

    #[error("target CPU (\"{cpu}\") doesn't match default device (\"{device_cpu}\")")]
    DeviceCpuMismatch { cpu: String, device_cpu: String },

    #[error("unsupported Android release on device {0}")]
    UnsupportedAndroidRelease(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sanitizer {
    Asan,
    Tsan,
    Lsan,
    Msan,
}

impl Sanitizer {
    /// The suffix of the build directory name.
    pub fn suffix(self) -> &'static str {
        match self {
            Sanitizer::Asan => "-asan",
            Sanitizer::Tsan => "-tsan",
            Sanitizer::Lsan => "-lsan",
            Sanitizer::Msan => "-msan",
        }
    }
}

impl std::fmt::Display for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Sanitizer::Asan => "ASan",
            Sanitizer::Tsan => "TSan",
            Sanitizer::Lsan => "LSan",
            Sanitizer::Msan => "MSan",
        })
    }
}

/// The settings used to build a set of Chromium targets.
///
/// Mostly a superset of what is written to `args.gn`. A few values only
/// matter to this tool, such as the branch the build directory was last
/// generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    pub branch: Option<String>,
    pub dcheck_always_on: bool,
    pub enable_callgrind: bool,
    pub enable_cros_assistant: bool,
    pub enable_ipc_fuzzer: bool,
    pub enable_profiling: bool,
    pub goma_dir: Option<PathBuf>,
    pub is_asan: bool,
    pub is_cfi: bool,
    pub is_chrome_branded: bool,
    pub is_component_build: bool,
    pub is_debug: bool,
    pub is_lsan: bool,
    pub is_msan: bool,
    pub is_official_build: bool,
    pub is_tsan: bool,
    target_os: String,
    pub target_cpu: Option<String>,
    pub use_clang: bool,
    pub use_goma: bool,
    pub use_libfuzzer: bool,
    pub use_rtti: Option<bool>,
    pub v8_enable_verify_heap: bool,
    pub valgrind: bool,

    // Android only
    pub android_sdk_release: Option<String>,
    pub use_signing_keys: bool,
    pub system_webview_package_name: Option<String>,
}

impl BuildSettings {
    pub fn new(target_os: impl Into<String>) -> Self {
        let mut settings = Self {
            branch: None,
            dcheck_always_on: true,
            enable_callgrind: false,
            enable_cros_assistant: false,
            enable_ipc_fuzzer: false,
            enable_profiling: false,
            goma_dir: None,
            is_asan: false,
            is_cfi: false,
            is_chrome_branded: false,
            is_component_build: true,
            is_debug: true,
            is_lsan: false,
            is_msan: false,
            is_official_build: false,
            is_tsan: false,
            target_os: String::new(),
            target_cpu: None,
            use_clang: true,
            use_goma: true,
            use_libfuzzer: false,
            use_rtti: Some(false),
            v8_enable_verify_heap: false,
            valgrind: false,
            android_sdk_release: None,
            use_signing_keys: false,
            system_webview_package_name: None,
        };
        settings.set_target_os(target_os);
        settings
    }

    pub fn target_os(&self) -> &str {
        &self.target_os
    }

    /// Change the target OS, resetting the fields derived from it.
    ///
    /// The target CPU is cleared; it is never implied by the OS.
    pub fn set_target_os(&mut self, target_os: impl Into<String>) {
        self.target_os = target_os.into();
        self.target_cpu = None;
        if self.target_os == "android" {
            self.android_sdk_release = Some("p".into());
            self.use_signing_keys = true;
            self.system_webview_package_name = Some("com.google.android.webview".into());
            self.use_rtti = None;
        } else {
            self.android_sdk_release = None;
            self.use_signing_keys = false;
            self.system_webview_package_name = None;
            self.use_rtti = Some(false);
        }
    }

    /// The sanitizer named in the build directory. ASan implies LSan, so
    /// ASan takes precedence.
    pub fn sanitizer(&self) -> Option<Sanitizer> {
        if self.is_asan {
            Some(Sanitizer::Asan)
        } else if self.is_tsan {
            Some(Sanitizer::Tsan)
        } else if self.is_lsan {
            Some(Sanitizer::Lsan)
        } else if self.is_msan {
            Some(Sanitizer::Msan)
        } else {
            None
        }
    }
}

/// What the command line asked for, before validation.
///
/// `None` means the flag was not given and the default applies.
#[derive(Debug, Clone, Default)]
pub struct BuildFlags {
    pub debug: bool,
    pub release: bool,
    pub regenerate: bool,
    pub verbosity: u8,
    pub clobber: bool,
    pub noop: bool,
    pub no_run: bool,
    pub cfi: Option<bool>,
    pub asan: bool,
    pub tsan: bool,
    pub lsan: bool,
    pub msan: bool,
    pub component: Option<bool>,
    pub dcheck: Option<bool>,
    pub official: Option<bool>,
    pub branded: Option<bool>,
    pub goma: Option<bool>,
    pub os: Option<String>,
    pub cpu: Option<String>,
    pub profile: bool,
    pub jobs: Option<usize>,
    pub fuzzer: bool,
    pub valgrind: bool,
    pub debugger: bool,
    pub use_clang: Option<bool>,
    pub gtest: Option<String>,
    pub targets: Vec<String>,
    /// Everything after a bare `--`, passed to launched executables.
    pub run_args: Vec<String>,
}

/// The full configuration of one invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub settings: BuildSettings,
    pub env: Env,
    /// The OS the checkout builds for when none is requested.
    pub default_target_os: String,
    pub out_dir: PathBuf,
    pub jobs: usize,
    pub test_jobs: usize,
    /// Already colon-wrapped, see [`fixup_filter`].
    pub gtest_filter: Option<String>,
    pub profile: bool,
    pub profile_file: PathBuf,
    pub run_debugger: bool,
    pub run_args: Vec<String>,
    pub active_targets: Vec<String>,
    pub keep_going: bool,
    pub noop: bool,
    pub clobber: bool,
    /// Regenerate the build directory even if the settings are unchanged.
    pub regenerate: bool,
    pub run_targets: bool,
    pub print_cmds: bool,
    pub verbosity: u8,
    /// Serial of the Android device commands are run against.
    pub android_device: Option<String>,
}

impl BuildOptions {
    /// The defaults for a checkout, before any flag is applied.
    pub fn new(env: Env, checkout: &Checkout) -> Self {
        let default_target_os = checkout.default_target_os().to_string();
        let mut settings = BuildSettings::new(default_target_os.clone());
        settings.branch = env.branch.clone();
        settings.goma_dir = env.goma_dir.clone();
        settings.use_goma = env.goma_available;
        settings.use_clang = env.llvm_available;
        let jobs = (env.num_cpus * 120 / 100).max(1);

        Self {
            settings,
            default_target_os,
            out_dir: PathBuf::from("out"),
            jobs,
            test_jobs: jobs,
            gtest_filter: None,
            profile: false,
            profile_file: PathBuf::from("/tmp/cpuprofile"),
            run_debugger: false,
            run_args: vec![],
            active_targets: vec![],
            keep_going: true,
            noop: false,
            clobber: false,
            regenerate: false,
            run_targets: true,
            print_cmds: true,
            verbosity: 0,
            android_device: None,
            env,
        }
    }

    /// Apply the command-line flags to the defaults of a checkout.
    pub fn from_flags(
        env: Env,
        checkout: &Checkout,
        flags: &BuildFlags,
    ) -> Result<Self, InvalidOption> {
        let mut options = Self::new(env, checkout);
        options.apply(flags, checkout)?;
        Ok(options)
    }

    fn apply(&mut self, flags: &BuildFlags, checkout: &Checkout) -> Result<(), InvalidOption> {
        if flags.debug && flags.release {
            return Err(InvalidOption::DebugAndRelease);
        }
        let s = &mut self.settings;
        if flags.debug {
            s.is_debug = true;
        } else if flags.release {
            s.is_debug = false;
        }
        self.clobber = flags.clobber;
        self.regenerate = flags.regenerate || flags.clobber;
        self.verbosity = flags.verbosity;
        self.noop = flags.noop;
        self.run_targets = !flags.no_run;

        if let Some(dcheck) = flags.dcheck {
            s.dcheck_always_on = dcheck;
        }
        if let Some(branded) = flags.branded {
            s.is_chrome_branded = branded;
        }
        if let Some(component) = flags.component {
            s.is_component_build = component;
        }
        if let Some(goma) = flags.goma {
            s.use_goma = goma;
        }
        if let Some(official) = flags.official {
            s.is_official_build = official;
        }
        if s.is_official_build {
            match flags.component {
                Some(true) => return Err(InvalidOption::OfficialComponent),
                Some(false) => {}
                None => s.is_component_build = false,
            }
        }

        if let Some(use_clang) = flags.use_clang {
            s.use_clang = use_clang;
        }
        if s.use_clang && !self.env.llvm_available {
            warn!(path = %self.env.llvm_path.display(), "can't use clang, llvm path doesn't exist");
            s.use_clang = false;
        }
        if flags.valgrind {
            s.valgrind = true;
        }
        self.run_debugger = flags.debugger;
        if let Some(jobs) = flags.jobs {
            self.jobs = jobs;
        }

        if flags.fuzzer {
            s.use_libfuzzer = true;
            s.is_asan = true;
        }
        if flags.asan || flags.lsan {
            s.is_asan = true;
            s.is_lsan = true;
        }
        if flags.msan {
            s.is_msan = true;
        }
        if flags.tsan {
            s.is_tsan = true;
            s.is_component_build = false;
        }

        if let Some(cfi) = flags.cfi {
            s.is_cfi = cfi;
        }
        if s.is_cfi {
            if s.is_debug {
                return Err(InvalidOption::CfiDebug);
            }
            if s.is_component_build {
                return Err(InvalidOption::CfiComponent);
            }
        }

        if let Some(os) = &flags.os {
            if !checkout.supports(os) {
                return Err(InvalidOption::UnknownOs {
                    os: os.clone(),
                    allowed: checkout.target_os().to_vec(),
                });
            }
            s.set_target_os(os.as_str());
        }
        if s.target_os() == "android" {
            // Android component builds are broken (crbug.com/996285).
            s.is_component_build = false;
        }
        if let Some(cpu) = &flags.cpu {
            if !VALID_CPUS.contains(&cpu.as_str()) {
                return Err(InvalidOption::UnknownCpu(cpu.clone()));
            }
            s.target_cpu = Some(cpu.clone());
        }

        if s.is_asan {
            s.is_component_build = false;
        }
        for (enabled, sanitizer) in [
            (s.is_asan, Sanitizer::Asan),
            (s.is_msan, Sanitizer::Msan),
            (s.is_tsan, Sanitizer::Tsan),
        ] {
            if enabled && s.is_debug {
                return Err(InvalidOption::SanitizerNeedsRelease(sanitizer));
            }
        }
        if s.is_tsan && s.is_asan {
            return Err(InvalidOption::AsanAndTsan);
        }

        self.profile = flags.profile;
        self.gtest_filter = fixup_filter(flags.gtest.as_deref());
        self.active_targets = flags.targets.clone();
        self.run_args = flags.run_args.clone();

        if self.settings.target_os() == "android" {
            self.select_android_device()?;
        }
        Ok(())
    }

    /// Pick the device to run against and derive the CPU and webview package
    /// from it.
    fn select_android_device(&mut self) -> Result<(), InvalidOption> {
        let devices = &self.env.android_devices;
        let settings = &mut self.settings;

        if settings.target_cpu.is_none() {
            match devices.len() {
                0 => warn!("no Android device attached and no target CPU given"),
                1 => settings.target_cpu = Some(devices[0].cpu().to_string()),
                n => return Err(InvalidOption::AmbiguousAndroidCpu(n)),
            }
        }

        let Some(device) = default_device(devices, settings.target_cpu.as_deref()) else {
            return Ok(());
        };
        let device_cpu = device.cpu();
        if settings.target_cpu.as_deref() != Some(device_cpu) {
            return Err(InvalidOption::DeviceCpuMismatch {
                cpu: settings.target_cpu.clone().unwrap_or_default(),
                device_cpu: device_cpu.to_string(),
            });
        }
        settings.system_webview_package_name = Some(system_webview_package_name(device)?);
        self.android_device = Some(device.name.clone());
        Ok(())
    }
}

/// Normalize a `--gtest_filter` value.
///
/// Empty filters are dropped, and the value is wrapped in colons: googletest
/// should not need them, but in practice filters only match with them.
pub fn fixup_filter(val: Option<&str>) -> Option<String> {
    let val = val?;
    if val.trim().is_empty() {
        return None;
    }
    let mut ret = String::with_capacity(val.len() + 2);
    if !val.starts_with(':') {
        ret.push(':');
    }
    ret.push_str(val);
    if !val.ends_with(':') {
        ret.push(':');
    }
    Some(ret)
}

/// An attached Android device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// The serial, as listed by `adb devices`.
    pub name: String,
    pub api_level: u32,
    pub abi: String,
    pub packages: Vec<String>,
}

impl DeviceInfo {
    /// The GN CPU name matching the device ABI.
    pub fn cpu(&self) -> &str {
        match self.abi.as_str() {
            "arm64-v8a" => "arm64",
            "armeabi-v7a" | "armeabi" => "arm",
            "x86_64" => "x64",
            "x86" => "x86",
            other => other,
        }
    }

    pub fn is_emulator(&self) -> bool {
        self.name.starts_with("emulator-")
    }

    pub fn has_gms(&self) -> bool {
        self.packages.iter().any(|p| p == "com.google.android.gms")
    }

    /// The first letter of the Android release code name.
    pub fn release_letter(&self) -> Option<char> {
        let letter = match self.api_level {
            16..=18 => 'J',
            19 | 20 => 'K',
            21 | 22 => 'L',
            23 => 'M',
            24 | 25 => 'N',
            26 | 27 => 'O',
            28 => 'P',
            29 => 'Q',
            30 => 'R',
            31 | 32 => 'S',
            33 => 'T',
            34 => 'U',
            35.. => 'V',
            _ => return None,
        };
        Some(letter)
    }
}

/// The device commands run against: the only one attached, else the first
/// emulator for x86 builds or the first physical device for ARM builds.
fn default_device<'a>(devices: &'a [DeviceInfo], cpu: Option<&str>) -> Option<&'a DeviceInfo> {
    if let [only] = devices {
        return Some(only);
    }
    devices.iter().find(|device| match cpu {
        Some("arm" | "arm64") => !device.is_emulator(),
        Some("x86" | "x64") => device.is_emulator(),
        _ => false,
    })
}

/// The webview packages a device accepts as system webview provider.
fn allowed_webview_packages(device: &DeviceInfo) -> Result<Vec<&'static str>, InvalidOption> {
    let letter = device
        .release_letter()
        .ok_or_else(|| InvalidOption::UnsupportedAndroidRelease(device.name.clone()))?;
    let packages = match letter {
        'K' => vec!["com.android.webview"],
        'L'..='M' if device.has_gms() => vec!["com.google.android.webview"],
        'N'..='P' if device.has_gms() => vec![
            "com.android.chrome",
            "com.chrome.beta",
            "com.chrome.dev",
            "com.chrome.canary",
            "com.google.android.apps.chrome",
            "com.google.android.webview",
        ],
        'L'.. => vec!["com.android.webview"],
        _ => return Err(InvalidOption::UnsupportedAndroidRelease(device.name.clone())),
    };
    Ok(packages)
}

fn system_webview_package_name(device: &DeviceInfo) -> Result<String, InvalidOption> {
    let allowed = allowed_webview_packages(device)?;
    if allowed.contains(&PREFERRED_WEBVIEW_PACKAGE) {
        return Ok(PREFERRED_WEBVIEW_PACKAGE.to_string());
    }
    Ok(allowed[0].to_string())
}
