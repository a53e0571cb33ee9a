use std::path::{Path, PathBuf};

use crbuild::{
    BuildFlags, BuildSettings,
    gn::{Gn, GnArgs},
    settings::SettingsStore,
    world::LOCAL_WORLD,
};

use crate::mock::{MockWorld, SRC_ROOT, default_options, options_with, test_env};

mod mock;

#[test]
fn parse_skips_comments_and_last_write_wins() {
    let args = GnArgs::parse(
        "# Build arguments go here.\n\
         \n\
         is_debug = true\n\
         target_os = \"android\"\n\
         \x20 # indented comment\n\
         not an assignment\n\
         is_debug = false\n\
         extra_cflags = \"-DFOO=1\"\n",
    );
    assert_eq!(args.len(), 3);
    assert_eq!(args.get("is_debug"), Some("false"));
    assert_eq!(args.get("target_os"), Some("\"android\""));
    assert_eq!(args.get("extra_cflags"), Some("\"-DFOO=1\""));
}

#[test]
fn render_is_sorted_after_the_header() {
    let mut args = GnArgs::new();
    args.insert("use_goma", "false");
    args.insert("is_debug", "true");
    let text = args.render();
    assert!(text.starts_with("# Build arguments go here."));
    assert!(text.ends_with("\nis_debug = true\nuse_goma = false\n"), "{text}");
    assert_eq!(GnArgs::parse(&text), args);
}

#[test]
fn args_for_default_settings() {
    let options = default_options();
    let args = GnArgs::from_settings(&options.settings, &options.env);
    let expected = [
        ("dcheck_always_on", "true"),
        ("enable_ipc_fuzzer", "false"),
        ("enable_nacl", "false"),
        ("is_chrome_branded", "false"),
        ("is_clang", "false"),
        ("is_component_build", "true"),
        ("is_debug", "true"),
        ("is_official_build", "false"),
        ("target_os", "\"linux\""),
        ("use_goma", "false"),
        ("use_rtti", "false"),
        ("v8_enable_verify_heap", "false"),
    ];
    assert_eq!(args.iter().collect::<Vec<_>>(), expected);
}

#[test]
fn args_for_asan_builds() {
    let options = options_with(BuildFlags {
        release: true,
        asan: true,
        cpu: Some("x64".into()),
        ..Default::default()
    })
    .unwrap();
    let args = GnArgs::from_settings(&options.settings, &options.env);
    assert_eq!(args.get("is_asan"), Some("true"));
    assert_eq!(args.get("is_lsan"), Some("true"));
    assert_eq!(args.get("is_tsan"), None);
    assert_eq!(args.get("is_component_build"), Some("false"));
    assert_eq!(args.get("symbol_level"), Some("1"));
    assert_eq!(args.get("enable_full_stack_frames_for_profiling"), Some("true"));
    assert_eq!(args.get("strip_absolute_paths_from_debug_symbols"), Some("true"));
    assert_eq!(args.get("target_cpu"), Some("\"x64\""));
}

#[test]
fn args_for_android() {
    let options = options_with(BuildFlags {
        os: Some("android".into()),
        ..Default::default()
    })
    .unwrap();
    let args = GnArgs::from_settings(&options.settings, &options.env);
    assert_eq!(args.get("target_os"), Some("\"android\""));
    assert_eq!(args.get("android_sdk_release"), Some("\"p\""));
    assert_eq!(
        args.get("system_webview_package_name"),
        Some("\"com.google.android.webview\"")
    );
    assert_eq!(args.get("use_signing_keys"), Some("true"));
    assert_eq!(args.get("use_rtti"), None);
}

#[test]
fn args_for_official_cfi_and_windows() {
    let mut settings = BuildSettings::new("win");
    settings.is_debug = false;
    settings.is_official_build = true;
    settings.is_cfi = true;
    settings.use_goma = true;
    settings.goma_dir = Some(PathBuf::from("/goma"));
    let env = crbuild::Env::with_platform(SRC_ROOT, "win", Some("/home/user".into()));

    let args = GnArgs::from_settings(&settings, &env);
    assert_eq!(args.get("symbol_level"), Some("2"));
    assert_eq!(args.get("is_win_fastlink"), Some("true"));
    assert_eq!(args.get("goma_dir"), Some("\"/goma\""));
    // CFI is not applied to official builds.
    assert_eq!(args.get("is_cfi"), None);

    settings.is_official_build = false;
    let args = GnArgs::from_settings(&settings, &env);
    assert_eq!(args.get("symbol_level"), Some("1"));
    for key in ["is_cfi", "use_cfi_cast", "use_cfi_diag", "use_thin_lto"] {
        assert_eq!(args.get(key), Some("true"), "{key}");
    }
}

#[test]
fn chromeos_merges_api_keys() {
    let world = MockWorld::new();
    let mut env = test_env();
    env.api_keys_path = Some(PathBuf::from("/config/api_keys.txt"));
    let mut settings = BuildSettings::new("chromeos");
    let gn = Gn::new(&world, &env, "out/Debug-chromeos");

    // Missing keys file is fine.
    assert_eq!(gn.compute_args(&settings).unwrap().get("google_api_key"), None);

    world.put_file(
        "/config/api_keys.txt",
        "google_api_key = \"abc\"\ngoogle_default_client_id = \"id\"\n",
    );
    let args = gn.compute_args(&settings).unwrap();
    assert_eq!(args.get("google_api_key"), Some("\"abc\""));
    assert_eq!(args.get("google_default_client_id"), Some("\"id\""));

    settings.set_target_os("linux");
    assert_eq!(gn.compute_args(&settings).unwrap().get("google_api_key"), None);
}

#[test]
fn args_file_round_trip_through_the_world() {
    let world = MockWorld::new();
    let env = test_env();
    let gn = Gn::new(&world, &env, "out/Debug");
    assert_eq!(
        gn.args_path(),
        Path::new(SRC_ROOT).join("out/Debug/args.gn")
    );
    assert_eq!(gn.read_args().unwrap(), None);

    let mut args = GnArgs::new();
    args.insert("is_debug", "true");
    gn.write_args(&args).unwrap();
    assert_eq!(gn.read_args().unwrap(), Some(args));

    let invocation = gn.generate_invocation();
    assert_eq!(invocation.argv, ["gn", "gen", "out/Debug"]);
    assert!(!invocation.shell);
    assert_eq!(invocation.cwd.as_deref(), Some(Path::new(SRC_ROOT)));
}

#[test]
fn settings_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(&LOCAL_WORLD, dir.path());
    assert_eq!(store.load(), None);

    let mut settings = default_options().settings;
    settings.branch = Some("main".into());
    settings.target_cpu = Some("x64".into());
    store.store(&settings).unwrap();
    assert_eq!(store.load(), Some(settings.clone()));

    settings.is_debug = false;
    assert_ne!(store.load(), Some(settings));

    store.remove().unwrap();
    assert_eq!(store.load(), None);
    // Removing twice is fine.
    store.remove().unwrap();
}

#[test]
fn corrupt_snapshot_is_treated_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(&LOCAL_WORLD, dir.path());
    std::fs::write(store.path(), b"\xff\xff\xff\xff").unwrap();
    assert_eq!(store.load(), None);
}
