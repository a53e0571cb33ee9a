use crbuild::{
    BuildOptions, ConfigBuilder, Configuration, RunCommand, Target, TargetReference, Variant,
    command::RunCommands,
    graph::{Condition, ConditionOp, ConfigError, ResolveError},
    options::fixup_filter,
};

use crate::mock::default_options;

mod mock;

fn commands(variants: impl IntoIterator<Item = (Variant, Vec<RunCommand>)>) -> RunCommands {
    variants.into_iter().collect()
}

fn default_cmd(tokens: &[&str]) -> RunCommands {
    commands([(Variant::Default, vec![RunCommand::new(tokens.iter().copied())])])
}

fn names(targets: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    targets.into_iter().map(|t| t.as_ref().to_string()).collect()
}

fn cmd_lines(commands: &[RunCommand]) -> Vec<Vec<String>> {
    commands.iter().map(RunCommand::cmd_line).collect()
}

/// `top` depends on `upstream` through the given edge shape.
fn two_level(
    upstream: Target,
    top: Target,
    edge: impl FnOnce(TargetReference) -> TargetReference,
) -> Configuration {
    let mut b = ConfigBuilder::new();
    let up = b.add_target(upstream).unwrap();
    let top = b.add_target(top).unwrap();
    b.add_upstream(top, edge(TargetReference::new(up))).unwrap();
    b.build().unwrap()
}

#[test]
fn lone_target_builds_itself() {
    let mut b = ConfigBuilder::new();
    b.add_target(Target::new("chrome")).unwrap();
    let config = b.build().unwrap();

    let targets = config.get_build_targets("chrome", &default_options()).unwrap();
    assert_eq!(names(targets), ["chrome"]);
}

#[test]
fn meta_target_does_not_build_itself() {
    let config = two_level(
        Target::new("base_unittests"),
        Target::new("all").with_reference_self(false),
        |r| r,
    );
    let targets = config.get_build_targets("all", &default_options()).unwrap();
    assert_eq!(names(targets), ["base_unittests"]);
}

#[test]
fn conditional_upstream_follows_target_os() {
    let mut b = ConfigBuilder::new();
    let a = b.add_target(Target::new("a")).unwrap();
    let l = b.add_target(Target::new("linux_only")).unwrap();
    let top = b
        .add_target(Target::new("top").with_reference_self(false))
        .unwrap();
    b.add_upstream(top, TargetReference::new(a)).unwrap();
    b.add_upstream(
        top,
        TargetReference::new(l).with_condition("OS==linux".parse().unwrap()),
    )
    .unwrap();
    let config = b.build().unwrap();

    let mut options = default_options();
    let targets = config.get_build_targets("top", &options).unwrap();
    assert_eq!(names(targets), ["a", "linux_only"]);

    options.settings.set_target_os("win");
    let targets = config.get_build_targets("top", &options).unwrap();
    assert_eq!(names(targets), ["a"]);
}

#[test]
fn conditions_also_filter_run_commands() {
    let config = two_level(
        Target::new("shell").with_run_commands(default_cmd(&["sh"])),
        Target::new("top").with_reference_self(false),
        |r| r.with_condition(Condition::target_os(ConditionOp::Ne, "linux")),
    );
    let mut options = default_options();
    assert!(config.get_run_commands("top", &options).unwrap().is_empty());

    options.settings.set_target_os("android");
    let cmds = config.get_run_commands("top", &options).unwrap();
    assert_eq!(cmd_lines(&cmds), [["sh"]]);
}

#[test]
fn build_only_upstream_contributes_no_run_commands() {
    let config = two_level(
        Target::new("helper").with_run_commands(default_cmd(&["helper"])),
        Target::new("app").with_run_commands(default_cmd(&["app", "--x"])),
        |r| r.build_only(true),
    );
    let options = default_options();

    let cmds = config.get_run_commands("app", &options).unwrap();
    assert_eq!(cmd_lines(&cmds), [["app", "--x"]]);
    let targets = config.get_build_targets("app", &options).unwrap();
    assert_eq!(names(targets), ["app", "helper"]);
}

#[test]
fn supplemental_args_are_appended_to_upstream_commands() {
    let upstream = RunCommand::new(["X"]).with_args(["--flag1"]);
    let config = two_level(
        Target::new("x").with_run_commands(commands([(Variant::Default, vec![upstream])])),
        Target::new("x_with_flag").with_run_commands(commands([(
            Variant::Default,
            vec![RunCommand::args_only(["--flag2"])],
        )])),
        |r| r,
    );

    let cmds = config
        .get_run_commands("x_with_flag", &default_options())
        .unwrap();
    assert_eq!(cmd_lines(&cmds), [["X", "--flag1", "--flag2"]]);
    // The upstream target itself is unaffected.
    let cmds = config.get_run_commands("x", &default_options()).unwrap();
    assert_eq!(cmd_lines(&cmds), [["X", "--flag1"]]);
}

#[test]
fn missing_supplement_variant_is_not_an_error() {
    let config = two_level(
        Target::new("x").with_run_commands(default_cmd(&["X"])),
        Target::new("x_asan_only").with_run_commands(commands([(
            Variant::Asan,
            vec![RunCommand::args_only(["--asan-flag"])],
        )])),
        |r| r,
    );
    let cmds = config
        .get_run_commands("x_asan_only", &default_options())
        .unwrap();
    assert_eq!(cmd_lines(&cmds), [["X"]]);
}

#[test]
fn supplement_with_a_command_is_rejected() {
    let config = two_level(
        Target::new("x").with_run_commands(default_cmd(&["X"])),
        Target::new("y").with_run_commands(default_cmd(&["Y"])),
        |r| r,
    );
    let err = config.get_run_commands("y", &default_options()).unwrap_err();
    assert!(matches!(err, ResolveError::InvalidSupplement { .. }), "{err:?}");
}

#[test]
fn missing_default_variant_is_an_error_for_primary_lookup() {
    let mut b = ConfigBuilder::new();
    b.add_target(Target::new("fuzzer").with_run_commands(commands([(
        Variant::Asan,
        vec![RunCommand::new(["fuzz"])],
    )])))
    .unwrap();
    let config = b.build().unwrap();

    let err = config
        .get_run_commands("fuzzer", &default_options())
        .unwrap_err();
    assert_eq!(err, ResolveError::NoDefaultRunCommand("fuzzer".into()));
}

#[test]
fn variant_priority_is_asan_profile_debug_default() {
    let variants = commands(Variant::ALL.map(|v| (v, vec![RunCommand::new([v.name()])])));
    let mut b = ConfigBuilder::new();
    b.add_target(Target::new("chrome").with_run_commands(variants))
        .unwrap();
    let config = b.build().unwrap();
    let selected =
        |options: &BuildOptions| cmd_lines(&config.get_run_commands("chrome", options).unwrap());

    let mut options = default_options();
    assert_eq!(selected(&options), [["default"]]);
    options.run_debugger = true;
    assert_eq!(selected(&options), [["debug"]]);
    options.profile = true;
    assert_eq!(selected(&options), [["profile"]]);
    options.settings.is_asan = true;
    assert_eq!(selected(&options), [["asan"]]);
}

#[test]
fn gtest_filter_is_appended_to_every_command() {
    let config = two_level(
        Target::new("base_unittests").with_run_commands(default_cmd(&["base_unittests"])),
        Target::new("tests").with_reference_self(false),
        |r| r,
    );
    let mut options = default_options();
    options.gtest_filter = fixup_filter(Some("Foo.Bar"));

    let cmds = config.get_run_commands("tests", &options).unwrap();
    assert_eq!(
        cmd_lines(&cmds),
        [["base_unittests", "--gtest_filter=:Foo.Bar:"]]
    );
}

#[test]
fn target_without_run_commands_is_not_runnable() {
    let mut b = ConfigBuilder::new();
    b.add_target(Target::new("chrome")).unwrap();
    let config = b.build().unwrap();
    assert!(
        config
            .get_run_commands("chrome", &default_options())
            .unwrap()
            .is_empty()
    );
}

#[test]
fn duplicate_target_keeps_the_first() {
    let mut b = ConfigBuilder::new();
    let mut first = Target::new("chrome");
    first.title = Some("first".into());
    b.add_target(first).unwrap();

    let mut second = Target::new("chrome");
    second.title = Some("second".into());
    let err = b.add_target(second).unwrap_err();
    assert_eq!(err, ConfigError::DuplicateTarget("chrome".into()));

    let config = b.build().unwrap();
    assert_eq!(config.len(), 1);
    assert_eq!(
        config.get_target("chrome").unwrap().title.as_deref(),
        Some("first")
    );
}

#[test]
fn cycle_is_rejected_when_the_edge_is_added() {
    let mut b = ConfigBuilder::new();
    let a = b.add_target(Target::new("a")).unwrap();
    let bb = b.add_target(Target::new("b")).unwrap();
    b.add_upstream(a, TargetReference::new(bb)).unwrap();

    let err = b.add_upstream(bb, TargetReference::new(a)).unwrap_err();
    assert_eq!(
        err,
        ConfigError::Cycle {
            target: "b".into(),
            upstream: "a".into()
        }
    );
    // The graph is still usable.
    assert!(b.build().is_ok());
}

#[test]
fn self_edge_is_a_cycle() {
    let mut b = ConfigBuilder::new();
    let a = b.add_target(Target::new("a")).unwrap();
    let err = b.add_upstream(a, TargetReference::new(a)).unwrap_err();
    assert!(matches!(err, ConfigError::Cycle { .. }));
}

#[test]
fn placeholder_is_upgraded_in_place() {
    let mut b = ConfigBuilder::new();
    let top = b.add_target(Target::new("top")).unwrap();
    let forward = b.placeholder("later");
    b.add_upstream(top, TargetReference::new(forward)).unwrap();
    assert!(!b.target(forward).unwrap().explicit);

    let id = b
        .add_target(Target::new("later").with_run_commands(default_cmd(&["later"])))
        .unwrap();
    assert_eq!(id, forward);
    assert!(b.target(id).unwrap().explicit);

    let config = b.build().unwrap();
    let cmds = config.get_run_commands("top", &default_options()).unwrap();
    assert_eq!(cmd_lines(&cmds), [["later"]]);
}

#[test]
fn placeholder_edges_survive_the_upgrade() {
    let mut b = ConfigBuilder::new();
    let leaf = b
        .add_target(Target::new("leaf").with_run_commands(default_cmd(&["leaf"])))
        .unwrap();
    let forward = b.placeholder("group");
    b.add_upstream(forward, TargetReference::new(leaf)).unwrap();

    b.add_target(Target::new("group").with_reference_self(false))
        .unwrap();
    let config = b.build().unwrap();
    assert_eq!(config.get_target("group").unwrap().upstream_targets.len(), 1);
    let cmds = config.get_run_commands("group", &default_options()).unwrap();
    assert_eq!(cmd_lines(&cmds), [["leaf"]]);
}

#[test]
fn upgrading_a_placeholder_can_not_close_a_cycle() {
    let mut b = ConfigBuilder::new();
    let forward = b.placeholder("b");
    let a = b
        .add_target(Target::new("a").with_upstream(TargetReference::new(forward)))
        .unwrap();
    let err = b
        .add_target(Target::new("b").with_upstream(TargetReference::new(a)))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Cycle { .. }));
}

#[test]
fn diamond_is_run_once_per_invocation() {
    let mut b = ConfigBuilder::new();
    let base = b
        .add_target(Target::new("base").with_run_commands(default_cmd(&["base"])))
        .unwrap();
    let left = b.add_target(Target::new("left")).unwrap();
    let right = b.add_target(Target::new("right")).unwrap();
    let top = b.add_target(Target::new("top")).unwrap();
    b.add_upstream(left, TargetReference::new(base)).unwrap();
    b.add_upstream(right, TargetReference::new(base)).unwrap();
    b.add_upstream(top, TargetReference::new(left)).unwrap();
    b.add_upstream(top, TargetReference::new(right)).unwrap();
    let config = b.build().unwrap();
    let options = default_options();

    let targets = config.get_build_targets("top", &options).unwrap();
    assert_eq!(names(targets), ["base", "left", "right", "top"]);

    let cmds = config.run_commands(&["top", "base"], &options).unwrap();
    assert_eq!(cmd_lines(&cmds), [["base"]]);
}

#[test]
fn names_outside_the_configuration() {
    let mut b = ConfigBuilder::new();
    let mut shell = Target::new("shell").with_run_commands(default_cmd(&["sh"]));
    shell.run_only = true;
    b.add_target(shell).unwrap();
    let config = b.build().unwrap();
    let options = default_options();

    let targets = config.build_targets(&["shell", "gn_only_target"], &options);
    assert_eq!(names(targets), ["gn_only_target", "shell"]);
    assert!(config.is_run_only("shell"));
    assert!(!config.is_run_only("gn_only_target"));

    let cmds = config.run_commands(&["gn_only_target", "shell"], &options).unwrap();
    assert_eq!(cmd_lines(&cmds), [["sh"]]);

    let err = config.get_target("gn_only_target").unwrap_err();
    assert_eq!(err, ResolveError::NotFound("gn_only_target".into()));
}

#[test]
fn condition_parsing() {
    let c: Condition = "OS==linux".parse().unwrap();
    assert_eq!(c, Condition::target_os(ConditionOp::Eq, "linux"));
    let c: Condition = "OS != win ".parse().unwrap();
    assert_eq!(c, Condition::target_os(ConditionOp::Ne, "win"));
    assert_eq!(c.to_string(), "OS!=win");

    for bad in ["CPU==x86", "OS==", "OS=linux", "linux"] {
        assert!(bad.parse::<Condition>().is_err(), "{bad}");
    }
}
