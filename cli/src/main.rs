use std::{
    ffi::OsString,
    path::PathBuf,
    time::Instant,
};

use anyhow::{Context, anyhow};
use clap::{CommandFactory, FromArgMatches};
use crbuild::{
    BuildOptions, Builder, Checkout, ConfigReader, Env, progress::DumbConsoleProgress,
    world::LOCAL_WORLD,
};
use crbuild_cli::{
    cli::{Args, config_arg},
    report,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

static CONFIG_FILE_NAME: &str = "crbuild.toml";
static API_KEYS_FILE_NAME: &str = "api_keys.txt";

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1);
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let start = Instant::now();
    let argv: Vec<OsString> = std::env::args_os().collect();

    let config_path = match config_arg(&argv) {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = ConfigReader::read(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let matches = Args::command()
        .after_help(report::target_epilog(&config))
        .get_matches_from(argv);
    let args = Args::from_arg_matches(&matches)?;
    init_tracing(args.verbose);
    debug!(config = %config_path.display(), "loaded configuration");

    let cwd = std::env::current_dir().context("failed to get the current directory")?;
    let mut env = Env::discover(&cwd).context("failed to inspect the Chromium checkout")?;
    env.api_keys_path = config_path
        .parent()
        .map(|dir| dir.join(API_KEYS_FILE_NAME));
    let checkout =
        Checkout::read(&env.gclient_path()).context("failed to read the .gclient file")?;
    debug!(target_os = ?checkout.target_os(), branch = ?env.branch, "read checkout");
    std::env::set_current_dir(&env.src_root_dir).with_context(|| {
        format!("failed to change directory to {}", env.src_root_dir.display())
    })?;

    debug!(dir = %env.src_root_dir.display(), "changed into the source root");

    let options = BuildOptions::from_flags(env, &checkout, &args.to_flags())?;
    let progress = DumbConsoleProgress::new(options.print_cmds);
    let builder = Builder::new(&LOCAL_WORLD, &progress, &options, &config);
    let failures = builder.execute()?;

    let duration = report::format_duration(start.elapsed());
    if failures.is_empty() {
        println!();
        println!("All tasks completed successfully. Duration: {duration}");
        return Ok(0);
    }
    eprint!("{}", report::failure_report(&failures));
    println!();
    println!("Run duration: {duration}");
    Ok(report::exit_code(&failures))
}

/// `crbuild.toml` next to the executable.
fn default_config_path() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to locate the executable")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow!("executable has no parent directory"))?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
