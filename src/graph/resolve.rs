//! Resolution of build targets and run commands against build options.
//!
//! Each resolution call memoizes per-target results, so a target reachable
//! through several edges is only resolved once.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexSet;
use smol_str::SmolStr;
use tracing::{debug, trace};

use super::{Configuration, Target, TargetId};
use crate::{
    command::{RunCommand, RunCommands, Variant},
    options::BuildOptions,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no target named \"{0}\"")]
    NotFound(String),

    #[error("target {0} has no default run command")]
    NoDefaultRunCommand(SmolStr),

    /// The commands of a target with runnable upstream targets may only add
    /// arguments to them.
    #[error("target {target} can only supplement upstream commands with arguments: {reason}")]
    InvalidSupplement {
        target: SmolStr,
        reason: &'static str,
    },
}

impl Configuration {
    /// The build-tool targets needed to build `name` and everything
    /// upstream of it.
    pub fn get_build_targets(
        &self,
        name: &str,
        options: &BuildOptions,
    ) -> Result<BTreeSet<SmolStr>, ResolveError> {
        let id = self
            .lookup(name)
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
        Ok(Resolver::new(self, options).build_targets(id))
    }

    /// The commands to run for `name`, not yet expanded.
    pub fn get_run_commands(
        &self,
        name: &str,
        options: &BuildOptions,
    ) -> Result<Vec<RunCommand>, ResolveError> {
        let id = self
            .lookup(name)
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
        let mut commands = Resolver::new(self, options).run_commands(id)?;
        add_gtest_filter(&mut commands, options);
        Ok(commands)
    }

    /// The union of the build targets of every name in `names`.
    ///
    /// Names missing from the configuration are taken to be targets defined
    /// only in the GN files and contribute themselves.
    pub fn build_targets<S: AsRef<str>>(
        &self,
        names: &[S],
        options: &BuildOptions,
    ) -> BTreeSet<SmolStr> {
        let mut resolver = Resolver::new(self, options);
        let mut targets = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            match self.lookup(name) {
                Some(id) => targets.extend(resolver.build_targets(id)),
                None => {
                    debug!(name, "not in configuration, assuming a GN target");
                    targets.insert(SmolStr::new(name));
                }
            }
        }
        targets
    }

    /// The run commands of every name in `names`, in request order. A
    /// command reached through more than one name is only returned once.
    pub fn run_commands<S: AsRef<str>>(
        &self,
        names: &[S],
        options: &BuildOptions,
    ) -> Result<Vec<RunCommand>, ResolveError> {
        let mut resolver = Resolver::new(self, options);
        let mut commands = IndexSet::new();
        for name in names {
            let name = name.as_ref();
            let Some(id) = self.lookup(name) else {
                debug!(name, "not in configuration, nothing to run");
                continue;
            };
            commands.extend(resolver.run_commands(id)?);
        }
        let mut commands: Vec<_> = commands.into_iter().collect();
        add_gtest_filter(&mut commands, options);
        Ok(commands)
    }
}

fn add_gtest_filter(commands: &mut [RunCommand], options: &BuildOptions) {
    if let Some(filter) = &options.gtest_filter {
        for command in commands {
            command.args.push(format!("--gtest_filter={filter}"));
        }
    }
}

struct Resolver<'a> {
    config: &'a Configuration,
    options: &'a BuildOptions,
    build_targets: HashMap<TargetId, BTreeSet<SmolStr>>,
    run_commands: HashMap<TargetId, Vec<RunCommand>>,
}

impl<'a> Resolver<'a> {
    fn new(config: &'a Configuration, options: &'a BuildOptions) -> Self {
        Self {
            config,
            options,
            build_targets: HashMap::new(),
            run_commands: HashMap::new(),
        }
    }

    fn target(&self, id: TargetId) -> &'a Target {
        // IDs are only handed out by the configuration itself.
        &self.config.targets[id.0]
    }

    fn build_targets(&mut self, id: TargetId) -> BTreeSet<SmolStr> {
        if let Some(targets) = self.build_targets.get(&id) {
            return targets.clone();
        }
        let target = self.target(id);
        let mut targets = BTreeSet::new();
        for reference in &target.upstream_targets {
            if reference.condition_met(self.options) {
                targets.extend(self.build_targets(reference.target));
            }
        }
        if target.reference_self {
            targets.insert(target.name.clone());
        }
        self.build_targets.insert(id, targets.clone());
        targets
    }

    fn run_commands(&mut self, id: TargetId) -> Result<Vec<RunCommand>, ResolveError> {
        if let Some(commands) = self.run_commands.get(&id) {
            return Ok(commands.clone());
        }
        let target = self.target(id);
        let mut upstream = vec![];
        for reference in &target.upstream_targets {
            if reference.build_only || !reference.condition_met(self.options) {
                continue;
            }
            upstream.extend(self.run_commands(reference.target)?);
        }

        let commands = match &target.run_commands {
            None => upstream,
            Some(own) if upstream.is_empty() => select_variant(target, own, self.options)?.to_vec(),
            Some(own) => match select_variant(target, own, self.options) {
                Ok(supplement) => supplement_args(target, supplement, upstream)?,
                Err(ResolveError::NoDefaultRunCommand(_)) => {
                    trace!(target = %target.name, "no supplemental arguments");
                    upstream
                }
                Err(e) => return Err(e),
            },
        };
        self.run_commands.insert(id, commands.clone());
        Ok(commands)
    }
}

/// Pick the run commands of the highest-priority variant applicable to
/// `options`.
fn select_variant<'t>(
    target: &Target,
    own: &'t RunCommands,
    options: &BuildOptions,
) -> Result<&'t [RunCommand], ResolveError> {
    Variant::preference(options)
        .into_iter()
        .find_map(|variant| own.get(&variant))
        .map(Vec::as_slice)
        .ok_or_else(|| ResolveError::NoDefaultRunCommand(target.name.clone()))
}

/// Append the arguments of a target's own command to each upstream command.
fn supplement_args(
    target: &Target,
    supplement: &[RunCommand],
    upstream: Vec<RunCommand>,
) -> Result<Vec<RunCommand>, ResolveError> {
    let invalid = |reason| ResolveError::InvalidSupplement {
        target: target.name.clone(),
        reason,
    };
    let [supplement] = supplement else {
        return Err(invalid("exactly one command expected"));
    };
    if !supplement.commands.is_empty() {
        return Err(invalid("commands are not allowed"));
    }
    if supplement.args.is_empty() {
        return Err(invalid("no arguments given"));
    }
    Ok(upstream
        .into_iter()
        .map(|command| command.with_args(supplement.args.iter().cloned()))
        .collect())
}
