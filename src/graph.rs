//! The target graph: named targets, their upstream edges and run commands.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use petgraph::prelude::DiGraphMap;
use smol_str::SmolStr;

use crate::{command::RunCommands, options::BuildOptions};

mod resolve;
pub use resolve::ResolveError;

/// The whole target graph.
///
/// This type is immutable. To build it, use [`ConfigBuilder`].
#[derive(Default, Debug)]
pub struct Configuration {
    targets: IndexMap<SmolStr, Target>,
    /// Edges point from a target to its upstream targets.
    graph: DiGraphMap<TargetId, ()>,
}

impl Configuration {
    pub fn targets(&self) -> impl Iterator<Item = (TargetId, &Target)> {
        self.targets
            .values()
            .enumerate()
            .map(|(i, t)| (TargetId(i), t))
    }

    pub fn lookup(&self, name: &str) -> Option<TargetId> {
        self.targets.get_index_of(name).map(TargetId)
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get_index(id.0).map(|(_, t)| t)
    }

    pub fn get_target(&self, name: &str) -> Result<&Target, ResolveError> {
        self.targets
            .get(name)
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Whether `name` is a target that has no build-tool counterpart.
    /// Names not in the configuration are not run-only.
    pub fn is_run_only(&self, name: &str) -> bool {
        self.targets.get(name).is_some_and(|t| t.run_only)
    }

    pub fn upstream_of(&self, id: TargetId) -> impl Iterator<Item = TargetId> + '_ {
        self.graph
            .neighbors_directed(id, petgraph::Direction::Outgoing)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The builder of a [`Configuration`].
///
/// This builder is append-only: targets and edges can't be removed. Cycles
/// are rejected when the offending edge is added.
#[derive(Default, Debug)]
pub struct ConfigBuilder {
    config: Configuration,
}

/// An index that uniquely identifies a target in a [`Configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl ConfigBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register an explicitly defined target, including its upstream edges.
    ///
    /// If the name is only known as a placeholder created by a forward
    /// reference, the placeholder is filled in and keeps its ID.
    pub fn add_target(&mut self, mut target: Target) -> Result<TargetId, ConfigError> {
        let upstream = std::mem::take(&mut target.upstream_targets);
        let (id, inherited) = match self.config.targets.get_full(&target.name) {
            Some((_, _, existing)) if existing.explicit => {
                return Err(ConfigError::DuplicateTarget(target.name));
            }
            Some((i, _, existing)) => (TargetId(i), existing.upstream_targets.clone()),
            None => (TargetId(self.config.targets.len()), vec![]),
        };
        for reference in &upstream {
            self.check_edge(id, &target.name, reference.target)?;
        }

        let name = target.name.clone();
        target.explicit = true;
        target.upstream_targets = inherited;
        self.config.targets.insert(name, target);
        self.config.graph.add_node(id);
        for reference in upstream {
            self.push_edge(id, reference);
        }
        Ok(id)
    }

    /// Get the target named `name`, creating a placeholder if it isn't known
    /// yet.
    pub fn placeholder(&mut self, name: &str) -> TargetId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let id = TargetId(self.config.targets.len());
        self.config
            .targets
            .insert(SmolStr::new(name), Target::placeholder(name));
        self.config.graph.add_node(id);
        id
    }

    /// Add an upstream edge to an already registered target.
    pub fn add_upstream(
        &mut self,
        target: TargetId,
        reference: TargetReference,
    ) -> Result<(), ConfigError> {
        let name = self
            .config
            .target(target)
            .map(|t| t.name.clone())
            .ok_or(ConfigError::UnknownId(target))?;
        self.check_edge(target, &name, reference.target)?;
        self.push_edge(target, reference);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<TargetId> {
        self.config.lookup(name)
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.config.target(id)
    }

    /// Finish building the configuration, returning it if valid.
    pub fn build(self) -> Result<Configuration, ConfigError> {
        if petgraph::algo::is_cyclic_directed(&self.config.graph) {
            return Err(ConfigError::ContainsCycle);
        }
        Ok(self.config)
    }

    /// Reject an edge `dependent -> dependency` if `dependency` already
    /// reaches `dependent`.
    fn check_edge(
        &self,
        dependent: TargetId,
        dependent_name: &SmolStr,
        dependency: TargetId,
    ) -> Result<(), ConfigError> {
        let dependency_name = self
            .config
            .target(dependency)
            .map(|t| t.name.clone())
            .ok_or(ConfigError::UnknownId(dependency))?;
        let reaches_back = dependent == dependency
            || (self.config.graph.contains_node(dependent)
                && petgraph::algo::has_path_connecting(
                    &self.config.graph,
                    dependency,
                    dependent,
                    None,
                ));
        if reaches_back {
            return Err(ConfigError::Cycle {
                target: dependent_name.clone(),
                upstream: dependency_name,
            });
        }
        Ok(())
    }

    fn push_edge(&mut self, dependent: TargetId, reference: TargetReference) {
        self.config.graph.add_edge(dependent, reference.target, ());
        if let Some((_, target)) = self.config.targets.get_index_mut(dependent.0) {
            target.upstream_targets.push(reference);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("target name \"{0}\" already exists")]
    DuplicateTarget(SmolStr),

    #[error("target \"{upstream}\" already depends on \"{target}\"")]
    Cycle { target: SmolStr, upstream: SmolStr },

    #[error("the target graph contains a cycle")]
    ContainsCycle,

    #[error("no target with id {0:?}")]
    UnknownId(TargetId),
}

/// A named build unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: SmolStr,
    /// Shown in the help output.
    pub title: Option<String>,
    pub upstream_targets: Vec<TargetReference>,
    /// `None` for targets that can only be built.
    pub run_commands: Option<RunCommands>,
    /// Defined in the configuration rather than created by a forward
    /// reference.
    pub explicit: bool,
    /// Whether the target's own name is one of its build targets.
    pub reference_self: bool,
    /// The target has no build-tool counterpart.
    pub run_only: bool,
}

impl Target {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            title: None,
            upstream_targets: vec![],
            run_commands: None,
            explicit: true,
            reference_self: true,
            run_only: false,
        }
    }

    fn placeholder(name: &str) -> Self {
        Self {
            explicit: false,
            ..Self::new(name)
        }
    }

    pub fn with_upstream(mut self, reference: TargetReference) -> Self {
        self.upstream_targets.push(reference);
        self
    }

    pub fn with_run_commands(mut self, run_commands: RunCommands) -> Self {
        self.run_commands = Some(run_commands);
        self
    }

    pub fn with_reference_self(mut self, reference_self: bool) -> Self {
        self.reference_self = reference_self;
        self
    }
}

/// An edge to an upstream target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReference {
    pub target: TargetId,
    /// The edge is ignored unless the condition holds.
    pub condition: Option<Condition>,
    /// Contribute build targets only, never run commands.
    pub build_only: bool,
}

impl TargetReference {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            condition: None,
            build_only: false,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn build_only(mut self, build_only: bool) -> Self {
        self.build_only = build_only;
        self
    }

    pub fn condition_met(&self, options: &BuildOptions) -> bool {
        self.condition.as_ref().is_none_or(|c| c.is_met(options))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionField {
    TargetOs,
}

/// A predicate over the build options, such as `OS==linux`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub op: ConditionOp,
    pub field: ConditionField,
    pub value: String,
}

impl Condition {
    pub fn target_os(op: ConditionOp, value: impl Into<String>) -> Self {
        Self {
            op,
            field: ConditionField::TargetOs,
            value: value.into(),
        }
    }

    pub fn is_met(&self, options: &BuildOptions) -> bool {
        let actual = match self.field {
            ConditionField::TargetOs => options.settings.target_os(),
        };
        match self.op {
            ConditionOp::Eq => actual == self.value,
            ConditionOp::Ne => actual != self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid condition \"{0}\", expected OS==<os> or OS!=<os>")]
pub struct InvalidCondition(pub String);

impl FromStr for Condition {
    type Err = InvalidCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCondition(s.to_string());
        let (field, op, value) = if let Some((field, value)) = s.split_once("==") {
            (field, ConditionOp::Eq, value)
        } else if let Some((field, value)) = s.split_once("!=") {
            (field, ConditionOp::Ne, value)
        } else {
            return Err(invalid());
        };
        let value = value.trim();
        if field.trim() != "OS" || value.is_empty() {
            return Err(invalid());
        }
        Ok(Condition::target_os(op, value))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            ConditionOp::Eq => "==",
            ConditionOp::Ne => "!=",
        };
        match self.field {
            ConditionField::TargetOs => write!(f, "OS{op}{}", self.value),
        }
    }
}
