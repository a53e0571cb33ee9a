//! Run commands attached to targets.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;

use crate::options::BuildOptions;

/// The run-command variants of a target, keyed by variant.
pub type RunCommands = IndexMap<Variant, Vec<RunCommand>>;

/// An environment variable set for a single launched command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvVar {
    pub name: String,
    pub values: Vec<String>,
    pub delim: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![],
            delim: ":".into(),
        }
    }

    pub fn with_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn values_str(&self) -> String {
        self.values.join(&self.delim)
    }

    /// Render as it would be typed in front of a command, e.g.
    /// `ASAN_OPTIONS="a=0:b=1"`. Returns `None` when there are no values.
    pub fn cmd_line_str(&self) -> Option<String> {
        if self.values.is_empty() {
            return None;
        }
        if self.name.contains(' ') {
            Some(format!("\"{}\"=\"{}\"", self.name, self.values_str()))
        } else {
            Some(format!("{}=\"{}\"", self.name, self.values_str()))
        }
    }
}

/// The command and arguments used to run an executable.
///
/// Tokens may still contain `${...}` placeholders; they are expanded right
/// before the command is launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RunCommand {
    pub commands: Vec<String>,
    pub args: Vec<String>,
    pub env_var: Option<EnvVar>,
    pub shell: bool,
}

impl RunCommand {
    pub fn new(commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A command consisting only of arguments, used to supplement the
    /// commands of upstream targets.
    pub fn args_only(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, env_var: EnvVar) -> Self {
        self.env_var = Some(env_var);
        self
    }

    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Whether the command has neither tokens nor an environment variable.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.args.is_empty() && self.env_var.is_none()
    }

    /// The command tokens followed by the argument tokens.
    pub fn cmd_line(&self) -> Vec<String> {
        self.commands.iter().chain(&self.args).cloned().collect()
    }

    /// Replace every occurrence of `placeholder` in the command and argument
    /// tokens.
    pub(crate) fn substitute(&mut self, placeholder: &str, value: &str) {
        for token in self.commands.iter_mut().chain(self.args.iter_mut()) {
            if token.contains(placeholder) {
                *token = token.replace(placeholder, value);
            }
        }
    }
}

/// A named alternative way of running a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    Default,
    Debug,
    Asan,
    Profile,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Default,
        Variant::Debug,
        Variant::Asan,
        Variant::Profile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Default => "default",
            Variant::Debug => "debug",
            Variant::Asan => "asan",
            Variant::Profile => "profile",
        }
    }

    /// The variants applicable to `options`, highest priority first.
    ///
    /// The list always ends with [`Variant::Default`].
    pub fn preference(options: &BuildOptions) -> Vec<Variant> {
        let mut order = Vec::with_capacity(4);
        if options.settings.is_asan {
            order.push(Variant::Asan);
        }
        if options.profile {
            order.push(Variant::Profile);
        }
        if options.run_debugger {
            order.push(Variant::Debug);
        }
        order.push(Variant::Default);
        order
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown run-command variant \"{0}\" (expected one of: default, debug, asan, profile)")]
pub struct UnknownVariant(pub String);

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}
