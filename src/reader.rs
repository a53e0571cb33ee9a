//! Reading the target graph from a TOML configuration document.
//!
//! ```toml
//! [chrome]
//! title = "The browser"
//! configs.default = { cmd = "${Build_dir}/chrome", args = "${run_args}" }
//!
//! [tests]
//! executable_names = ["base_unittests", "net_unittests"]
//! targets = "${self}"
//! configs.default = { cmd = ["${xvfb}", "${Build_dir}/${executable_name}"] }
//!
//! [all]
//! targets = ["chrome", { android_webview_apk = { condition = "OS==android" } }]
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;
use tracing::debug;

use crate::{
    command::{EnvVar, RunCommand, RunCommands, UnknownVariant, Variant},
    graph::{
        Condition, ConfigBuilder, ConfigError, Configuration, InvalidCondition, Target,
        TargetReference,
    },
};

/// The upstream name standing for the target itself.
const SELF_SENTINEL: &str = "${self}";

/// Replaced by each name of `executable_names` when a template is expanded.
const EXECUTABLE_NAME_PLACEHOLDER: &str = "${executable_name}";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration")]
    Parse(#[from] toml::de::Error),

    #[error("target {0} has a configs section with no configs")]
    NoConfigs(String),

    #[error("cannot find config \"{variant}\" of target {target}")]
    EmptyConfig { target: String, variant: String },

    #[error("in target {target}")]
    UnknownVariant {
        target: String,
        #[source]
        source: UnknownVariant,
    },

    #[error("in target {target}")]
    Condition {
        target: String,
        #[source]
        source: InvalidCondition,
    },

    #[error("target {target}: an upstream table must have exactly one key, found {found}")]
    MalformedReference { target: String, found: usize },

    #[error(transparent)]
    Graph(#[from] ConfigError),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetDoc {
    title: Option<String>,
    executable_names: Option<Vec<String>>,
    targets: Option<OneOrMany<ReferenceDoc>>,
    #[serde(default)]
    run_only: bool,
    configs: Option<IndexMap<String, OneOrMany<RunCommandDoc>>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReferenceDoc {
    Name(String),
    Qualified(IndexMap<String, QualifiersDoc>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct QualifiersDoc {
    condition: Option<String>,
    #[serde(default)]
    build_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunCommandDoc {
    cmd: Option<OneOrMany<String>>,
    args: Option<OneOrMany<String>>,
    env: Option<EnvDoc>,
    #[serde(default)]
    shell: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvDoc {
    name: String,
    value: OneOrMany<String>,
    delim: Option<String>,
}

/// Reads a configuration document into a [`Configuration`].
#[derive(Default)]
pub struct ConfigReader {
    builder: ConfigBuilder,
}

impl ConfigReader {
    pub fn read(path: &Path) -> Result<Configuration, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "reading configuration");
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Configuration, LoadError> {
        let document: IndexMap<String, TargetDoc> = toml::from_str(text)?;
        let mut reader = ConfigReader::default();
        for (name, doc) in document {
            reader.add_entry(&name, doc)?;
        }
        Ok(reader.builder.build()?)
    }

    fn add_entry(&mut self, name: &str, doc: TargetDoc) -> Result<(), LoadError> {
        let mut target = Target::new(name);
        target.title = doc.title;
        target.run_only = doc.run_only;

        if let Some(references) = doc.targets {
            target.reference_self = false;
            for reference in references.into_vec() {
                let (upstream, qualifiers) = self.split_reference(name, reference)?;
                if upstream == SELF_SENTINEL || upstream == name {
                    target.reference_self = true;
                    continue;
                }
                let reference = self.parse_reference(name, &upstream, qualifiers)?;
                target.upstream_targets.push(reference);
            }
        }

        if let Some(configs) = doc.configs {
            target.run_commands = Some(parse_run_commands(name, configs)?);
        }

        match doc.executable_names {
            Some(executable_names) if !executable_names.is_empty() => {
                for executable_name in executable_names {
                    let mut copy = target.clone();
                    copy.name = SmolStr::new(&executable_name);
                    let commands = copy.run_commands.iter_mut().flat_map(|c| c.values_mut());
                    for command in commands.flatten() {
                        command.substitute(EXECUTABLE_NAME_PLACEHOLDER, &executable_name);
                    }
                    debug!(template = name, target = %copy.name, "expanding template");
                    self.builder.add_target(copy)?;
                }
            }
            _ => {
                self.builder.add_target(target)?;
            }
        }
        Ok(())
    }

    fn split_reference(
        &self,
        target: &str,
        reference: ReferenceDoc,
    ) -> Result<(String, QualifiersDoc), LoadError> {
        match reference {
            ReferenceDoc::Name(name) => Ok((name, QualifiersDoc::default())),
            ReferenceDoc::Qualified(table) => {
                let found = table.len();
                let mut entries = table.into_iter();
                match (entries.next(), entries.next()) {
                    (Some(entry), None) => Ok(entry),
                    _ => Err(LoadError::MalformedReference {
                        target: target.to_string(),
                        found,
                    }),
                }
            }
        }
    }

    /// Build an edge to `upstream`, creating a placeholder target if it
    /// isn't defined yet.
    fn parse_reference(
        &mut self,
        target: &str,
        upstream: &str,
        qualifiers: QualifiersDoc,
    ) -> Result<TargetReference, LoadError> {
        let id = self.builder.placeholder(upstream);
        let mut reference = TargetReference::new(id).build_only(qualifiers.build_only);
        if let Some(condition) = qualifiers.condition {
            let condition: Condition =
                condition.parse().map_err(|source| LoadError::Condition {
                    target: target.to_string(),
                    source,
                })?;
            reference = reference.with_condition(condition);
        }
        Ok(reference)
    }
}

fn parse_run_commands(
    target: &str,
    configs: IndexMap<String, OneOrMany<RunCommandDoc>>,
) -> Result<RunCommands, LoadError> {
    if configs.is_empty() {
        return Err(LoadError::NoConfigs(target.to_string()));
    }
    let mut run_commands = RunCommands::new();
    for (variant_name, docs) in configs {
        let variant: Variant = variant_name
            .parse()
            .map_err(|source| LoadError::UnknownVariant {
                target: target.to_string(),
                source,
            })?;
        let commands: Vec<RunCommand> = docs.into_vec().into_iter().map(run_command).collect();
        if commands.is_empty() || commands.iter().any(RunCommand::is_empty) {
            return Err(LoadError::EmptyConfig {
                target: target.to_string(),
                variant: variant_name,
            });
        }
        run_commands.insert(variant, commands);
    }
    Ok(run_commands)
}

fn run_command(doc: RunCommandDoc) -> RunCommand {
    let env_var = doc.env.map(|env| EnvVar {
        name: env.name,
        values: env.value.into_vec(),
        delim: env.delim.unwrap_or_else(|| ":".into()),
    });
    RunCommand {
        commands: doc.cmd.map(OneOrMany::into_vec).unwrap_or_default(),
        args: doc.args.map(OneOrMany::into_vec).unwrap_or_default(),
        env_var,
        shell: doc.shell,
    }
}
