pub mod builder;
pub mod command;
pub mod env;
pub mod expand;
pub mod gn;
pub mod graph;
pub mod options;
pub mod progress;
pub mod reader;
pub mod settings;
pub mod world;

// Re-exports for convenience
pub use builder::{Builder, BuilderError, Failure};
pub use command::{EnvVar, RunCommand, Variant};
pub use env::{Checkout, Env};
pub use expand::VariableExpander;
pub use graph::{ConfigBuilder, Configuration, Target, TargetId, TargetReference};
pub use options::{BuildFlags, BuildOptions, BuildSettings};
pub use reader::{ConfigReader, LoadError};
pub use world::{LocalWorld, World};
