//! Layered configuration resolution.
//!
//! Builds one typed configuration value from ranked sources, lowest first:
//! compiled-in defaults, a discovered config file (template-expanded, then
//! decoded), environment variables derived from a prefix, environment
//! variables bound in the config file, environment variables bound in code,
//! and command-line flags the user explicitly set.

pub mod cli;
pub mod decode;
pub mod env;
pub mod error;
pub mod flags;
pub mod format;
pub mod lenient;
pub mod logging;
pub mod merger;
pub mod options;
pub mod paths;
pub mod template;
pub mod tree;

pub use env::{Binding, BindingSource, derive_env_var};
pub use error::{ConfigError, Result};
pub use flags::{ClapFlags, FlagSource, FlagValue, StaticFlags};
pub use merger::{
    ConfigSource, Loaded, Prepared, Resolution, load, load_with_report, prepare, resolve,
};
pub use options::{ResolutionOptions, ResolutionOptionsBuilder};
pub use paths::{default_paths, find_project_root};
