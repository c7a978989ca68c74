//! CLI definitions for the `cfgm` binary.
//!
//! The global options mirror [`ResolutionOptionsBuilder`], so a resolution
//! an application performs can be reproduced and inspected from a shell.

use crate::flags::StaticFlags;
use crate::format::OutputFormat;
use crate::options::{ResolutionOptions, ResolutionOptionsBuilder};
use crate::paths::find_project_root;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect layered configuration resolution
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Application name, used to derive default config file paths
    #[arg(short, long, global = true)]
    pub app_name: Option<String>,

    /// Config file candidate (repeatable, searched in order)
    #[arg(short, long = "config", value_name = "FILE", global = true)]
    pub config_paths: Vec<PathBuf>,

    /// Base directory for relative paths (empty string: current directory)
    ///
    /// Defaults to the project root above the current directory.
    #[arg(short, long, global = true)]
    pub base_dir: Option<String>,

    /// Prefix for derived environment variable names, e.g. MYAPP_
    #[arg(short, long, global = true)]
    pub env_prefix: Option<String>,

    /// Bind an environment variable to a key path: VAR=key.path (repeatable)
    #[arg(long = "bind", value_name = "VAR=KEY", global = true, value_parser = parse_binding)]
    pub bindings: Vec<(String, String)>,

    /// Config file node holding VAR: key.path bindings
    #[arg(long, value_name = "KEY", global = true)]
    pub bind_key: Option<String>,

    /// Keep {{ ... }} in config files literal
    #[arg(long, global = true)]
    pub no_template: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml, global = true)]
    pub format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and print the merged configuration tree
    Resolve {
        /// Print the source of every key instead of the tree
        #[arg(long)]
        sources: bool,

        /// Explicit override, as if given by a command-line flag: KEY=VALUE (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// Show the base directory and config file candidates
    Paths,

    /// Print the template expansion of a file
    Expand {
        /// File to expand
        file: PathBuf,
    },

    /// List environment bindings and whether their variables are set
    Env,
}

impl Cli {
    /// Build resolution options from the global arguments.
    ///
    /// Without `--base-dir` the base is the project root above the working
    /// directory, since this binary's own source location means nothing to
    /// the configuration being inspected.
    pub fn options_builder(&self) -> ResolutionOptionsBuilder {
        let mut builder = ResolutionOptions::builder();
        if let Some(name) = &self.app_name {
            builder = builder.app_name(name);
        }
        if !self.config_paths.is_empty() {
            builder = builder.config_paths(self.config_paths.iter().cloned());
        }
        builder = match &self.base_dir {
            Some(dir) => builder.base_dir(dir),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                builder.base_dir(find_project_root(&cwd).unwrap_or(cwd))
            }
        };
        if let Some(prefix) = &self.env_prefix {
            builder = builder.env_prefix(prefix);
        }
        builder = builder.env_bindings(self.bindings.iter().cloned());
        if let Some(key) = &self.bind_key {
            builder = builder.env_bind_key(key);
        }
        if self.no_template {
            builder = builder.without_template_expansion();
        }
        builder
    }
}

/// Parse `KEY=VALUE` overrides into a flag source.
pub fn overrides(pairs: &[String]) -> Result<StaticFlags, String> {
    StaticFlags::from_pairs(pairs.iter().map(String::as_str))
}

fn parse_binding(s: &str) -> Result<(String, String), String> {
    let (var, key) = s
        .split_once('=')
        .ok_or_else(|| format!("expected VAR=key.path, got '{s}'"))?;
    if var.is_empty() || key.is_empty() {
        return Err(format!("expected VAR=key.path, got '{s}'"));
    }
    Ok((var.to_string(), key.to_string()))
}
