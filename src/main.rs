//! cfgm
//!
//! Inspect how configuration for an application resolves from defaults,
//! config files, environment variables and command-line overrides.

use anyhow::{Context, Result, anyhow};
use cfgm::cli::{Cli, Command, overrides};
use cfgm::format::{bindings_report, paths_report, render, sources_report};
use cfgm::logging::{self, LogTarget};
use cfgm::merger::{prepare, resolve};
use cfgm::paths::{candidate_paths, discover_config_file, resolve_base_dir};
use cfgm::template;
use clap::Parser;
use serde_json::{Map, Value};
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let output = match &cli.command {
        Command::Resolve {
            sources,
            overrides: pairs,
        } => {
            let flags = overrides(pairs).map_err(|e| anyhow!(e))?;
            let options = cli.options_builder().command(flags).build();
            debug!(?options, "resolving");
            let resolution = resolve(&options, Value::Object(Map::new()))?;
            if *sources {
                render(&sources_report(&resolution.sources), cli.format)?
            } else {
                render(&resolution.tree, cli.format)?
            }
        }
        Command::Paths => {
            let options = cli.options_builder().build();
            let base_dir = resolve_base_dir(&options);
            let candidates = candidate_paths(&options, &base_dir);
            let found = discover_config_file(&options, &base_dir);
            render(
                &paths_report(&base_dir, &candidates, found.as_deref()),
                cli.format,
            )?
        }
        Command::Expand { file } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            template::expand(&raw, !cli.no_template).map_err(|e| e.in_file(file))?
        }
        Command::Env => {
            let options = cli.options_builder().build();
            let prepared = prepare(&options, Value::Null)?;
            render(&bindings_report(&prepared.bindings), cli.format)?
        }
    };

    print!("{output}");
    Ok(())
}
