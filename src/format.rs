//! Output formatting for the `cfgm` binary.

use crate::env::Binding;
use crate::merger::ConfigSource;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output format for printed trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// Render a tree in the requested format.
pub fn render(value: &Value, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(value)?;
            out.push('\n');
            out
        }
    })
}

/// Per-key source report, keys in sorted order.
pub fn sources_report(sources: &BTreeMap<String, ConfigSource>) -> Value {
    sources
        .iter()
        .map(|(key, source)| (key.clone(), json!(source)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

/// Candidate paths with an existence marker, plus the chosen file.
pub fn paths_report(base_dir: &Path, candidates: &[PathBuf], found: Option<&Path>) -> Value {
    json!({
        "base_dir": base_dir.display().to_string(),
        "candidates": candidates
            .iter()
            .map(|path| json!({
                "path": path.display().to_string(),
                "exists": path.is_file(),
            }))
            .collect::<Vec<_>>(),
        "config_file": found.map(|p| p.display().to_string()),
    })
}

/// Bindings with the current state of their variables. Values are never
/// printed, only whether the variable is set.
pub fn bindings_report(bindings: &[Binding]) -> Value {
    Value::Array(
        bindings
            .iter()
            .map(|binding| {
                json!({
                    "env_var": binding.env_var,
                    "key": binding.key,
                    "source": binding.source.to_string(),
                    "set": binding.lookup().is_some(),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BindingSource;

    #[test]
    fn test_render_yaml_and_json() {
        let value = json!({"server": {"port": 1}});
        assert_eq!(render(&value, OutputFormat::Yaml).unwrap(), "server:\n  port: 1\n");
        assert_eq!(
            render(&value, OutputFormat::Json).unwrap(),
            "{\n  \"server\": {\n    \"port\": 1\n  }\n}\n"
        );
    }

    #[test]
    fn test_sources_report_uses_kebab_names() {
        let mut sources = BTreeMap::new();
        sources.insert("port".to_string(), ConfigSource::CliFlag);
        sources.insert("redis.url".to_string(), ConfigSource::EnvBindKey);
        assert_eq!(
            sources_report(&sources),
            json!({"port": "cli-flag", "redis.url": "env-bind-key"})
        );
    }

    #[test]
    fn test_paths_report() {
        let report = paths_report(
            Path::new("/work"),
            &[PathBuf::from("/work/.cfgm-test-none.yaml")],
            None,
        );
        assert_eq!(report["base_dir"], "/work");
        assert_eq!(report["candidates"][0]["exists"], false);
        assert_eq!(report["config_file"], Value::Null);
    }

    #[test]
    fn test_bindings_report_hides_values() {
        let bindings = [Binding::new(
            "CFGM_FORMAT_TEST_SURELY_UNSET",
            "a.b",
            BindingSource::Code,
        )];
        let report = bindings_report(&bindings);
        assert_eq!(
            report,
            json!([{
                "env_var": "CFGM_FORMAT_TEST_SURELY_UNSET",
                "key": "a.b",
                "source": "code",
                "set": false
            }])
        );
    }
}
