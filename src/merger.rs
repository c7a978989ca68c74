//! Source merging.
//!
//! Resolution overlays sources onto the caller's defaults in a fixed order,
//! lowest priority first:
//!
//! 1. **Defaults** - the caller's value, serialized to a tree
//! 2. **File** - the first config file found, template-expanded and decoded
//! 3. **EnvPrefix** - variables derived from the env prefix
//! 4. **EnvBindKey** - variables bound by the config file's bind node
//! 5. **EnvBindings** - variables bound in code
//! 6. **CliFlag** - flags the user explicitly set
//!
//! Every fatal error aborts the pass; a partially merged tree is never
//! returned.

use crate::decode::Format;
use crate::env::{Binding, BindingSource, resolve_bindings};
use crate::error::{ConfigError, Result};
use crate::flags::FlagValue;
use crate::lenient;
use crate::options::ResolutionOptions;
use crate::paths::{discover_config_file, resolve_base_dir, resolve_relative};
use crate::template;
use crate::tree::{coerce, deep_merge, get_path, leaf_keys, remove_path, set_path};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration source, ordered by precedence (lowest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigSource {
    Default,
    File,
    EnvPrefix,
    EnvBindKey,
    EnvBindings,
    CliFlag,
}

impl From<BindingSource> for ConfigSource {
    fn from(source: BindingSource) -> Self {
        match source {
            BindingSource::Prefix => ConfigSource::EnvPrefix,
            BindingSource::BindKey => ConfigSource::EnvBindKey,
            BindingSource::Code => ConfigSource::EnvBindings,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::EnvPrefix => write!(f, "env-prefix"),
            ConfigSource::EnvBindKey => write!(f, "env-bind-key"),
            ConfigSource::EnvBindings => write!(f, "env-bindings"),
            ConfigSource::CliFlag => write!(f, "cli-flag"),
        }
    }
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Fully merged tree, ready to be decoded into the caller's type.
    pub tree: Value,
    /// Base directory used for relative paths.
    pub base_dir: PathBuf,
    /// Config file that was loaded, if any.
    pub config_file: Option<PathBuf>,
    /// Bindings whose variable was set and applied, in application order.
    pub applied_bindings: Vec<Binding>,
    /// Highest source that set each key above the defaults.
    pub sources: BTreeMap<String, ConfigSource>,
}

impl Resolution {
    /// Source of `key`; [`ConfigSource::Default`] when no other source set it.
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }
}

/// Defaults overlaid with the config file, plus the env bindings that apply
/// on top of them. This is everything [`resolve`] knows before it reads
/// the environment.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub tree: Value,
    pub base_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    /// Effective bindings, lowest priority first. Variables are not read yet.
    pub bindings: Vec<Binding>,
    pub sources: BTreeMap<String, ConfigSource>,
}

/// Merge the config file into `defaults` and work out the env bindings.
///
/// `defaults` must be a mapping (or null, treated as empty).
pub fn prepare(options: &ResolutionOptions, defaults: Value) -> Result<Prepared> {
    let mut tree = match defaults {
        Value::Object(_) => defaults,
        Value::Null => Value::Object(Map::new()),
        _ => {
            return Err(ConfigError::Deserialize {
                message: "default configuration must serialize to a mapping".to_string(),
            });
        }
    };
    let mut sources = BTreeMap::new();

    let base_dir = resolve_base_dir(options);
    let config_file = discover_config_file(options, &base_dir);

    let mut bind_node = None;
    if let Some(path) = &config_file {
        let mut file_tree = read_config_file(path, options.template_expansion())?;

        if let Some(bind_key) = options.env_bind_key() {
            bind_node = get_path(&file_tree, bind_key).cloned();
            // The bind node is resolver metadata unless the application
            // declares a field of the same name.
            if get_path(&tree, bind_key).is_none() {
                remove_path(&mut file_tree, bind_key);
            }
        }

        for key in leaf_keys(&file_tree) {
            // null in a file means "not specified"; deep_merge keeps the default
            if get_path(&file_tree, &key).is_some_and(|v| !v.is_null()) {
                sources.insert(key, ConfigSource::File);
            }
        }
        tree = deep_merge(tree, file_tree);
        info!(path = %path.display(), "loaded config file");
    }

    let known_keys = leaf_keys(&tree);
    let bindings = resolve_bindings(options, &known_keys, bind_node.as_ref())?;

    Ok(Prepared {
        tree,
        base_dir,
        config_file,
        bindings,
        sources,
    })
}

/// Run the resolution pipeline over a defaults tree.
///
/// `defaults` must be a mapping (or null, treated as empty).
pub fn resolve(options: &ResolutionOptions, defaults: Value) -> Result<Resolution> {
    let Prepared {
        mut tree,
        base_dir,
        config_file,
        bindings,
        mut sources,
    } = prepare(options, defaults)?;

    let mut applied_bindings = Vec::new();
    for binding in bindings {
        let Some(raw) = binding.lookup() else {
            continue;
        };
        let value = coerce(&raw, get_path(&tree, &binding.key));
        set_path(&mut tree, &binding.key, value);
        debug!(
            env_var = %binding.env_var,
            key = %binding.key,
            source = %binding.source,
            "applied environment binding"
        );
        sources.insert(binding.key.clone(), binding.source.into());
        applied_bindings.push(binding);
    }

    if let Some(command) = options.command() {
        for key in command.flag_keys() {
            if !command.is_set(&key) {
                continue;
            }
            let Some(raw) = command.value(&key) else {
                continue;
            };
            let existing = get_path(&tree, &key);
            let value = match raw {
                FlagValue::Single(raw) => coerce(&raw, existing),
                FlagValue::Multiple(items) => {
                    let element = existing.and_then(Value::as_array).and_then(|a| a.first());
                    Value::Array(items.iter().map(|item| coerce(item, element)).collect())
                }
            };
            set_path(&mut tree, &key, value);
            debug!(key = %key, "applied command-line flag");
            sources.insert(key, ConfigSource::CliFlag);
        }
    }

    Ok(Resolution {
        tree,
        base_dir,
        config_file,
        applied_bindings,
        sources,
    })
}

/// Read, expand and decode one config file.
pub fn read_config_file(path: &Path, template_expansion: bool) -> Result<Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::file_read(path, e))?;
    let expanded = template::expand(&raw, template_expansion).map_err(|e| e.in_file(path))?;
    let decoder = Format::from_path(path).decoder();
    decoder
        .decode(&expanded)
        .map_err(|message| ConfigError::file_decode(path, decoder.name(), message))
}

/// A loaded configuration with the context it was resolved in.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub config: T,
    pub base_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub sources: BTreeMap<String, ConfigSource>,
}

impl<T> Loaded<T> {
    /// Resolve a path taken from the configuration against the base directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_relative(&self.base_dir, path.as_ref())
    }

    pub fn into_inner(self) -> T {
        self.config
    }
}

/// Resolve configuration into `T`, starting from `defaults`.
///
/// ```no_run
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     port: u16,
/// }
///
/// let options = cfgm::ResolutionOptions::builder()
///     .app_name("myapp")
///     .env_prefix("MYAPP_")
///     .build();
/// let config = cfgm::load(Config { port: 8080 }, &options)?;
/// # Ok::<(), cfgm::ConfigError>(())
/// ```
pub fn load<T>(defaults: T, options: &ResolutionOptions) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    load_with_report(defaults, options).map(Loaded::into_inner)
}

/// Like [`load`], also returning the base dir, the file used and per-key sources.
pub fn load_with_report<T>(defaults: T, options: &ResolutionOptions) -> Result<Loaded<T>>
where
    T: Serialize + DeserializeOwned,
{
    let defaults = serde_json::to_value(&defaults).map_err(ConfigError::Serialize)?;
    let resolution = resolve(options, defaults)?;
    let config = lenient::from_value(resolution.tree).map_err(|e| ConfigError::Deserialize {
        message: e.to_string(),
    })?;
    Ok(Loaded {
        config,
        base_dir: resolution.base_dir,
        config_file: resolution.config_file,
        sources: resolution.sources,
    })
}
