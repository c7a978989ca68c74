//! Environment variable bindings.
//!
//! A binding ties one environment variable to one configuration key path.
//! Bindings come from three sources, lowest priority first:
//!
//! 1. **Prefix** - derived for every known key: `PREFIX` + upper-cased key with
//!    `.` and `-` replaced by `_`
//! 2. **Bind key** - `ENV_VAR: key.path` pairs read from a node of the config file
//! 3. **Code** - bindings passed to the options builder
//!
//! A higher source claims both its keys and its variables. Any lower-priority
//! mapping that touches a claimed key or variable is dropped as a whole, so
//! each key ends up fed by exactly one variable.

use crate::error::{ConfigError, Result};
use crate::options::ResolutionOptions;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::env::VarError;
use std::fmt;
use tracing::{debug, warn};

/// Where a binding came from, ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingSource {
    Prefix,
    BindKey,
    Code,
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingSource::Prefix => write!(f, "prefix"),
            BindingSource::BindKey => write!(f, "bind-key"),
            BindingSource::Code => write!(f, "code"),
        }
    }
}

/// One environment variable feeding one key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub env_var: String,
    pub key: String,
    pub source: BindingSource,
}

impl Binding {
    pub fn new(env_var: impl Into<String>, key: impl Into<String>, source: BindingSource) -> Self {
        Self {
            env_var: env_var.into(),
            key: key.into(),
            source,
        }
    }

    /// Current value of the bound variable, if set. An empty value counts as set.
    pub fn lookup(&self) -> Option<String> {
        read_var(&self.env_var)
    }
}

/// Read one environment variable.
///
/// A value that is not valid UTF-8 cannot be configuration; it is treated as
/// unset and logged so the fallback to lower sources is visible.
pub fn read_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(_)) => {
            warn!(env_var = %name, "ignoring environment variable with a non UTF-8 value");
            None
        }
    }
}

/// Derive the environment variable name for `key` under `prefix`.
///
/// ```
/// assert_eq!(
///     cfgm::env::derive_env_var("MYAPP_", "client.rev-auth-user"),
///     "MYAPP_CLIENT_REV_AUTH_USER"
/// );
/// ```
pub fn derive_env_var(prefix: &str, key: &str) -> String {
    format!("{prefix}{}", key.to_uppercase().replace(['.', '-'], "_"))
}

/// Read `ENV_VAR: key.path` pairs from the bind node of a decoded file tree.
///
/// A missing node yields no bindings. A node that is not a flat mapping of
/// strings is rejected.
pub fn file_bindings(bind_key: &str, node: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let Some(node) = node else {
        return Ok(BTreeMap::new());
    };
    let map = match node {
        Value::Object(map) => map,
        Value::Null => return Ok(BTreeMap::new()),
        _ => {
            return Err(ConfigError::invalid_bind_node(
                bind_key,
                "expected a mapping of ENV_VAR: key.path",
            ));
        }
    };
    map.iter()
        .map(|(env_var, key)| match key {
            Value::String(key) if !key.is_empty() => Ok((env_var.clone(), key.clone())),
            _ => Err(ConfigError::invalid_bind_node(
                bind_key,
                format!("binding for {env_var} must be a non-empty key path string"),
            )),
        })
        .collect()
}

/// Resolve the effective bindings, ordered lowest priority first.
///
/// `known_keys` lists every key path in declaration order; it drives the
/// prefix-derived source. `file_node` is the decoded bind node, if the
/// options name one and the file has it.
pub fn resolve_bindings(
    options: &ResolutionOptions,
    known_keys: &[String],
    file_node: Option<&Value>,
) -> Result<Vec<Binding>> {
    let mut claims = Claims::default();

    for (env_var, key) in options.env_bindings() {
        claims.claim(Binding::new(env_var, key, BindingSource::Code));
    }

    if let Some(bind_key) = options.env_bind_key() {
        for (env_var, key) in file_bindings(bind_key, file_node)? {
            claims.claim(Binding::new(env_var, key, BindingSource::BindKey));
        }
    }

    if let Some(prefix) = options.env_prefix() {
        for key in known_keys {
            claims.claim(Binding::new(derive_env_var(prefix, key), key, BindingSource::Prefix));
        }
    }

    let mut bindings = claims.bindings;
    // Stable: keeps declaration order inside each source.
    bindings.sort_by_key(|binding| binding.source);
    Ok(bindings)
}

/// Bindings accepted so far, indexed by key and by variable.
#[derive(Default)]
struct Claims {
    bindings: Vec<Binding>,
    by_key: HashMap<String, usize>,
    by_var: HashMap<String, usize>,
}

impl Claims {
    /// Accept `binding` unless its key or variable is already claimed.
    ///
    /// Sources are claimed highest priority first, so an existing claim from
    /// the same source is an ambiguity and one from a higher source is an
    /// ordinary override.
    fn claim(&mut self, binding: Binding) {
        let holder = self
            .by_key
            .get(&binding.key)
            .or_else(|| self.by_var.get(&binding.env_var))
            .map(|&idx| &self.bindings[idx]);

        if let Some(holder) = holder {
            if holder == &binding {
                return;
            }
            if holder.source == binding.source {
                warn!(
                    env_var = %binding.env_var,
                    key = %binding.key,
                    kept_env_var = %holder.env_var,
                    kept_key = %holder.key,
                    source = %binding.source,
                    "ambiguous environment binding, keeping the first one"
                );
            } else {
                debug!(
                    env_var = %binding.env_var,
                    key = %binding.key,
                    source = %binding.source,
                    overridden_by = %holder.source,
                    "environment binding overridden by a higher-priority source"
                );
            }
            return;
        }

        let idx = self.bindings.len();
        self.by_key.insert(binding.key.clone(), idx);
        self.by_var.insert(binding.env_var.clone(), idx);
        self.bindings.push(binding);
    }
}
