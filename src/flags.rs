//! Command-line flag sources.
//!
//! The merger never parses flags itself. It asks a [`FlagSource`] which flags
//! exist, which of them the user set explicitly, and what their raw values
//! are. Flags left at their parser default never override other sources.

use clap::ArgMatches;
use clap::parser::ValueSource;
use std::collections::{BTreeMap, HashMap};

/// Raw value of a parsed flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Single(String),
    Multiple(Vec<String>),
}

/// Parsed command line, as seen by the merger.
pub trait FlagSource: Send + Sync {
    /// Configuration key paths that have a corresponding flag.
    fn flag_keys(&self) -> Vec<String>;

    /// Whether the flag for `key` was explicitly given by the user.
    fn is_set(&self, key: &str) -> bool;

    /// Current raw value of the flag for `key`.
    fn value(&self, key: &str) -> Option<FlagValue>;
}

/// [`FlagSource`] over `clap` matches.
///
/// A flag's id doubles as its key path (`--server.port` feeds `server.port`)
/// unless renamed with [`ClapFlags::map_flag`]. Only values whose source is
/// [`ValueSource::CommandLine`] count as explicitly set.
#[derive(Debug, Clone)]
pub struct ClapFlags {
    matches: ArgMatches,
    /// key path -> arg id, for renamed flags
    renames: HashMap<String, String>,
}

impl ClapFlags {
    pub fn new(matches: ArgMatches) -> Self {
        Self {
            matches,
            renames: HashMap::new(),
        }
    }

    /// Feed the flag with id `flag` into `key` instead of a key of the same name.
    pub fn map_flag(mut self, flag: impl Into<String>, key: impl Into<String>) -> Self {
        self.renames.insert(key.into(), flag.into());
        self
    }

    fn arg_id<'a>(&'a self, key: &'a str) -> &'a str {
        self.renames.get(key).map(String::as_str).unwrap_or(key)
    }
}

impl FlagSource for ClapFlags {
    fn flag_keys(&self) -> Vec<String> {
        let renamed: HashMap<&str, &str> = self
            .renames
            .iter()
            .map(|(key, flag)| (flag.as_str(), key.as_str()))
            .collect();
        self.matches
            .ids()
            .map(|id| {
                let id = id.as_str();
                renamed.get(id).copied().unwrap_or(id).to_string()
            })
            .collect()
    }

    fn is_set(&self, key: &str) -> bool {
        let id = self.arg_id(key);
        self.matches.try_contains_id(id).unwrap_or(false)
            && self.matches.value_source(id) == Some(ValueSource::CommandLine)
    }

    fn value(&self, key: &str) -> Option<FlagValue> {
        let raw = self.matches.try_get_raw(self.arg_id(key)).ok()??;
        let mut values: Vec<String> = raw.map(|v| v.to_string_lossy().into_owned()).collect();
        match values.len() {
            0 => None,
            1 => values.pop().map(FlagValue::Single),
            _ => Some(FlagValue::Multiple(values)),
        }
    }
}

/// [`FlagSource`] backed by a plain map where every entry counts as set.
///
/// Used for `key=value` overrides collected outside of a flag parser.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    values: BTreeMap<String, FlagValue>,
    defaulted: BTreeMap<String, FlagValue>,
}

impl StaticFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag the user set explicitly.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), FlagValue::Single(value.into()));
        self
    }

    /// A flag that exists but still holds its parser default.
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaulted
            .insert(key.into(), FlagValue::Single(value.into()));
        self
    }

    /// Parse `key=value` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        pairs.into_iter().try_fold(Self::new(), |flags, pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
            if key.trim().is_empty() {
                return Err(format!("empty key in '{pair}'"));
            }
            Ok(flags.set(key.trim(), value))
        })
    }
}

impl FlagSource for StaticFlags {
    fn flag_keys(&self) -> Vec<String> {
        self.values
            .keys()
            .chain(self.defaulted.keys())
            .cloned()
            .collect()
    }

    fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn value(&self, key: &str) -> Option<FlagValue> {
        self.values
            .get(key)
            .or_else(|| self.defaulted.get(key))
            .cloned()
    }
}
