//! Resolution options.
//!
//! A [`ResolutionOptions`] value is an immutable snapshot built once through
//! [`ResolutionOptionsBuilder`] and read by the merger at the start of a
//! resolution pass.
//!
//! ```
//! use cfgm::ResolutionOptions;
//!
//! let options = ResolutionOptions::builder()
//!     .app_name("myapp")
//!     .env_prefix("MYAPP_")
//!     .env_binding("REDIS_URL", "redis.url")
//!     .build();
//! assert_eq!(options.env_prefix(), Some("MYAPP_"));
//! ```

use crate::flags::FlagSource;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable options for one resolution pass.
#[derive(Clone)]
pub struct ResolutionOptions {
    app_name: Option<String>,
    command: Option<Arc<dyn FlagSource>>,
    config_paths: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    env_prefix: Option<String>,
    env_bindings: BTreeMap<String, String>,
    env_bind_key: Option<String>,
    template_expansion: bool,
    caller: &'static Location<'static>,
}

impl ResolutionOptions {
    /// Start building options.
    ///
    /// The caller's source location is recorded for project-root detection.
    /// Functions that wrap this call should be `#[track_caller]` so the
    /// location points at their own caller, or set it with
    /// [`ResolutionOptionsBuilder::caller_location`].
    #[track_caller]
    pub fn builder() -> ResolutionOptionsBuilder {
        ResolutionOptionsBuilder {
            options: ResolutionOptions {
                app_name: None,
                command: None,
                config_paths: Vec::new(),
                base_dir: None,
                env_prefix: None,
                env_bindings: BTreeMap::new(),
                env_bind_key: None,
                template_expansion: true,
                caller: Location::caller(),
            },
        }
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn command(&self) -> Option<&dyn FlagSource> {
        self.command.as_deref()
    }

    /// Explicit candidate paths; empty when they should derive from the app name.
    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// `None` when unset; `Some("")` means the current working directory.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Prefix for derived variable names. An empty prefix counts as unset.
    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix.as_deref().filter(|p| !p.is_empty())
    }

    /// Code-declared bindings: env var name -> key path.
    pub fn env_bindings(&self) -> &BTreeMap<String, String> {
        &self.env_bindings
    }

    pub fn env_bind_key(&self) -> Option<&str> {
        self.env_bind_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn template_expansion(&self) -> bool {
        self.template_expansion
    }

    /// Source location used as the starting point for project-root search.
    pub fn caller(&self) -> &'static Location<'static> {
        self.caller
    }
}

impl Default for ResolutionOptions {
    #[track_caller]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ResolutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionOptions")
            .field("app_name", &self.app_name)
            .field("command", &self.command.as_ref().map(|_| "<flags>"))
            .field("config_paths", &self.config_paths)
            .field("base_dir", &self.base_dir)
            .field("env_prefix", &self.env_prefix)
            .field("env_bindings", &self.env_bindings)
            .field("env_bind_key", &self.env_bind_key)
            .field("template_expansion", &self.template_expansion)
            .field("caller", &self.caller)
            .finish()
    }
}

/// Builder for [`ResolutionOptions`].
#[derive(Clone, Debug)]
pub struct ResolutionOptionsBuilder {
    options: ResolutionOptions,
}

impl ResolutionOptionsBuilder {
    /// Parsed command line. Explicitly set flags have the highest priority.
    pub fn command(mut self, flags: impl FlagSource + 'static) -> Self {
        self.options.command = Some(Arc::new(flags));
        self
    }

    /// Application name, used to derive default config paths when
    /// [`config_paths`](Self::config_paths) is not set. See
    /// [`default_paths`](crate::paths::default_paths).
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.options.app_name = Some(name.into());
        self
    }

    /// Candidate config files, searched in order; the first existing one wins.
    pub fn config_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.options.config_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Base directory for relative paths.
    ///
    /// An empty path selects the current working directory. When unset the
    /// project root (the directory holding `Cargo.toml` above the caller's
    /// source file) is used. Absolute candidate paths are unaffected.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.base_dir = Some(dir.into());
        self
    }

    /// Override the recorded caller location. Has no effect once a base dir is set.
    pub fn caller_location(mut self, location: &'static Location<'static>) -> Self {
        self.options.caller = location;
        self
    }

    /// Enable prefix-derived environment variables.
    ///
    /// The variable for a key is the prefix plus the upper-cased key with
    /// `.` and `-` turned into `_`: with prefix `MYAPP_`, `server.url` reads
    /// `MYAPP_SERVER_URL` and `client.rev-auth-user` reads
    /// `MYAPP_CLIENT_REV_AUTH_USER`. Explicit bindings for a key take
    /// precedence over the derived name.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.env_prefix = Some(prefix.into());
        self
    }

    /// Bind one environment variable to a key path, e.g. `REDIS_URL` to `redis.url`.
    pub fn env_binding(mut self, env_var: impl Into<String>, key: impl Into<String>) -> Self {
        self.options.env_bindings.insert(env_var.into(), key.into());
        self
    }

    /// Bind several environment variables at once.
    pub fn env_bindings<I, K, V>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options.env_bindings.extend(
            bindings
                .into_iter()
                .map(|(var, key)| (var.into(), key.into())),
        );
        self
    }

    /// Key path of a node in the config file holding `ENV_VAR: key.path`
    /// pairs. These rank below code-declared bindings.
    ///
    /// ```yaml
    /// envbind:
    ///   REDIS_URL: redis.url
    /// redis:
    ///   url: "redis://localhost:6379"
    /// ```
    pub fn env_bind_key(mut self, key: impl Into<String>) -> Self {
        self.options.env_bind_key = Some(key.into());
        self
    }

    /// Keep `{{ ... }}` in config files literal.
    pub fn without_template_expansion(mut self) -> Self {
        self.options.template_expansion = false;
        self
    }

    pub fn build(self) -> ResolutionOptions {
        self.options
    }
}
