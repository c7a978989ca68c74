//! Base directory and config file discovery.
//!
//! - Resolves the base directory used for relative paths: an explicit
//!   directory, the current working directory, or the project root found
//!   above the caller's source file
//! - Expands the candidate config file list, explicit or derived from the
//!   application name
//! - Returns the first candidate that exists; no candidate is a normal outcome

use crate::options::ResolutionOptions;
use std::panic::Location;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File whose presence marks a project root.
pub const PROJECT_MARKER: &str = "Cargo.toml";

/// Resolve the absolute base directory for relative paths.
///
/// Never fails: every branch falls back to the current working directory.
pub fn resolve_base_dir(options: &ResolutionOptions) -> PathBuf {
    let cwd = current_dir();
    if let Some(dir) = options.base_dir() {
        if dir.as_os_str().is_empty() {
            return cwd;
        }
        return absolutize(&cwd, dir);
    }

    match caller_project_root(options.caller(), &cwd) {
        Some(root) => {
            debug!(root = %root.display(), "using project root as base dir");
            root
        }
        None => {
            debug!(cwd = %cwd.display(), "no project root found, using working directory");
            cwd
        }
    }
}

/// Walk `start` and its ancestors for a directory holding [`PROJECT_MARKER`].
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}

fn caller_project_root(location: &Location<'_>, cwd: &Path) -> Option<PathBuf> {
    // Caller paths are usually relative to the package root the crate was
    // compiled from, which only exists at runtime on the build machine.
    let file = absolutize(cwd, Path::new(location.file()));
    if file.is_file()
        && let Some(root) = file.parent().and_then(find_project_root)
    {
        return Some(root);
    }

    let manifest_dir = std::env::var_os("CARGO_MANIFEST_DIR")?;
    find_project_root(Path::new(&manifest_dir))
}

/// Conventional config file locations for an application.
///
/// Relative entries are resolved against the base directory:
/// `.{app}.yaml`, `.{app}.yml`, `.{app}.json`, followed by
/// `{config_dir}/{app}/config.yaml` when the platform has a config directory
/// (`$XDG_CONFIG_HOME` or `~/.config` on Linux).
pub fn default_paths(app_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(format!(".{app_name}.yaml")),
        PathBuf::from(format!(".{app_name}.yml")),
        PathBuf::from(format!(".{app_name}.json")),
    ];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(app_name).join("config.yaml"));
    }
    paths
}

/// The candidate list for `options`, resolved against `base_dir`, in search order.
pub fn candidate_paths(options: &ResolutionOptions, base_dir: &Path) -> Vec<PathBuf> {
    let raw = if !options.config_paths().is_empty() {
        options.config_paths().to_vec()
    } else if let Some(app_name) = options.app_name() {
        default_paths(app_name)
    } else {
        Vec::new()
    };

    raw.iter()
        .map(|candidate| resolve_relative(base_dir, &expand_home(candidate)))
        .collect()
}

/// Return the first candidate that exists as a file.
pub fn discover_config_file(options: &ResolutionOptions, base_dir: &Path) -> Option<PathBuf> {
    let found = candidate_paths(options, base_dir)
        .into_iter()
        .inspect(|candidate| debug!(path = %candidate.display(), "checking config candidate"))
        .find(|candidate| candidate.is_file());
    if found.is_none() {
        debug!("no config file found");
    }
    found
}

/// Join a relative path to `base_dir`; absolute paths are returned normalized.
pub fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
    absolutize(base_dir, path)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path_components(path)
    } else {
        normalize_path_components(&base.join(path))
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Lexically normalize a path (resolve `.` and `..` without touching the filesystem).
fn normalize_path_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                components.push(component)
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else {
                    // Can't go up from root; keep the component (`/../foo`)
                    components.push(Component::ParentDir);
                }
            }
        }
    }

    components.iter().collect()
}
