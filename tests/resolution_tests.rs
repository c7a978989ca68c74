//! Integration tests for end-to-end configuration resolution.
//!
//! Covers the precedence order across all sources:
//! defaults < file < env prefix < file-declared bindings < code bindings < explicit flags

use cfgm::{
    ClapFlags, ConfigError, ConfigSource, ResolutionOptions, StaticFlags, load, load_with_report,
};
use clap::{Arg, Command};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tempfile::TempDir;

/// Serializes tests that modify the process environment.
fn env_lock() -> MutexGuard<'static, ()> {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sets variables for the duration of a test and removes them on drop.
struct EnvVars {
    names: Vec<String>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvVars {
    fn set(pairs: &[(&str, &str)]) -> Self {
        let guard = env_lock();
        for (name, value) in pairs {
            // SAFETY: environment mutation is serialized by env_lock
            unsafe { std::env::set_var(name, value) };
        }
        Self {
            names: pairs.iter().map(|(name, _)| name.to_string()).collect(),
            _guard: guard,
        }
    }
}

impl Drop for EnvVars {
    fn drop(&mut self) {
        for name in &self.names {
            // SAFETY: still holding env_lock
            unsafe { std::env::remove_var(name) };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ServerConfig {
    url: String,
    port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RedisConfig {
    url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AppConfig {
    debug: bool,
    port: u16,
    server: ServerConfig,
    redis: RedisConfig,
    tags: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            port: 8080,
            server: ServerConfig {
                url: "http://localhost".into(),
                port: 80,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".into(),
            },
            tags: vec!["default".into()],
        }
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("write config file");
}

#[test]
fn test_scenario_a_prefix_variable_without_file_or_flags() {
    let _env = EnvVars::set(&[("ITA_SERVER_URL", "http://x")]);
    let temp = TempDir::new().unwrap();
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .env_prefix("ITA_")
        .build();

    let loaded = load_with_report(AppConfig::default(), &options).unwrap();
    assert_eq!(loaded.config.server.url, "http://x");
    assert_eq!(loaded.config_file, None);
    assert_eq!(loaded.sources.get("server.url"), Some(&ConfigSource::EnvPrefix));
}

#[test]
fn test_scenario_b_code_binding_beats_file() {
    let _env = EnvVars::set(&[("ITB_REDIS_URL", "b")]);
    let temp = TempDir::new().unwrap();
    write(temp.path(), ".app.yaml", "redis:\n  url: \"a\"\n");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .app_name("app")
        .env_binding("ITB_REDIS_URL", "redis.url")
        .build();

    let config = load(AppConfig::default(), &options).unwrap();
    assert_eq!(config.redis.url, "b");
}

#[test]
fn test_scenario_c_empty_base_dir_checks_working_directory() {
    let options = ResolutionOptions::builder()
        .base_dir("")
        .config_paths([".app.yaml"])
        .build();
    let base = cfgm::paths::resolve_base_dir(&options);
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(base, cwd);
    assert_eq!(
        cfgm::paths::candidate_paths(&options, &base),
        vec![cwd.join(".app.yaml")]
    );
}

#[test]
fn test_scenario_d_coalesce_falls_through_to_literal() {
    let _env = EnvVars::set(&[]);
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "cfg.yaml",
        "server:\n  url: '{{coalesce .ITD_A .ITD_B \"z\"}}'\n",
    );
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .build();

    let config = load(AppConfig::default(), &options).unwrap();
    assert_eq!(config.server.url, "z");
}

#[test]
fn test_scenario_e_defaulted_flag_does_not_override_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "cfg.yaml", "port: 9090\n");
    let matches = Command::new("app")
        .arg(Arg::new("port").long("port").default_value("8080"))
        .get_matches_from(["app"]);
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .command(ClapFlags::new(matches))
        .build();

    let config = load(AppConfig::default(), &options).unwrap();
    assert_eq!(config.port, 9090);
}

#[test]
fn test_explicit_flag_overrides_everything() {
    let _env = EnvVars::set(&[("ITF_PORT", "7000"), ("ITF_BOUND_PORT", "7100")]);
    let temp = TempDir::new().unwrap();
    write(temp.path(), "cfg.yaml", "port: 9090\n");
    let matches = Command::new("app")
        .arg(Arg::new("port").long("port").default_value("8080"))
        .arg(Arg::new("server-url").long("server-url"))
        .get_matches_from(["app", "--port", "6000", "--server-url", "http://cli"]);
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .env_prefix("ITF_")
        .env_binding("ITF_BOUND_PORT", "port")
        .command(ClapFlags::new(matches).map_flag("server-url", "server.url"))
        .build();

    let loaded = load_with_report(AppConfig::default(), &options).unwrap();
    assert_eq!(loaded.config.port, 6000);
    assert_eq!(loaded.config.server.url, "http://cli");
    assert_eq!(loaded.sources.get("port"), Some(&ConfigSource::CliFlag));
}

#[test]
fn test_precedence_chain_per_source() {
    let _env = EnvVars::set(&[
        ("ITP_SERVER_URL", "from-prefix"),
        ("ITP_FILE_BOUND", "from-bind-key"),
        ("ITP_CODE_BOUND", "from-code"),
        ("ITP_REDIS_URL", "prefix-redis"),
        ("ITP_DEBUG", "true"),
    ]);
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "cfg.yaml",
        "envbind:\n  ITP_FILE_BOUND: redis.url\n  ITP_OTHER_FILE_BOUND: server.port\n\
         server:\n  url: from-file\n  port: 81\nredis:\n  url: file-redis\ntags: [file]\n",
    );
    let base_options = || {
        ResolutionOptions::builder()
            .base_dir(temp.path())
            .config_paths(["cfg.yaml"])
            .env_prefix("ITP_")
            .env_bind_key("envbind")
    };

    // File-declared binding wins over the prefix-derived ITP_REDIS_URL.
    let loaded = load_with_report(AppConfig::default(), &base_options().build()).unwrap();
    assert_eq!(loaded.config.redis.url, "from-bind-key");
    assert_eq!(loaded.config.server.url, "from-prefix");
    assert_eq!(loaded.config.server.port, 81);
    assert!(loaded.config.debug);
    assert_eq!(loaded.config.tags, vec!["file".to_string()]);
    assert_eq!(loaded.sources.get("redis.url"), Some(&ConfigSource::EnvBindKey));
    assert_eq!(loaded.sources.get("server.port"), Some(&ConfigSource::File));
    assert_eq!(loaded.sources.get("port"), None);

    // Code binding wins over the file-declared one.
    let options = base_options()
        .env_binding("ITP_CODE_BOUND", "redis.url")
        .build();
    let loaded = load_with_report(AppConfig::default(), &options).unwrap();
    assert_eq!(loaded.config.redis.url, "from-code");
    assert_eq!(loaded.sources.get("redis.url"), Some(&ConfigSource::EnvBindings));
}

#[test]
fn test_unset_bound_variable_leaves_file_value() {
    let _env = EnvVars::set(&[("ITU_REDIS_URL", "prefix-value")]);
    let temp = TempDir::new().unwrap();
    write(temp.path(), "cfg.yaml", "redis:\n  url: file-value\n");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .env_prefix("ITU_")
        .env_binding("ITU_NOT_SET_ANYWHERE", "redis.url")
        .build();

    // The explicit binding owns redis.url, so the derived variable is ignored
    // even though only it is set.
    let config = load(AppConfig::default(), &options).unwrap();
    assert_eq!(config.redis.url, "file-value");
}

#[test]
fn test_environment_values_are_coerced_to_field_types() {
    let _env = EnvVars::set(&[
        ("ITC_PORT", "9999"),
        ("ITC_DEBUG", "true"),
        ("ITC_TAGS", "a, b"),
        ("ITC_SERVER_PORT", "not-a-number"),
    ]);
    let temp = TempDir::new().unwrap();
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .env_prefix("ITC_")
        .build();

    let err = load(AppConfig::default(), &options).unwrap_err();
    assert!(matches!(err, ConfigError::Deserialize { .. }));

    // SAFETY: the lock is held by _env
    unsafe { std::env::remove_var("ITC_SERVER_PORT") };
    let config = load(AppConfig::default(), &options).unwrap();
    assert_eq!(config.port, 9999);
    assert!(config.debug);
    assert_eq!(config.tags, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_template_uses_environment_before_decoding() {
    let _env = EnvVars::set(&[("ITT_HOST", "db.internal"), ("ITT_EMPTY", "")]);
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "cfg.yaml",
        concat!(
            "server:\n",
            "  url: http://{{env \"ITT_HOST\"}}:{{.ITT_PORT | default \"5432\"}}\n",
            "  port: {{env \"ITT_EMPTY\" \"82\"}}\n",
        ),
    );
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .build();

    let config = load(AppConfig::default(), &options).unwrap();
    assert_eq!(config.server.url, "http://db.internal:5432");
    assert_eq!(config.server.port, 82);
}

#[test]
fn test_broken_template_fails_whole_resolution() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "cfg.yaml", "port: 1\nserver:\n  url: {{env}}\n");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .build();

    match load(AppConfig::default(), &options).unwrap_err() {
        ConfigError::TemplateSyntax { path, line, expr, .. } => {
            assert_eq!(path, Some(temp.path().join("cfg.yaml")));
            assert_eq!(line, 3);
            assert_eq!(expr, "{{env}}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_file_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["absent.yaml", "also-absent.json"])
        .build();
    assert_eq!(load(AppConfig::default(), &options).unwrap(), AppConfig::default());
}

#[test]
fn test_values_set_by_one_source_round_trip() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "cfg.yaml",
        "debug: true\nserver:\n  url: http://file\ntags: [x, y]\n",
    );
    let flags = StaticFlags::new().set("port", "1234");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .command(flags)
        .build();

    let loaded = load_with_report(AppConfig::default(), &options).unwrap();
    let tree = serde_json::to_value(&loaded.config).unwrap();
    assert_eq!(tree["debug"], serde_json::json!(true));
    assert_eq!(tree["server"]["url"], serde_json::json!("http://file"));
    assert_eq!(tree["tags"], serde_json::json!(["x", "y"]));
    assert_eq!(tree["port"], serde_json::json!(1234));
    assert_eq!(tree["server"]["port"], serde_json::json!(80));
}

/// Wrapper in the style of an application's own loader.
#[track_caller]
fn load_app_config(base: Option<&Path>) -> cfgm::Result<cfgm::Loaded<AppConfig>> {
    let mut builder = ResolutionOptions::builder();
    if let Some(base) = base {
        builder = builder.base_dir(base);
    }
    load_with_report(AppConfig::default(), &builder.build())
}

#[test]
fn test_wrapper_reports_project_root_of_its_caller() {
    let loaded = load_app_config(None).unwrap();
    assert!(loaded.base_dir.join("Cargo.toml").is_file());
    assert!(loaded.base_dir.join("tests").join("resolution_tests.rs").is_file());
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct OptionalConfig {
    api_key: Option<String>,
    version: Option<String>,
    port: Option<u16>,
}

#[test]
fn test_unset_optional_fields_take_environment_values() {
    let _env = EnvVars::set(&[
        ("ITO_API_KEY", "12345"),
        ("ITO_VERSION", "1.10"),
        ("ITO_PORT", "8080"),
    ]);
    let temp = TempDir::new().unwrap();
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .env_prefix("ITO_")
        .build();

    let config = load(OptionalConfig::default(), &options).unwrap();
    assert_eq!(config.api_key.as_deref(), Some("12345"));
    assert_eq!(config.version.as_deref(), Some("1.10"));
    assert_eq!(config.port, Some(8080));
}

#[test]
fn test_unset_optional_fields_take_flag_values() {
    let temp = TempDir::new().unwrap();
    let flags = StaticFlags::new()
        .set("version", "1.0")
        .set("api_key", "007")
        .set("port", "9090");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .command(flags)
        .build();

    let config = load(OptionalConfig::default(), &options).unwrap();
    assert_eq!(config.version.as_deref(), Some("1.0"));
    assert_eq!(config.api_key.as_deref(), Some("007"));
    assert_eq!(config.port, Some(9090));
}

#[test]
fn test_optional_port_rejects_non_numeric_value() {
    let temp = TempDir::new().unwrap();
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .command(StaticFlags::new().set("port", "eighty"))
        .build();

    let err = load(OptionalConfig::default(), &options).unwrap_err();
    assert!(matches!(err, ConfigError::Deserialize { .. }));
}

#[test]
fn test_prefix_covers_keys_only_declared_in_file() {
    let _env = EnvVars::set(&[("ITX_EXTRA_NAME", "y")]);
    let temp = TempDir::new().unwrap();
    write(temp.path(), "cfg.yaml", "extra:\n  name: x\n");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .env_prefix("ITX_")
        .build();

    let resolution = cfgm::resolve(&options, serde_json::json!({"port": 1})).unwrap();
    assert_eq!(resolution.tree["extra"]["name"], serde_json::json!("y"));
    assert_eq!(resolution.source_of("extra.name"), ConfigSource::EnvPrefix);
    assert_eq!(resolution.source_of("port"), ConfigSource::Default);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_variable_leaves_lower_source_in_place() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let _env = EnvVars::set(&[]);
    let name = "ITN_REDIS_URL";
    // SAFETY: the lock is held by _env
    unsafe { std::env::set_var(name, OsStr::from_bytes(b"redis://\xff")) };

    let temp = TempDir::new().unwrap();
    write(temp.path(), "cfg.yaml", "redis:\n  url: file-value\n");
    let options = ResolutionOptions::builder()
        .base_dir(temp.path())
        .config_paths(["cfg.yaml"])
        .env_prefix("ITN_")
        .build();
    let result = load(AppConfig::default(), &options);
    let read_back = cfgm::env::read_var(name);

    // SAFETY: the lock is held by _env
    unsafe { std::env::remove_var(name) };
    assert_eq!(result.unwrap().redis.url, "file-value");
    assert_eq!(read_back, None);
}
