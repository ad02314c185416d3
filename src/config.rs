//! Config file loading: TOML file + environment + CLI precedence.
//!
//! Default config path is `~/.cairn`; this crate additionally checks
//! `~/.config/cairn.toml` and a `CAIRN_CONFIG` environment variable.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// User-configurable defaults, loaded with precedence CLI flags > env vars >
/// config file(s) > built-in defaults. Every field is optional so a partial
/// file (or none at all) is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default backend URI used when a subcommand omits one.
    pub default_backend: Option<String>,
    /// Default block size in bytes, overriding the built-in 1 MiB default.
    pub block_size: Option<usize>,
    /// Path to a log4rs config file; falls back to a verbosity-derived
    /// in-process config if absent.
    pub log_config: Option<PathBuf>,
    /// Name of an environment variable holding the `CipherBackend`
    /// passphrase, so the literal secret need not live in the config file
    /// or process arguments.
    pub crypto_key_env: Option<String>,
}

/// Built-in default block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Candidate config file paths, in precedence order (first existing file
/// found is used; `--config` and `CAIRN_CONFIG` win over the conventional
/// locations).
#[must_use]
pub fn candidate_paths(cli_config: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = cli_config {
        paths.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("CAIRN_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Some(home) = dirs_next::home_dir() {
        paths.push(home.join(".cairn"));
        paths.push(home.join(".config").join("cairn.toml"));
    }
    paths
}

/// Load configuration, merging every existing candidate file (earlier
/// paths win on conflicting keys) and then environment variable overrides.
#[must_use]
pub fn load(cli_config: Option<&Path>) -> AppConfig {
    let mut cfg = AppConfig::default();
    for path in candidate_paths(cli_config) {
        if !path.exists() {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else { continue };
        let Ok(file_cfg) = toml::from_str::<AppConfig>(&text) else { continue };
        merge(&mut cfg, file_cfg);
    }

    if cfg.default_backend.is_none() {
        if let Ok(v) = std::env::var("CAIRN_BACKEND") {
            cfg.default_backend = Some(v);
        }
    }
    if cfg.block_size.is_none() {
        if let Ok(v) = std::env::var("CAIRN_BLOCK_SIZE") {
            cfg.block_size = v.parse().ok();
        }
    }
    if cfg.crypto_key_env.is_none() {
        if let Ok(v) = std::env::var("CAIRN_CRYPTO_KEY_ENV") {
            cfg.crypto_key_env = Some(v);
        }
    }
    cfg
}

fn merge(base: &mut AppConfig, overlay: AppConfig) {
    if base.default_backend.is_none() {
        base.default_backend = overlay.default_backend;
    }
    if base.block_size.is_none() {
        base.block_size = overlay.block_size;
    }
    if base.log_config.is_none() {
        base.log_config = overlay.log_config;
    }
    if base.crypto_key_env.is_none() {
        base.crypto_key_env = overlay.crypto_key_env;
    }
}

/// Keys whose names suggest a secret, used to warn when a config file
/// carries a literal passphrase instead of a `*_env` indirection.
#[must_use]
pub fn is_secret_key(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.contains("password") || k.contains("passwd") || k.contains("secret") || k.contains("crypto_key") && !k.ends_with("_env")
}

/// Walk a parsed TOML document and return the dotted paths of any keys
/// that look like they hold a secret directly, rather than pointing at an
/// environment variable.
#[must_use]
pub fn scan_toml_for_secret_keys(val: &toml::Value) -> Vec<String> {
    let mut hits = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back((String::new(), val));
    while let Some((prefix, v)) = queue.pop_front() {
        match v {
            toml::Value::Table(map) => {
                for (k, vv) in map {
                    let full = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                    if is_secret_key(k) {
                        hits.push(full.clone());
                    }
                    queue.push_back((full, vv));
                }
            }
            toml::Value::Array(arr) => {
                for (i, vv) in arr.iter().enumerate() {
                    queue.push_back((format!("{prefix}[{i}]"), vv));
                }
            }
            _ => {}
        }
    }
    hits
}

/// Resolve the `CipherBackend` passphrase: read the environment variable
/// named by `crypto_key_env`, falling back to `direct` (typically a
/// `--crypto-key` CLI flag value) if no env var is configured.
#[must_use]
pub fn resolve_crypto_key(crypto_key_env: Option<&str>, direct: Option<&str>) -> Option<String> {
    resolve_crypto_key_with(crypto_key_env, direct, |var| std::env::var(var).ok())
}

/// Testable core of [`resolve_crypto_key`], taking the environment lookup
/// as a function instead of calling `std::env::var` directly.
fn resolve_crypto_key_with(
    crypto_key_env: Option<&str>,
    direct: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(var) = crypto_key_env {
        if let Some(v) = lookup(var) {
            return Some(v);
        }
    }
    direct.map(str::to_string)
}
