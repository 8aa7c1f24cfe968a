use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::AlyaConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["alya.toml", "alya.yaml", "alya.yml", "alya.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<AlyaConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply environment
/// overrides.
///
/// Search order:
/// 1. `./alya.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/alya/alya.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `AlyaConfig::default()` when no file is found or the file
/// fails to parse.
pub fn discover_and_load() -> AlyaConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                AlyaConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            AlyaConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply the recognised environment variables on top of a loaded config.
pub fn apply_env_overrides(config: &mut AlyaConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides_with(
    config: &mut AlyaConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("SESSION_ID") {
        config.session_id = Some(Secret::new(v));
    }
    if let Some(v) = lookup("WORK_TYPE") {
        config.work_type = v;
    }
    if let Some(v) = lookup("HANDLERS") {
        config.handlers = v;
    }
    if let Some(v) = lookup("SUDO") {
        config.sudo = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    for (name, slot) in [
        ("AUTO_READ", &mut config.auto_read),
        ("AUTO_STATUS_READ", &mut config.auto_status_read),
        ("LOGS", &mut config.logs),
    ] {
        if let Some(v) = lookup(name) {
            match parse_bool(&v) {
                Some(b) => *slot = b,
                None => warn!(name, value = %v, "ignoring non-boolean environment override"),
            }
        }
    }
    if let Some(v) = lookup("ALYA_DATA_DIR") {
        config.data_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("ALYA_SIDECAR_DIR") {
        config.sidecar.dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("ALYA_SIDECAR_PORT") {
        match v.parse() {
            Ok(port) => config.sidecar.port = port,
            Err(_) => warn!(value = %v, "ignoring invalid ALYA_SIDECAR_PORT"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/alya/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "alya").map(|d| d.config_dir().to_path_buf())
}

/// Returns the platform data directory (`~/.local/share/alya/` on Linux).
pub fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "alya").map(|d| d.data_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<AlyaConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
