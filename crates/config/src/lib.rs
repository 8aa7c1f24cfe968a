//! Configuration loading, validation, and env substitution.
//!
//! Config files: `alya.toml`, `alya.yaml`, or `alya.json`
//! Searched in `./` then `~/.config/alya/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values, and the classic
//! bot environment variables (`SESSION_ID`, `HANDLERS`, `SUDO`, ...) override
//! whatever the file says.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, default_data_dir, discover_and_load, load_config},
    schema::{AlyaConfig, GreetingsConfig, ReconnectConfig, SidecarConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
