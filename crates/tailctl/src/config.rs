//! CLI configuration: thin wrapper around `tailctl_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--base-url, --tailnet, --api-key, --timeout, --config).

use std::path::PathBuf;

use clap::ValueEnum;
use secrecy::SecretString;

use tailctl_core::ClientConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use tailctl_config::Config;

/// The config file in use: `--config` / `TAILCTL_CONFIG`, else the platform path.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(tailctl_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(tailctl_config::load_config_from(&config_file(global))?)
}

/// Name of the profile commands act on.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Translate the active profile + global flags into a `ClientConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_client_config(
    global: &GlobalOpts,
    config: &Config,
) -> Result<ClientConfig, CliError> {
    let (name, mut profile) = config.profile(global.profile.as_deref())?;

    if let Some(ref url) = global.base_url {
        profile.base_url = Some(url.clone());
    }
    if let Some(ref tailnet) = global.tailnet {
        profile.tailnet.clone_from(tailnet);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    let api_key = match global.api_key {
        Some(ref key) => SecretString::from(key.clone()),
        None => tailctl_config::resolve_api_key(&profile, &name)?,
    };
    Ok(tailctl_config::build_client_config(
        &config.defaults,
        &profile,
        api_key,
    )?)
}

/// `--output`, else the config's default format.
pub fn output_format(global: &GlobalOpts, config: &Config) -> Result<OutputFormat, CliError> {
    if let Some(format) = global.output {
        return Ok(format);
    }
    OutputFormat::from_str(&config.defaults.output, true).map_err(|_| CliError::Validation {
        field: "defaults.output".into(),
        reason: format!(
            "expected json, json-compact or yaml, got '{}'",
            config.defaults.output
        ),
    })
}
