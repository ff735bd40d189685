//! Shared configuration for tailctl.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `tailctl_core::ClientConfig`. The CLI adds flag-aware
//! wrappers on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tailctl_api::{RateLimitConfig, RetryPolicy, TlsMode};
use tailctl_core::{ClientConfig, CoreError, LivenessPolicy};

/// Environment variable consulted after a profile's own `api_key_env`.
pub const API_KEY_ENV: &str = "TAILSCALE_API_KEY";

const KEYRING_SERVICE: &str = "tailctl";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{name}' (configured: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error(transparent)]
    Client(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Durations ───────────────────────────────────────────────────────

/// Durations are written as humantime strings (`"30m"`, `"500ms"`); a
/// bare integer is read as seconds.
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(crate) enum Raw {
        Secs(u64),
        Text(String),
    }

    impl Raw {
        pub(crate) fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
            match self {
                Self::Secs(secs) => Ok(Duration::from_secs(secs)),
                Self::Text(text) => humantime::parse_duration(text.trim()).map_err(E::custom),
            }
        }
    }

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Raw::deserialize(d)?.into_duration()
    }
}

mod opt_duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::duration_str::Raw;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::duration_str::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<Raw>::deserialize(d)?
            .map(Raw::into_duration)
            .transpose()
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named tailnet profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    /// `json` or `yaml`.
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,

    #[serde(default = "default_liveness_window", with = "duration_str")]
    pub liveness_window: Duration,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    #[serde(default = "default_max_wait", with = "duration_str")]
    pub max_wait: Duration,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            liveness_window: default_liveness_window(),
            requests_per_second: default_requests_per_second(),
            max_wait: default_max_wait(),
            retry: RetrySettings::default(),
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_liveness_window() -> Duration {
    tailctl_core::liveness::DEFAULT_FRESHNESS_WINDOW
}
fn default_requests_per_second() -> f64 {
    1.0
}
fn default_max_wait() -> Duration {
    Duration::from_secs(30)
}

/// Backoff settings for idempotent calls.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", with = "duration_str")]
    pub base_delay: Duration,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_max_delay", with = "duration_str")]
    pub max_delay: Duration,
    #[serde(default = "default_max_total_wait", with = "duration_str")]
    pub max_total_wait: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            factor: default_factor(),
            max_delay: default_max_delay(),
            max_total_wait: default_max_total_wait(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}
fn default_factor() -> f64 {
    2.0
}
fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}
fn default_max_total_wait() -> Duration {
    Duration::from_secs(30)
}

impl RetrySettings {
    fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(invalid("retry.factor", "must be a number >= 1.0"));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            factor: self.factor,
            max_delay: self.max_delay,
            max_total_wait: self.max_total_wait,
            ..RetryPolicy::default()
        })
    }
}

/// A named tailnet profile. Unset fields fall back to [`Defaults`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL; the public control plane when unset.
    pub base_url: Option<String>,

    /// Tailnet name, or `-` for the key's own tailnet.
    #[serde(default = "default_tailnet")]
    pub tailnet: String,

    /// API key (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub liveness_window: Option<Duration>,

    pub requests_per_second: Option<f64>,

    /// Per-family request rates, e.g. `devices = 2.0`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rate_limits: BTreeMap<String, f64>,

    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub max_wait: Option<Duration>,

    pub retry: Option<RetrySettings>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            base_url: None,
            tailnet: default_tailnet(),
            api_key: None,
            api_key_env: None,
            ca_cert: None,
            timeout: None,
            liveness_window: None,
            requests_per_second: None,
            rate_limits: BTreeMap::new(),
            max_wait: None,
            retry: None,
        }
    }
}

fn default_tailnet() -> String {
    "-".into()
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

impl Config {
    /// Resolve which profile to use.
    ///
    /// An explicitly requested profile must exist. Otherwise the default
    /// profile is used, or an empty one when none is configured so that
    /// environment-only setups work.
    pub fn profile(&self, requested: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile.clone())),
            None if requested.is_none() => Ok((name, Profile::default())),
            None => Err(ConfigError::UnknownProfile {
                available: if self.profiles.is_empty() {
                    "none".into()
                } else {
                    self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
                },
                name,
            }),
        }
    }

    /// Copy with plaintext secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for profile in copy.profiles.values_mut() {
            if profile.api_key.is_some() {
                profile.api_key = Some("****".into());
            }
        }
        copy
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tailctl", "tailctl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tailctl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment variables use the `TAILCTL_` prefix with `__` between
/// levels: `TAILCTL_DEFAULTS__TIMEOUT=45s`,
/// `TAILCTL_PROFILES__WORK__TAILNET=example.com`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TAILCTL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Where an API key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ProfileEnv,
    DefaultEnv,
    Keyring,
    Plaintext,
}

/// Walk the credential chain with injectable lookups:
/// profile `api_key_env` → [`API_KEY_ENV`] → keyring → plaintext.
pub fn resolve_api_key_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<(SecretString, CredentialSource), ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Some(val) = env(env_name).filter(|v| !v.is_empty()) {
            return Ok((SecretString::from(val), CredentialSource::ProfileEnv));
        }
    }

    // 2. Well-known env var
    if let Some(val) = env(API_KEY_ENV).filter(|v| !v.is_empty()) {
        return Ok((SecretString::from(val), CredentialSource::DefaultEnv));
    }

    // 3. System keyring
    if let Some(secret) = keyring(profile_name) {
        return Ok((SecretString::from(secret), CredentialSource::Keyring));
    }

    // 4. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok((SecretString::from(key.clone()), CredentialSource::Plaintext));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
}

/// Resolve an API key from the process environment and system keyring.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_api_key_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        |name| keyring_entry(name).and_then(|e| e.get_password()).ok(),
    )
    .map(|(secret, _)| secret)
}

/// Store a profile's API key in the system keyring.
pub fn store_api_key(profile_name: &str, api_key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)
        .and_then(|entry| entry.set_password(api_key))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Client config ───────────────────────────────────────────────────

/// Merge `profile` over `defaults` into a [`ClientConfig`] using `api_key`.
pub fn build_client_config(
    defaults: &Defaults,
    profile: &Profile,
    api_key: SecretString,
) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::new(api_key)?;

    if let Some(ref raw) = profile.base_url {
        config.base_url = raw
            .parse()
            .map_err(|_| invalid("base_url", format!("invalid URL: {raw}")))?;
    }
    if profile.tailnet.trim().is_empty() {
        return Err(invalid("tailnet", "must not be empty; use '-' for the default tailnet"));
    }
    config.tailnet.clone_from(&profile.tailnet);

    if let Some(ref ca) = profile.ca_cert {
        config.tls = TlsMode::CustomCa(ca.clone());
    }
    config.timeout = profile.timeout.unwrap_or(defaults.timeout);
    config.liveness = LivenessPolicy::new(profile.liveness_window.unwrap_or(defaults.liveness_window));

    let rate = profile
        .requests_per_second
        .unwrap_or(defaults.requests_per_second);
    for (field, value) in std::iter::once(("requests_per_second", rate))
        .chain(profile.rate_limits.iter().map(|(k, v)| (k.as_str(), *v)))
    {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(field, "rate must be a non-negative number"));
        }
    }
    config.rate_limit = RateLimitConfig {
        requests_per_second: rate,
        per_endpoint: profile
            .rate_limits
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect(),
        max_wait: profile.max_wait.unwrap_or(defaults.max_wait),
    };
    config.retry = profile
        .retry
        .as_ref()
        .unwrap_or(&defaults.retry)
        .to_policy()?;

    Ok(config)
}

/// Resolve credentials and build a [`ClientConfig`] for a profile.
pub fn profile_to_client_config(
    config: &Config,
    profile: &Profile,
    profile_name: &str,
) -> Result<ClientConfig, ConfigError> {
    let api_key = resolve_api_key(profile, profile_name)?;
    build_client_config(&config.defaults, profile, api_key)
}
