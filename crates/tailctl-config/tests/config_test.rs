// ── Config loading and credential resolution tests ──
#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use tailctl_api::TlsMode;
use tailctl_config::{
    API_KEY_ENV, Config, ConfigError, CredentialSource, Defaults, Profile, build_client_config,
    load_config_from, resolve_api_key_with, save_config_to,
};

const SAMPLE: &str = r#"
default_profile = "work"

[defaults]
output = "yaml"
timeout = "45s"

[defaults.retry]
max_attempts = 5
base_delay = "250ms"

[profiles.work]
tailnet = "example.com"
api_key_env = "WORK_TS_KEY"
liveness_window = "10m"
max_wait = 5

[profiles.work.rate_limits]
devices = 2.5

[profiles.lab]
base_url = "https://headscale.lab.internal"
api_key = "tskey-api-lab"
ca_cert = "/etc/ssl/lab-ca.pem"
requests_per_second = 0
"#;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

fn no_lookup(_: &str) -> Option<String> {
    None
}

fn key() -> SecretString {
    SecretString::from("tskey-api-test".to_owned())
}

// ── Loading ─────────────────────────────────────────────────────────

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(config.defaults.output, "json");
    assert_eq!(config.defaults.liveness_window, Duration::from_secs(30 * 60));
    assert_eq!(config.defaults.retry.max_attempts, 3);
}

#[test]
fn file_values_override_defaults_and_parse_durations() {
    let (_dir, path) = write_config(SAMPLE);
    let config = load_config_from(&path).unwrap();

    assert_eq!(config.default_profile.as_deref(), Some("work"));
    assert_eq!(config.defaults.output, "yaml");
    assert_eq!(config.defaults.timeout, Duration::from_secs(45));
    assert_eq!(config.defaults.retry.max_attempts, 5);
    assert_eq!(config.defaults.retry.base_delay, Duration::from_millis(250));
    // Untouched retry fields keep their defaults.
    assert_eq!(config.defaults.retry.max_delay, Duration::from_secs(10));

    let work = &config.profiles["work"];
    assert_eq!(work.tailnet, "example.com");
    assert_eq!(work.liveness_window, Some(Duration::from_secs(600)));
    assert_eq!(work.max_wait, Some(Duration::from_secs(5)));
    assert_eq!(work.rate_limits.get("devices"), Some(&2.5));

    assert_eq!(config.profiles["lab"].tailnet, "-");
}

#[test]
fn malformed_duration_is_reported() {
    let (_dir, path) = write_config("[defaults]\ntimeout = \"soon\"\n");
    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)), "got {err:?}");
}

#[test]
fn saved_config_loads_back_unchanged() {
    let (dir, path) = write_config(SAMPLE);
    let config = load_config_from(&path).unwrap();

    let copy = dir.path().join("nested").join("copy.toml");
    save_config_to(&config, &copy).unwrap();
    assert_eq!(load_config_from(&copy).unwrap(), config);
}

// ── Profiles ────────────────────────────────────────────────────────

#[test]
fn default_profile_is_used_when_none_requested() {
    let (_dir, path) = write_config(SAMPLE);
    let config = load_config_from(&path).unwrap();

    let (name, profile) = config.profile(None).unwrap();
    assert_eq!(name, "work");
    assert_eq!(profile.tailnet, "example.com");

    let (name, _) = config.profile(Some("lab")).unwrap();
    assert_eq!(name, "lab");
}

#[test]
fn unknown_requested_profile_lists_configured_ones() {
    let (_dir, path) = write_config(SAMPLE);
    let config = load_config_from(&path).unwrap();

    let err = config.profile(Some("home")).unwrap_err();
    match err {
        ConfigError::UnknownProfile { name, available } => {
            assert_eq!(name, "home");
            assert_eq!(available, "lab, work");
        }
        other => panic!("expected UnknownProfile, got {other:?}"),
    }
}

#[test]
fn implicit_missing_profile_falls_back_to_empty() {
    let (name, profile) = Config::default().profile(None).unwrap();
    assert_eq!(name, "default");
    assert_eq!(profile, Profile::default());
}

#[test]
fn redacted_masks_plaintext_keys() {
    let (_dir, path) = write_config(SAMPLE);
    let config = load_config_from(&path).unwrap().redacted();
    assert_eq!(config.profiles["lab"].api_key.as_deref(), Some("****"));
    assert_eq!(config.profiles["work"].api_key, None);
}

// ── Credentials ─────────────────────────────────────────────────────

#[test]
fn credential_chain_prefers_profile_env_var() {
    let profile = Profile {
        api_key_env: Some("WORK_TS_KEY".into()),
        api_key: Some("plaintext".into()),
        ..Profile::default()
    };
    let env = |name: &str| match name {
        "WORK_TS_KEY" => Some("from-profile-env".to_owned()),
        API_KEY_ENV => Some("from-default-env".to_owned()),
        _ => None,
    };

    let (secret, source) =
        resolve_api_key_with(&profile, "work", env, |_| Some("from-keyring".into())).unwrap();
    assert_eq!(secret.expose_secret(), "from-profile-env");
    assert_eq!(source, CredentialSource::ProfileEnv);
}

#[test]
fn credential_chain_falls_through_in_order() {
    let profile = Profile {
        api_key_env: Some("UNSET_VAR".into()),
        api_key: Some("plaintext".into()),
        ..Profile::default()
    };

    let env = |name: &str| (name == API_KEY_ENV).then(|| "from-default-env".to_owned());
    let (_, source) = resolve_api_key_with(&profile, "work", env, no_lookup).unwrap();
    assert_eq!(source, CredentialSource::DefaultEnv);

    let keyring = |name: &str| (name == "work").then(|| "from-keyring".to_owned());
    let (secret, source) = resolve_api_key_with(&profile, "work", no_lookup, keyring).unwrap();
    assert_eq!(secret.expose_secret(), "from-keyring");
    assert_eq!(source, CredentialSource::Keyring);

    let (secret, source) = resolve_api_key_with(&profile, "work", no_lookup, no_lookup).unwrap();
    assert_eq!(secret.expose_secret(), "plaintext");
    assert_eq!(source, CredentialSource::Plaintext);
}

#[test]
fn empty_env_value_is_skipped_and_absence_is_an_error() {
    let env = |_: &str| Some(String::new());
    let err = resolve_api_key_with(&Profile::default(), "ci", env, no_lookup).unwrap_err();
    assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "ci"));
}

// ── Client config ───────────────────────────────────────────────────

#[test]
fn profile_overrides_merge_over_defaults() {
    let (_dir, path) = write_config(SAMPLE);
    let config = load_config_from(&path).unwrap();

    let work = build_client_config(&config.defaults, &config.profiles["work"], key()).unwrap();
    assert_eq!(work.base_url.as_str(), "https://api.tailscale.com/");
    assert_eq!(work.tailnet, "example.com");
    assert_eq!(work.timeout, Duration::from_secs(45));
    assert_eq!(work.liveness.window, Duration::from_secs(600));
    assert_eq!(work.rate_limit.requests_per_second, 1.0);
    assert_eq!(work.rate_limit.per_endpoint.get("devices"), Some(&2.5));
    assert_eq!(work.rate_limit.max_wait, Duration::from_secs(5));
    assert_eq!(work.retry.max_attempts, 5);
    assert_eq!(work.api_key.expose_secret(), "tskey-api-test");

    let lab = build_client_config(&config.defaults, &config.profiles["lab"], key()).unwrap();
    assert_eq!(lab.base_url.host_str(), Some("headscale.lab.internal"));
    assert_eq!(lab.tailnet, "-");
    assert_eq!(lab.rate_limit.requests_per_second, 0.0);
    assert!(matches!(lab.tls, TlsMode::CustomCa(ref p) if p.ends_with("lab-ca.pem")));
}

#[test]
fn invalid_profile_values_are_rejected() {
    let defaults = Defaults::default();

    let bad_url = Profile {
        base_url: Some("not a url".into()),
        ..Profile::default()
    };
    let err = build_client_config(&defaults, &bad_url, key()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "base_url"));

    let mut negative = Profile::default();
    negative.rate_limits.insert("acl".into(), -1.0);
    let err = build_client_config(&defaults, &negative, key()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "acl"));

    let blank = Profile {
        tailnet: "  ".into(),
        ..Profile::default()
    };
    let err = build_client_config(&defaults, &blank, key()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "tailnet"));

    let mut no_attempts = Defaults::default();
    no_attempts.retry.max_attempts = 0;
    let err = build_client_config(&no_attempts, &Profile::default(), key()).unwrap_err();
    assert!(
        matches!(err, ConfigError::Validation { ref field, .. } if field == "retry.max_attempts")
    );
}
