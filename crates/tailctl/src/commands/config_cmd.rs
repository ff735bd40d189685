//! Config subcommand handlers.

use std::io::BufRead;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let rendered = toml::to_string_pretty(&cfg.redacted())
                .map_err(|e| CliError::Render(e.to_string()))?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            output::print_output(&profile_lines(&cfg, global), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let path = config::config_file(global);
            let mut cfg = config::load(global)?;
            // Validates the name and lists alternatives when it is unknown.
            cfg.profile(Some(&name))?;
            cfg.default_profile = Some(name.clone());
            tailctl_config::save_config_to(&cfg, &path)?;
            tracing::info!(profile = %name, path = %path.display(), "default profile updated");
            Ok(())
        }

        ConfigCommand::SetKey { from_env } => {
            let cfg = config::load(global)?;
            let profile = config::active_profile_name(global, &cfg);
            let key = match from_env {
                Some(var) => std::env::var(&var).map_err(|_| CliError::Validation {
                    field: "--from-env".into(),
                    reason: format!("environment variable {var} is not set"),
                })?,
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line
                }
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            tailctl_config::store_api_key(&profile, key)?;
            if !global.quiet {
                eprintln!("Stored API key for profile '{profile}' in the system keyring");
            }
            Ok(())
        }
    }
}

/// One line per profile, `*` marking the active one.
fn profile_lines(cfg: &Config, global: &GlobalOpts) -> String {
    let active = config::active_profile_name(global, cfg);
    cfg.profiles
        .iter()
        .map(|(name, profile)| {
            let marker = if *name == active { '*' } else { ' ' };
            format!("{marker} {name}\t{}", profile.tailnet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
