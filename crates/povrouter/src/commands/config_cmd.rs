//! Config subcommand handlers.

use povrouter_config::{Config, KEYRING_OBS_PASSWORD, KEYRING_SERVICE, save_config, store_obs_password};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::{load, resolve_config_path};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match args.command {
        ConfigCommand::Init { force } => {
            let path = resolve_config_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            save_config(&Config::default(), &path)?;

            if !global.quiet {
                eprintln!(
                    "{} Configuration written to {}",
                    output::success_mark(color),
                    path.display()
                );
                eprintln!("  Store the OBS password with: povrouter config set-password");
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let (path, cfg) = load(global)?;
            let cfg = cfg.redacted();
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| {
                    let body = toml::to_string_pretty(c).unwrap_or_default();
                    format!("{}\n{body}", output::muted(&format!("# {}", path.display()), color))
                },
                |c| c.obs.url.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            let path = resolve_config_path(global);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let password = rpassword::prompt_password("OBS WebSocket password: ").map_err(|e| {
                CliError::Validation {
                    field: "password".into(),
                    reason: format!("prompt failed: {e}"),
                }
            })?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            store_obs_password(&password)?;

            if !global.quiet {
                eprintln!(
                    "{} Password stored in system keyring ({KEYRING_SERVICE}/{KEYRING_OBS_PASSWORD})",
                    output::success_mark(color)
                );
            }
            Ok(())
        }
    }
}
