//! Configuration view and validation commands: `orderbridge config`.

use anyhow::Result;

use orderbridge::config::BridgeConfig;

use super::super::{Cli, ConfigCommands};

const MASK: &str = "********";

fn mask(value: &mut Option<String>) {
    if value.is_some() {
        *value = Some(MASK.to_string());
    }
}

/// Copy of the configuration that is safe to print.
fn redacted(config: &BridgeConfig) -> BridgeConfig {
    let mut config = config.clone();
    mask(&mut config.source.api_key);
    mask(&mut config.source.api_secret);
    mask(&mut config.sheets.access_token);
    mask(&mut config.sheets.client_secret);
    mask(&mut config.sheets.refresh_token);
    mask(&mut config.notify.new_order_webhook);
    mask(&mut config.notify.data_change_webhook);
    mask(&mut config.notify.error_webhook);
    mask(&mut config.notify.telegram_bot_token);
    config
}

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = &cli.config;

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = BridgeConfig::resolve(config_path)?;
            println!();
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No {} found, showing defaults", config_path.display());
            }
            println!("# Effective values (with environment overrides)");
            println!();
            print!("{}", redacted(&config).to_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults.", config_path.display());
            }

            let config = BridgeConfig::resolve(config_path)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            std::fs::write(config_path, BridgeConfig::default().to_toml()?)?;

            println!("Created {}", config_path.display());
            println!();
            println!("Fill in:");
            println!("  - [sheets.*] spreadsheet_id and tab for each range");
            println!("  - [dispatch] requester_name, contact_phone");
            println!("Secrets go in the environment or .env:");
            println!("  IMWEB_API_KEY, IMWEB_API_SECRET, SHEETS_ACCESS_TOKEN,");
            println!("  SHEETS_CLIENT_ID, SHEETS_CLIENT_SECRET, SHEETS_REFRESH_TOKEN,");
            println!("  SLACK_*_WEBHOOK, TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID");
            println!();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_hides_only_present_secrets() {
        let mut config = BridgeConfig::default();
        config.source.api_key = Some("key".into());
        config.notify.error_webhook = Some("https://hooks.example/err".into());

        let shown = redacted(&config);
        assert_eq!(shown.source.api_key.as_deref(), Some(MASK));
        assert_eq!(shown.notify.error_webhook.as_deref(), Some(MASK));
        assert!(shown.source.api_secret.is_none());
        assert!(!shown.to_toml().unwrap().contains("hooks.example"));
    }
}
