//! Configure command - View and edit the Insight configuration
//!
//! Provides the `insight configure` CLI command which:
//! 1. Shows the effective configuration (file plus `INSIGHT_*` overrides)
//! 2. Sets individual values in the configuration file via dotted keys
//! 3. Validates the configuration and reports every error found

use anyhow::{Context, Result};
use clap::Subcommand;
use insight_core::config::{env_var_name, Config, CONFIG_KEYS};
use tracing::info;

use super::CliContext;

#[derive(Debug, Subcommand)]
pub enum ConfigureCommand {
    /// Display the effective configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "oidc.client-id")
        key: String,
        /// New value; an empty string clears optional values
        value: String,
    },
    /// Validate the configuration
    Validate,
}

impl ConfigureCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigureCommand::Show => execute_show(ctx),
            ConfigureCommand::Set { key, value } => execute_set(ctx, key, value),
            ConfigureCommand::Validate => execute_validate(ctx),
        }
    }
}

/// Copy of `config` safe to print
fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.oidc.client_secret.is_some() {
        shown.oidc.client_secret = Some("<redacted>".to_string());
    }
    shown
}

/// Overrides currently set in the environment, as `(variable, key)`
fn active_overrides<F>(lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    CONFIG_KEYS
        .iter()
        .filter_map(|(section, option)| {
            let var = env_var_name(section, option);
            lookup(&var).map(|_| (var, format!("{section}.{option}")))
        })
        .collect()
}

fn execute_show(ctx: &CliContext) -> Result<()> {
    let fmt = ctx.formatter();
    let config = redacted(&ctx.config()?);
    let overrides = active_overrides(|name| std::env::var(name).ok());

    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.format.is_json() {
        let mut json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        json["config_path"] = serde_json::json!(ctx.config_path.display().to_string());
        json["env_overrides"] =
            serde_json::json!(overrides.iter().map(|(var, _)| var).collect::<Vec<_>>());
        fmt.print_json(&json);
        return Ok(());
    }

    fmt.success(&format!("Configuration ({})", ctx.config_path.display()));
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        fmt.info(line);
    }
    for (var, key) in &overrides {
        fmt.field("Override", &format!("{key} from {var}"));
    }
    Ok(())
}

fn execute_set(ctx: &CliContext, key: &str, value: &str) -> Result<()> {
    let fmt = ctx.formatter();
    let mut config = ctx.file_config();

    info!(key = %key, "Setting configuration value");
    config.set_value(key, value)?;

    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid value for '{key}': {}", messages.join("; "));
    }

    config
        .save(&ctx.config_path)
        .with_context(|| format!("Failed to write {}", ctx.config_path.display()))?;

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "config_path": ctx.config_path.display().to_string(),
        }));
    } else {
        fmt.success(&format!("Set {key}"));
        fmt.info(&format!("Saved to {}", ctx.config_path.display()));
    }
    Ok(())
}

fn execute_validate(ctx: &CliContext) -> Result<()> {
    let fmt = ctx.formatter();

    // A present but unreadable file is an error; a missing one means defaults
    let mut config = if ctx.config_path.exists() {
        Config::load(&ctx.config_path)
            .with_context(|| format!("Failed to parse {}", ctx.config_path.display()))?
    } else {
        Config::default()
    };
    config
        .apply_env_overrides()
        .context("Invalid INSIGHT_* environment override")?;

    let errors = config.validate();

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": ctx.config_path.display().to_string(),
            "errors": errors
                .iter()
                .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                .collect::<Vec<_>>(),
        }));
    } else if errors.is_empty() {
        fmt.success(&format!("Configuration is valid ({})", ctx.config_path.display()));
    } else {
        for error in &errors {
            fmt.error(&error.to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} configuration error(s)", errors.len())
    }
}
