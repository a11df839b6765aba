//! Auth commands - Login, Logout and Status
//!
//! Provides the top-level `insight` subcommands which:
//! 1. `login`  - Runs the device-code flow (or the client-credentials grant
//!    when a client secret is configured) and stores the token
//! 2. `logout` - Removes the stored token
//! 3. `status` - Shows the stored token without contacting the provider

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use insight_api::{jwt, TokenManager};
use insight_core::domain::Tokens;
use tracing::info;

use super::CliContext;
use crate::output::OutputFormatter;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate and store a new token
    Login,
    /// Remove the stored token
    Logout,
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = ctx.config()?;
        let manager = TokenManager::from_config(&config);

        match self {
            AuthCommand::Login => execute_login(&manager, ctx, &*fmt).await,
            AuthCommand::Logout => execute_logout(&manager, ctx, &*fmt).await,
            AuthCommand::Status => execute_status(&manager, ctx, &*fmt),
        }
    }
}

async fn execute_login(
    manager: &TokenManager,
    ctx: &CliContext,
    fmt: &dyn OutputFormatter,
) -> Result<()> {
    info!("Starting login");
    let tokens = manager.login().await.context("Login failed")?;
    let subject = jwt::subject(&tokens.access_token).ok();

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::json!({
            "success": true,
            "subject": subject,
            "expires_at": tokens.expires_at.to_rfc3339(),
            "interactive": tokens.is_interactive(),
        }));
    } else {
        match &subject {
            Some(sub) => fmt.success(&format!("Logged in as {sub}")),
            None => fmt.success("Logged in"),
        }
        fmt.field("Token expires", &tokens.expires_at.to_rfc3339());
    }
    Ok(())
}

async fn execute_logout(
    manager: &TokenManager,
    ctx: &CliContext,
    fmt: &dyn OutputFormatter,
) -> Result<()> {
    let had_token = manager.status().map(|t| t.is_some()).unwrap_or(false);
    manager.logout().await;

    if ctx.format.is_json() {
        fmt.print_json(&serde_json::json!({ "success": true, "had_token": had_token }));
    } else if had_token {
        fmt.success("Logged out");
    } else {
        fmt.info("Not logged in. Nothing to log out.");
    }
    Ok(())
}

/// Status fields for a stored token
fn status_json(tokens: Option<&Tokens>, backend: &str) -> serde_json::Value {
    match tokens {
        None => serde_json::json!({ "authenticated": false, "store": backend }),
        Some(tokens) => serde_json::json!({
            "authenticated": true,
            "subject": jwt::subject(&tokens.access_token).ok(),
            "expires_at": tokens.expires_at.to_rfc3339(),
            "expired": tokens.is_expired_at(Utc::now()),
            "refreshable": tokens.refresh_token.is_some(),
            "store": backend,
        }),
    }
}

fn execute_status(manager: &TokenManager, ctx: &CliContext, fmt: &dyn OutputFormatter) -> Result<()> {
    let stored = manager.status().context("Failed to read stored token")?;
    let status = status_json(stored.as_ref(), manager.storage_backend());

    if ctx.format.is_json() {
        fmt.print_json(&status);
        return Ok(());
    }

    let Some(tokens) = stored else {
        fmt.info("Not logged in. Run `insight login`.");
        return Ok(());
    };

    if tokens.is_expired_at(Utc::now()) {
        if tokens.refresh_token.is_some() {
            fmt.warn("Access token expired; it will be refreshed on next use");
        } else {
            fmt.warn("Access token expired; run `insight login`");
        }
    } else {
        fmt.success("Logged in");
    }
    if let Some(subject) = status["subject"].as_str() {
        fmt.field("Subject", subject);
    }
    fmt.field("Token expires", &tokens.expires_at.to_rfc3339());
    fmt.field("Token store", manager.storage_backend());
    Ok(())
}
