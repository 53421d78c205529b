//! `mft session` command - API access token management

use chrono::Utc;
use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::helpers;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::session::{Session, TOKEN_ENV};

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Store an access token for this project
    Set(SetArgs),

    /// Show who the token belongs to and when it expires
    Show,

    /// Remove the stored token
    Clear,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// JWT access token issued by the ERP
    pub token: String,

    /// Refresh token to keep alongside the access token
    #[arg(long, value_name = "TOKEN")]
    pub refresh: Option<String>,
}

/// What `session show` reports
#[derive(Debug, Serialize)]
struct SessionStatus {
    source: String,
    user: Option<String>,
    expires_at: Option<String>,
    expired: bool,
    has_refresh_token: bool,
}

pub fn run(cmd: SessionCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SessionCommands::Set(args) => run_set(args, global),
        SessionCommands::Show => run_show(global),
        SessionCommands::Clear => run_clear(global),
    }
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let project = helpers::project(global)?;

    let mut session = Session::new(args.token);
    session.refresh_token = args.refresh;

    // Refuse anything that is not a JWT; an expired one is stored with a warning
    let expires_at = session.expires_at()?;
    session.save(&project.session_path())?;

    if !global.quiet {
        println!(
            "{} Saved session to {}",
            style("✓").green(),
            style(helpers::relative_display(&project.session_path(), project.root())).cyan()
        );
        match expires_at {
            Some(at) if at <= Utc::now() => println!(
                "{} Token already expired at {}",
                style("!").yellow(),
                style(at.to_rfc3339()).yellow()
            ),
            Some(at) => println!("  Expires {}", style(at.to_rfc3339()).dim()),
            None => println!("  {}", style("Token has no expiry").dim()),
        }
    }

    Ok(())
}

fn run_show(global: &GlobalOpts) -> Result<()> {
    let project = helpers::project(global).ok();
    let Some(session) = helpers::session(project.as_ref())? else {
        return Err(crate::core::session::SessionError::Missing.into());
    };

    let claims = session.claims()?;
    let expires_at = session.expires_at()?;
    let from_env = std::env::var(TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty());
    let status = SessionStatus {
        source: if from_env {
            TOKEN_ENV.to_string()
        } else {
            "session file".to_string()
        },
        user: claims
            .username
            .clone()
            .or_else(|| claims.user_id.as_ref().map(|id| id.to_string())),
        expires_at: expires_at.map(|at| at.to_rfc3339()),
        expired: session.ensure_valid_at(Utc::now()).is_err(),
        has_refresh_token: session.refresh_token.is_some(),
    };

    let format = global.format.resolve(None, OutputFormat::Auto);
    if helpers::print_structured(&status, format)? {
        return Ok(());
    }

    println!("{}", style("Session").bold().underlined());
    println!();
    println!("  {}: {}", style("source").cyan(), status.source);
    println!(
        "  {}: {}",
        style("user").cyan(),
        status.user.as_deref().unwrap_or("(unknown)")
    );
    println!(
        "  {}: {}",
        style("expires").cyan(),
        status.expires_at.as_deref().unwrap_or("never")
    );
    let state = if status.expired {
        style("expired").red()
    } else {
        style("valid").green()
    };
    println!("  {}: {}", style("status").cyan(), state);

    Ok(())
}

fn run_clear(global: &GlobalOpts) -> Result<()> {
    let project = helpers::project(global)?;
    let removed = Session::clear(&project.session_path())?;

    if removed {
        println!("{} Session cleared", style("✓").green());
    } else {
        println!("{} No stored session", style("!").yellow());
    }
    Ok(())
}
