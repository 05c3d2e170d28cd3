//! Auth subcommands: login, callback, logout, status.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use chrono::Utc;

use mileage_client::auth::IdentityClient;
use mileage_client::guard::{GuardDecision, RouteKind};

use crate::config::Credentials;
use crate::context::AppContext;

/// Auth subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum AuthAction {
    /// Start a login and print the identity provider URL to open.
    Login,
    /// Finish a login with the code the provider redirected back with.
    Callback {
        /// Authorization code from the redirect.
        code: String,
        /// `state` from the redirect.
        #[arg(long)]
        state: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show current auth status.
    Status,
}

/// Execute an auth subcommand.
pub async fn run(action: AuthAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        AuthAction::Login => login(ctx),
        AuthAction::Callback { code, state } => callback(ctx, &code, &state).await,
        AuthAction::Logout => logout(ctx),
        AuthAction::Status => status(ctx),
    }
}

fn login(ctx: &AppContext) -> anyhow::Result<()> {
    let identity = ctx.identity()?;
    let state = IdentityClient::new_state();
    let url = identity.authorize_url(&state)?;

    let mut creds = ctx.credentials();
    creds.pending_state = Some(state);
    ctx.store_credentials(creds)?;

    let mut out = io::stdout();
    writeln!(out, "Open this URL to sign in:")?;
    writeln!(out, "  {url}")?;
    writeln!(
        out,
        "Then run `mileage auth callback <code> --state <state>` with the values from the redirect."
    )?;
    Ok(())
}

async fn callback(ctx: &AppContext, code: &str, state: &str) -> anyhow::Result<()> {
    match ctx.credentials().pending_state.as_deref() {
        Some(expected) if expected == state => {}
        Some(_) => anyhow::bail!("Login state mismatch. Run `mileage auth login` again."),
        None => anyhow::bail!("No login in progress. Run `mileage auth login` first."),
    }

    let identity = ctx.identity()?;
    let tokens = identity.exchange_code(code).await?;
    let claims = identity.user_claims(&tokens.access_token).await?;

    ctx.store_credentials(Credentials {
        tokens: Some(tokens),
        claims: Some(claims),
        pending_state: None,
    })?;

    let mut out = io::stdout();
    writeln!(out, "Signed in.")?;
    if ctx.guard().evaluate(&ctx.credentials().session(), RouteKind::Protected)
        == GuardDecision::RedirectToOnboarding
    {
        writeln!(out, "Finish setting up your account with `mileage member onboard`.")?;
    }
    Ok(())
}

fn logout(ctx: &AppContext) -> anyhow::Result<()> {
    let mut creds = ctx.credentials();
    creds.clear();
    ctx.store_credentials(creds)?;
    writeln!(io::stdout(), "Logged out.")?;
    Ok(())
}

fn status(ctx: &AppContext) -> anyhow::Result<()> {
    let creds = ctx.credentials();
    let mut out = io::stdout();
    match &creds.tokens {
        Some(tokens) => {
            let who = creds
                .claims
                .as_ref()
                .and_then(|c| c.email().or_else(|| c.subject()))
                .unwrap_or("unknown user");
            writeln!(out, "Logged in as: {who}")?;
            writeln!(out, "Issuer:       {}", ctx.config.identity.domain)?;
            let remaining = tokens.expires_at - Utc::now();
            if remaining.num_seconds() > 0 {
                writeln!(out, "Token:        expires in {}m", remaining.num_minutes())?;
            } else if tokens.refresh_token.is_some() {
                writeln!(out, "Token:        expired (renews on next request)")?;
            } else {
                writeln!(out, "Token:        expired")?;
            }
            let onboarded = creds
                .claims
                .as_ref()
                .is_some_and(|c| c.is_onboarded(&ctx.config.identity.onboarded_claim));
            writeln!(out, "Onboarded:    {}", if onboarded { "yes" } else { "no" })?;
        }
        None => writeln!(out, "Not logged in.")?,
    }
    Ok(())
}
