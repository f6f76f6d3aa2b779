use std::io::{self, BufRead, Write};

use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use crate::cli::config::{load_session_config, save_session_config};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Log in and store the session token")]
    Login {
        #[arg(help = "Username")]
        username: String,
        #[arg(long, env = "WADASH_PASSWORD", help = "Password (read from stdin if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Forget the stored session token")]
    Logout,

    #[command(about = "Show the logged-in user's profile")]
    Whoami,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat, server: Option<String>) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { username, password } => login(&username, password, output_format, server.as_deref()).await,
        AuthCommands::Logout => logout(output_format, server.as_deref()).await,
        AuthCommands::Whoami => whoami(output_format, server.as_deref()).await,
    }
}

async fn login(username: &str, password: Option<String>, output_format: OutputFormat, server: Option<&str>) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let mut session = load_session_config()?;
    let server_url = session.server_url(server);
    let client = session.client(server)?;

    let reply = client.login(username, &password).await?;

    session.server = Some(server_url);
    session.token = Some(reply.token);
    session.username = Some(username.to_string());
    session.logged_in_at = Some(Utc::now());
    save_session_config(&session)?;

    output_success(
        &output_format,
        &format!("Logged in as '{}'", username),
        Some(json!({ "user": reply.user })),
    )
}

async fn logout(output_format: OutputFormat, server: Option<&str>) -> anyhow::Result<()> {
    let mut session = load_session_config()?;

    if session.token.is_some() {
        // Tokens are stateless server-side; a failed call must not keep the local token
        if let Err(e) = session.client(server)?.logout().await {
            tracing::warn!("Server logout failed: {}", e);
        }
    }

    session.token = None;
    session.logged_in_at = None;
    save_session_config(&session)?;

    output_success(&output_format, "Logged out", None)
}

async fn whoami(output_format: OutputFormat, server: Option<&str>) -> anyhow::Result<()> {
    let session = load_session_config()?;
    session.require_token()?;

    let user = session.client(server)?.profile().await?;
    let name = user.get("username").and_then(|v| v.as_str()).unwrap_or("?").to_string();
    output_success(&output_format, &format!("Logged in as '{}'", name), Some(json!({ "user": user })))
}

fn read_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}
