use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Subcommand;
use serde_json::json;
use tokio::sync::mpsc;

use crate::cli::config::{load_session_config, save_session_config, SessionConfig};
use crate::cli::utils::{output_error, output_success, progress_bar};
use crate::cli::OutputFormat;
use crate::client::{ClientError, DashboardClient};
use crate::gateway::QrPayload;
use crate::poll::{ConnectionApi, LoadOutcome, PollDriver, PollView};
use crate::services::StatusOutcome;

#[derive(Subcommand)]
pub enum WhatsappCommands {
    #[command(about = "Show the account's WhatsApp connection status")]
    Status,

    #[command(about = "Show a QR code and wait until the phone has scanned it")]
    Connect {
        #[arg(long, help = "Write the QR image (PNG) to this file")]
        qr_out: Option<PathBuf>,
    },

    #[command(about = "Discard the current QR code and request a new one")]
    Regenerate {
        #[arg(help = "Instance name (defaults to the last one shown)")]
        instance: Option<String>,
        #[arg(long, help = "Write the QR image (PNG) to this file")]
        qr_out: Option<PathBuf>,
    },
}

pub async fn handle(cmd: WhatsappCommands, output_format: OutputFormat, server: Option<String>) -> anyhow::Result<()> {
    let session = load_session_config()?;
    session.require_token()?;
    let client = session.client(server.as_deref())?;

    match cmd {
        WhatsappCommands::Status => status(&client, output_format).await,
        WhatsappCommands::Connect { qr_out } => connect(client, session, qr_out, output_format).await,
        WhatsappCommands::Regenerate { instance, qr_out } => {
            regenerate(client, session, instance, qr_out, output_format).await
        }
    }
}

async fn status(client: &DashboardClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match client.status().await? {
        StatusOutcome::NotFound => output_success(
            &output_format,
            "No WhatsApp account found for this user",
            Some(json!({ "status": "not_found" })),
        ),
        StatusOutcome::Account(account) => output_success(
            &output_format,
            &format!("Instance '{}' is {}", account.instance_name, account.connection_status),
            Some(json!({ "account": account })),
        ),
    }
}

async fn connect(
    client: DashboardClient,
    session: SessionConfig,
    qr_out: Option<PathBuf>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let (view, ended) = TerminalView::new(output_format, qr_out);
    let driver = PollDriver::new(Arc::new(client), Arc::new(view));

    let outcome = driver.load_status().await?;
    finish(&driver, outcome, ended, session).await
}

async fn regenerate(
    client: DashboardClient,
    session: SessionConfig,
    instance: Option<String>,
    qr_out: Option<PathBuf>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let instance = match instance.or_else(|| session.instance_name.clone()) {
        Some(name) => name,
        None => match client.status().await? {
            StatusOutcome::Account(account) if !account.instance_name.is_empty() => account.instance_name,
            _ => anyhow::bail!("No instance to regenerate; pass an instance name"),
        },
    };

    let (view, ended) = TerminalView::new(output_format, qr_out);
    let driver = PollDriver::new(Arc::new(client), Arc::new(view));

    let outcome = driver.regenerate(&instance).await;
    finish(&driver, outcome, ended, session).await
}

/// Wait for a started session to end (or Ctrl-C), then report
async fn finish(
    driver: &PollDriver,
    outcome: LoadOutcome,
    mut ended: mpsc::UnboundedReceiver<SessionEnd>,
    mut session: SessionConfig,
) -> anyhow::Result<()> {
    match outcome {
        LoadOutcome::SessionStarted(instance_name) => {
            session.instance_name = Some(instance_name);
            save_session_config(&session)?;
        }
        LoadOutcome::ProvisionFailed(instance_name) => {
            anyhow::bail!("Could not get a QR code for '{}'; retry with `wadash regenerate`", instance_name)
        }
        LoadOutcome::NotFound | LoadOutcome::Connected(_) | LoadOutcome::Refreshed => return Ok(()),
    }

    let end = tokio::select! {
        end = ended.recv() => end,
        _ = tokio::signal::ctrl_c() => {
            driver.cancel();
            None
        }
    };

    session_result(end)
}

/// An expired QR is a normal end; the view has already offered `regenerate`
fn session_result(end: Option<SessionEnd>) -> anyhow::Result<()> {
    match end {
        Some(SessionEnd::Connected(_)) | Some(SessionEnd::Expired(_)) => Ok(()),
        None => anyhow::bail!("Cancelled"),
    }
}

/// How a poll session ended, as seen by the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Connected(String),
    Expired(String),
}

/// Renders poll progress on stdout/stderr and signals the end of the session
pub struct TerminalView {
    output_format: OutputFormat,
    qr_out: Option<PathBuf>,
    ended: mpsc::UnboundedSender<SessionEnd>,
}

impl TerminalView {
    pub fn new(output_format: OutputFormat, qr_out: Option<PathBuf>) -> (Self, mpsc::UnboundedReceiver<SessionEnd>) {
        let (ended, receiver) = mpsc::unbounded_channel();
        (
            Self {
                output_format,
                qr_out,
                ended,
            },
            receiver,
        )
    }

    fn report(&self, result: anyhow::Result<()>) {
        if let Err(e) = result {
            tracing::warn!("Could not write output: {}", e);
        }
    }
}

impl PollView for TerminalView {
    fn render_qr(&self, instance_name: &str, qr: &QrPayload) {
        let written = match (&self.qr_out, &qr.base64) {
            (Some(path), Some(image)) => match write_qr_image(path, image) {
                Ok(()) => Some(path.display().to_string()),
                Err(e) => {
                    tracing::warn!("Could not write QR image to {}: {}", path.display(), e);
                    None
                }
            },
            _ => None,
        };

        let mut message = format!("Scan the QR code for '{}' within 60 seconds", instance_name);
        if let Some(path) = &written {
            message.push_str(&format!(" (image saved to {})", path));
        }
        if let Some(pairing_code) = &qr.pairing_code {
            message.push_str(&format!("; pairing code {}", pairing_code));
        }

        self.report(output_success(
            &self.output_format,
            &message,
            Some(json!({ "instance": instance_name, "qrcode": qr, "qr_file": written })),
        ));
    }

    fn render_countdown(&self, remaining_secs: u64, percent: u8, urgent: bool) {
        if self.output_format == OutputFormat::Text {
            eprint!("\r{}", progress_bar(remaining_secs, percent, urgent));
            let _ = std::io::stderr().flush();
        }
    }

    fn render_connected(&self, instance_name: &str) {
        if self.output_format == OutputFormat::Text {
            eprintln!();
        }
        self.report(output_success(
            &self.output_format,
            &format!("WhatsApp connected on instance '{}'", instance_name),
            Some(json!({ "instance": instance_name, "status": "connected" })),
        ));
        let _ = self.ended.send(SessionEnd::Connected(instance_name.to_string()));
    }

    fn render_expired(&self, instance_name: &str) {
        if self.output_format == OutputFormat::Text {
            eprintln!();
        }
        self.report(output_error(
            &self.output_format,
            &format!("QR code expired; run `wadash regenerate {}` for a new one", instance_name),
            Some("QR_EXPIRED"),
        ));
        let _ = self.ended.send(SessionEnd::Expired(instance_name.to_string()));
    }

    fn render_not_found(&self) {
        self.report(output_success(
            &self.output_format,
            "No WhatsApp account found for this user",
            Some(json!({ "status": "not_found" })),
        ));
    }

    fn render_provision_failed(&self, instance_name: &str, error: &ClientError) {
        self.report(output_error(
            &self.output_format,
            &format!("Could not create instance '{}': {}", instance_name, error),
            Some("PROVISION_FAILED"),
        ));
    }
}

/// Decode a QR image, accepting a bare base64 string or a `data:` URL
pub fn decode_qr_image(encoded: &str) -> anyhow::Result<Vec<u8>> {
    let data = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    Ok(STANDARD.decode(data.trim())?)
}

fn write_qr_image(path: &Path, encoded: &str) -> anyhow::Result<()> {
    let bytes = decode_qr_image(encoded)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
