//! Command-line client for the Palaver web protocol.
//!
//! Connects with either pairing variant, prints the authentication
//! material (visual-code payload or short code), and persists the session
//! record for later resumes.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use palaver_core::{AuthMethod, Client, ClientConfig, ConnectionState, Event};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "Palaver messaging web-protocol client")]
struct Cli {
    /// Service endpoint.
    #[arg(long, default_value = palaver_core::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// File to load/store the session record.
    #[arg(long, default_value = "palaver-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair by scanning a visual code.
    Qr,

    /// Pair with a short code delivered to the given phone.
    Code {
        /// Phone identifier (digits, country code first).
        phone: String,
    },

    /// Resume a previously stored session.
    Resume,

    /// Invalidate the stored session.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig {
        endpoint: cli.endpoint.clone(),
        ..ClientConfig::default()
    };
    if matches!(cli.command, Commands::Code { .. }) {
        config.auth_method = AuthMethod::ShortCode;
    }

    let client = Client::new(config);
    let mut events = client.subscribe();

    if matches!(cli.command, Commands::Resume | Commands::Logout) {
        let raw = std::fs::read_to_string(&cli.session_file)
            .with_context(|| format!("reading {}", cli.session_file.display()))?;
        let session = serde_json::from_str(&raw).context("parsing session record")?;
        client.restore_session(session)?;
    }

    client.connect().await.context("connecting")?;

    if let Commands::Code { phone } = &cli.command {
        // The pairing request is only valid once the handshake is open.
        wait_for_state(&client, ConnectionState::Authenticating).await?;
        client.request_pairing_code(phone).await?;
    }

    while let Some(event) = events.recv().await {
        match event {
            Event::Qr {
                reference,
                client_id,
                public_key,
                expires_in_seconds,
            } => {
                println!("scan within {expires_in_seconds}s: {reference},{client_id},{public_key}");
            }
            Event::QrExpired => println!("code expired, waiting for a fresh one"),
            Event::QrMaxRetries => anyhow::bail!("visual-code retries exhausted"),
            Event::PairingCode { code } => println!("enter pairing code: {code}"),
            Event::PairingCodeError { reason } => {
                anyhow::bail!("pairing rejected: {reason}");
            }
            Event::Authenticated { user, session } => {
                println!("authenticated as {} ({})", user.id, user.name.as_deref().unwrap_or("-"));
                let record = serde_json::to_string_pretty(&session)?;
                std::fs::write(&cli.session_file, record)
                    .with_context(|| format!("writing {}", cli.session_file.display()))?;
            }
            Event::Ready => {
                if matches!(cli.command, Commands::Logout) {
                    client.logout().await;
                    std::fs::remove_file(&cli.session_file).ok();
                    println!("logged out");
                    return Ok(());
                }
                println!("ready");
            }
            Event::Disconnected { code, reason } => {
                println!(
                    "disconnected (code {:?}, reason {:?})",
                    code,
                    reason.as_deref().unwrap_or("-")
                );
            }
            Event::ReconnectFailed => anyhow::bail!("reconnection attempts exhausted"),
            Event::ConnectionError { message } => tracing::warn!(%message, "connection error"),
            _ => {}
        }
    }

    Ok(())
}

/// Poll until the client reaches `target` or a short deadline passes.
async fn wait_for_state(client: &Client, target: ConnectionState) -> anyhow::Result<()> {
    for _ in 0..100 {
        if client.state() == target {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("timed out waiting for {target:?}")
}
