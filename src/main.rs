use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;

use activity_digest::api::{self, AppState};
use activity_digest::cli::{self, Commands, CredentialCommands};
use activity_digest::config::{self, Config, StoreBackend};
use activity_digest::digest::DigestOrchestrator;
use activity_digest::jobs::scheduler;
use activity_digest::models::NewCredential;
use activity_digest::redact::{redact_text, redacted};
use activity_digest::store::{KvStore, MemoryStore, RedisStore};
use activity_digest::telemetry;
use activity_digest::vault::CredentialVault;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// The only place a process-level error is rendered; the `Debug` chain goes
/// through the redactor like every log line.
fn failure_message(err: &anyhow::Error) -> String {
    format!("Error: {}", redact_text(&format!("{:?}", err)))
}

async fn run() -> anyhow::Result<()> {
    let cfg = config::load()?;
    telemetry::init(cfg.json_logs)?;
    let args = cli::Cli::parse();

    let store = connect_store(&cfg).await?;

    match args.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, store, port).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, store, port).await
        }
        Some(Commands::Run) => run_digest(&cfg, store).await,
        Some(Commands::CheckExpiry) => check_expiry(&cfg, store).await,
        Some(Commands::Credential { command }) => {
            handle_credential_command(&cfg, store, command).await
        }
    }
}

async fn connect_store(cfg: &Config) -> anyhow::Result<Arc<dyn KvStore>> {
    match cfg.store {
        StoreBackend::Redis => {
            tracing::info!("Connecting to Redis...");
            let store = RedisStore::connect(&cfg.redis_url)
                .await
                .context("failed to connect to redis")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; credentials and cursors are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn run_server(cfg: Config, store: Arc<dyn KvStore>, port: u16) -> anyhow::Result<()> {
    if cfg.encryption_key.is_none() || cfg.sink_url.is_none() {
        tracing::warn!("DIGEST_ENCRYPTION_KEY or DIGEST_SINK_URL unset; digest runs will be refused");
    }

    let interval = cfg.interval_minutes;
    let state = Arc::new(AppState { config: cfg, store });

    if let Some(minutes) = interval {
        scheduler::spawn(state.clone(), Duration::from_secs(minutes * 60));
        tracing::info!(minutes, "Scheduled digest runs enabled");
    }

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("activity-digest listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_digest(cfg: &Config, store: Arc<dyn KvStore>) -> anyhow::Result<()> {
    let orchestrator = DigestOrchestrator::from_config(cfg, store)?;
    let report = orchestrator.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        anyhow::bail!("digest run finished with {} error(s)", report.errors.len());
    }
    Ok(())
}

async fn check_expiry(cfg: &Config, store: Arc<dyn KvStore>) -> anyhow::Result<()> {
    let orchestrator = DigestOrchestrator::from_config(cfg, store)?;
    let monitor = orchestrator.monitor();
    let statuses = monitor.check_all_credentials().await?;
    let posted = monitor.post_consolidated_warnings(&statuses).await?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    if posted {
        tracing::info!(count = statuses.len(), "expiry warning posted");
    }
    Ok(())
}

async fn handle_credential_command(
    cfg: &Config,
    store: Arc<dyn KvStore>,
    cmd: CredentialCommands,
) -> anyhow::Result<()> {
    let key = cfg
        .encryption_key
        .as_deref()
        .context("DIGEST_ENCRYPTION_KEY is not set")?;
    let vault = CredentialVault::new(key, store)?;

    match cmd {
        CredentialCommands::Add {
            user,
            account,
            secret,
            teams,
            expires_at,
        } => {
            let expires_at = parse_expiry_arg(expires_at.as_deref())?;
            let cred = vault
                .save_credential(NewCredential {
                    user_id: &user,
                    account_name: &account,
                    secret: &secret,
                    scope_ids: &teams,
                    expires_at,
                })
                .await?;
            println!("✅ Credential stored: {}", cred.label());
        }
        CredentialCommands::List { user } => {
            let creds = match user {
                Some(user) => vault.list_credentials_for_user(&user).await?,
                None => vault.list_all_credentials().await?,
            };
            println!("{}", serde_json::to_string_pretty(&redacted(&creds))?);
        }
        CredentialCommands::Delete { user, account } => {
            vault.delete_credential(&user, &account).await?;
            println!("🗑️  Credential deleted: {}/{}", user, account);
        }
        CredentialCommands::Rotate {
            user,
            account,
            secret,
            expires_at,
        } => {
            let expires_at = parse_expiry_arg(expires_at.as_deref())?;
            let cred = vault
                .rotate_secret(&user, &account, &secret, expires_at)
                .await?;
            println!("🔄 Credential rotated: {}", cred.label());
        }
    }
    Ok(())
}

fn parse_expiry_arg(raw: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("--expires-at must be RFC 3339, got {}", s))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_digest::errors::SinkError;

    #[test]
    fn test_failure_message_is_redacted() {
        let err = anyhow::Error::from(SinkError::Rejected {
            status: 400,
            body: "no_service".into(),
        })
        .context("posting to https://hooks.slack.com/services/T000/B000/XXXXXXXX failed")
        .context("token figd_abcdefghijklmnopqrstuvwxyz rejected");

        let msg = failure_message(&err);
        assert!(msg.starts_with("Error: "));
        assert!(msg.contains("no_service"));
        assert!(!msg.contains("hooks.slack.com/services"));
        assert!(!msg.contains("figd_abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn test_parse_expiry_arg() {
        assert!(parse_expiry_arg(None).unwrap().is_none());
        assert!(parse_expiry_arg(Some("2030-01-01T00:00:00Z")).unwrap().is_some());
        assert!(parse_expiry_arg(Some("next week")).is_err());
    }
}
