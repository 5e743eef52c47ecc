//! Build Notify CLI
//!
//! Runs one notification outside a host: loads a notifier config, a message
//! template and a build event from disk, then posts (or prints) the message.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use build_notify::{BuildEvent, ConfigBindings, NotifierConfig, SlackNotifier, StaticSecrets};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Render a build event into a Slack message and deliver it
#[derive(Parser)]
#[command(name = "build-notify")]
#[command(about = "Render a build event into a Slack message and deliver it")]
#[command(version)]
struct Cli {
    /// Notifier config (YAML)
    #[arg(long)]
    config: PathBuf,

    /// Message template; defaults to the config's template uri
    #[arg(long)]
    template: Option<PathBuf>,

    /// Build event JSON file, or `-` for stdin
    #[arg(long, default_value = "-")]
    event: String,

    /// Webhook URL, served for every secret the config asks for
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: String,

    /// Print the composed payload instead of posting it
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("build_notify=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_event(source: &str) -> Result<BuildEvent> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read build event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read build event: {source}"))?
    };
    serde_json::from_str(&raw).context("Invalid build event JSON")
}

/// Template path from the flag, or the config's `uri` relative to the config file.
fn template_path(cli: &Cli, config: &NotifierConfig) -> Result<PathBuf> {
    if let Some(path) = &cli.template {
        return Ok(path.clone());
    }
    let uri = config
        .spec
        .notification
        .template
        .as_ref()
        .and_then(|template| template.uri.as_deref())
        .context("No --template given and config has no template uri")?;
    let base = cli.config.parent().unwrap_or_else(|| Path::new("."));
    Ok(base.join(uri))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let raw_config = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config.display()))?;
    let config = NotifierConfig::from_yaml(&raw_config)?;

    let template_path = template_path(&cli, &config)?;
    let template = std::fs::read_to_string(&template_path)
        .with_context(|| format!("Failed to read template: {}", template_path.display()))?;

    let event = read_event(&cli.event)?;

    let secrets = StaticSecrets::with_fallback(cli.webhook_url.clone());
    let bindings = Arc::new(ConfigBindings::new(config.spec.notification.params.clone()));
    let notifier = SlackNotifier::setup(&config, &template, &secrets, bindings)
        .await
        .context("Notifier setup failed")?;

    if cli.dry_run {
        match notifier.prepare(&event).await? {
            Some(message) => println!("{}", serde_json::to_string_pretty(&message)?),
            None => info!(build_id = %event.id, "Event filtered out, nothing to send"),
        }
        return Ok(());
    }

    let outcome = notifier
        .notify(&event)
        .await
        .with_context(|| format!("Notification for build {} failed", event.id))?;
    info!(build_id = %event.id, ?outcome, "Done");
    Ok(())
}
