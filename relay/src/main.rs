//! mailrelay - sendmail replacement for hosts without a mail server.
//!
//! Pipe a message in (`mailrelay < mail.txt`, or install as `sendmail` for
//! cron) and it is delivered once. Started without input, it listens for
//! SMTP on the configured port instead.

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailrelay::{destination, util, Config, RunMode};

#[tokio::main]
async fn main() {
    // Initialize structured JSON logging. Stdout may belong to the caller.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
        .init();

    info!("mailrelay_starting");

    let code = match start().await {
        Ok(mode) => {
            info!(mode = ?mode, "mailrelay_stopped");
            0
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "mailrelay_failed");
            1
        }
    };

    // A stdin read that lost the timeout race still occupies a blocking
    // thread, and dropping the runtime would wait for it.
    std::process::exit(code);
}

async fn start() -> Result<RunMode> {
    let config = Config::load().context("Failed to load configuration")?;
    info!(
        listen_addr = %config.listen_addr(),
        stdin_timeout_ms = config.stdin_timeout_ms,
        request_timeout_ms = config.request_timeout_ms,
        telegram_enabled = config.channels.telegram.enabled,
        slack_enabled = config.channels.slack.enabled,
        file_enabled = config.channels.file.enabled,
        "config_loaded"
    );

    let client = Client::builder()
        .build()
        .context("Failed to create HTTP client")?;

    let destinations = destination::from_config(&config, client);

    mailrelay::run(config, destinations, tokio::io::stdin(), util::shutdown_signal()).await
}
