mod cli;
mod commands;

use std::path::Path;

use anyhow::Result;
use infrastructure::config::{AgentConfig, LogFormat, LogLevel};
use infrastructure::logging;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cli::{Command, RuleCommand, TwampCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    let config = AgentConfig::load(Path::new(&cli.config))?;
    let level = cli
        .log_level
        .or(config.log_level)
        .unwrap_or(LogLevel::Info);
    let format = cli
        .log_format
        .or(config.log_format)
        .unwrap_or(LogFormat::Text);
    logging::init_logging(level, format)?;

    match cli.command {
        Command::Version => {
            println!("edgemark-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Command::Rule { command } => {
            let mut service = commands::build_forwarding_service(&config)?;
            match command {
                RuleCommand::Create(args) => commands::cmd_rule_create(&mut service, args),
                RuleCommand::Delete { name } => commands::cmd_rule_delete(&mut service, &name),
                RuleCommand::Enable { name } => commands::cmd_rule_enable(&mut service, &name),
                RuleCommand::Disable { name } => commands::cmd_rule_disable(&mut service, &name),
                RuleCommand::Show { name, json } => {
                    commands::cmd_rule_show(&service, name.as_deref(), json)
                }
            }
        }

        Command::Twamp { command } => {
            let cancel = interrupt_token();
            match command {
                TwampCommand::Responder {
                    port,
                    bind_addr,
                    timer,
                    ip,
                } => commands::cmd_twamp_responder(port, bind_addr, timer, ip, cancel).await,
                TwampCommand::Sender {
                    destination_ip,
                    port,
                    count,
                    interval,
                    json,
                    ip,
                } => {
                    commands::cmd_twamp_sender(
                        destination_ip,
                        port,
                        count,
                        interval,
                        json,
                        ip,
                        cancel,
                    )
                    .await
                }
                TwampCommand::DscpTable => {
                    commands::cmd_dscp_table();
                    Ok(())
                }
            }
        }
    }
}

/// Token canceled on operator interrupt, so TWAMP sessions can wind down
/// and report partial results.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signaled = token.clone();
    tokio::spawn(async move {
        interrupted().await;
        info!("interrupt received, winding down");
        signaled.cancel();
    });
    token
}

/// Resolve on SIGINT or SIGTERM. If the SIGTERM stream cannot be set up,
/// fall back to Ctrl+C alone rather than refusing to run.
#[cfg(unix)]
async fn interrupted() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn interrupted() {
    let _ = tokio::signal::ctrl_c().await;
}
