//! iothub-health entry point.
//!
//! Runs the connection service and accepts control commands on stdin.
//! Status changes are printed to stdout as `status <name> (<code>)`;
//! logs go to stderr.

mod commands;
mod config;

use anyhow::Context;
use iothub_connection::{
    ConnectionError, ConnectionService, ConnectionStatus, FileCredentialStore, MqttTransport,
    ServiceHandle,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, HELP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting iothub-health");

    let config = match config::HealthConfig::load() {
        Ok(c) => {
            tracing::info!(sas_expiry = c.sas_expiry, "configuration loaded");
            c
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            config::HealthConfig::default()
        }
    };

    let store_path = config.store_path()?;
    let store = FileCredentialStore::open(store_path.clone())
        .with_context(|| format!("opening credential store {}", store_path.display()))?;

    let mut service = ConnectionService::new(
        MqttTransport::new(config.transport_settings()),
        Some(Box::new(store)),
        config.manager_settings()?,
    );
    let mut statuses = service
        .manager_mut()
        .take_events()
        .context("status receiver already taken")?;
    if let Err(e) = service.manager_mut().load_persisted() {
        tracing::warn!(error = %e, "stored connection string not applied");
    }

    let handle = service.handle();
    let cancel = CancellationToken::new();
    let service_task = tokio::spawn(service.run(cancel.clone()));
    let printer = tokio::spawn(async move {
        while let Some(status) = statuses.recv().await {
            print_status(status);
        }
    });

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else { break };

        match commands::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = execute(&handle, command).await {
                    println!("error: {e}");
                }
            }
            Err(e) => println!("error: {e}"),
        }
    }

    tracing::info!("shutting down");
    cancel.cancel();
    service_task.await?;
    printer.await?;
    Ok(())
}

/// Reads stdin on a plain thread so a pending read never blocks shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Runs one command against the service and prints its result.
async fn execute(handle: &ServiceHandle, command: Command) -> Result<(), ConnectionError> {
    match command {
        Command::Set(raw) => {
            handle.set_connection_string(raw.as_bytes()).await?;
            println!("ok");
        }
        Command::Clear => {
            handle.set_connection_string(b"").await?;
            println!("ok");
        }
        Command::Connect => {
            handle.connect().await?;
            println!("ok");
        }
        Command::Disconnect => {
            handle.disconnect().await?;
            println!("ok");
        }
        Command::Hub => {
            let hub = handle.hub_name().await?;
            println!("hub {}", hub.as_deref().unwrap_or("<none>"));
        }
        Command::Device => {
            let device = handle.device_id().await?;
            println!("device {}", device.as_deref().unwrap_or("<none>"));
        }
        Command::Status => print_status(handle.status().await?),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn print_status(status: ConnectionStatus) {
    println!("status {status} ({})", status.as_u16());
}
