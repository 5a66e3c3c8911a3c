use clap::Parser;
use color_eyre::Result;
use grbl_bridge::{bridge::Bridge, cli, config::Config, logging};

use tracing::{debug, error, info};

#[cfg(unix)]
async fn terminated() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = hangup.recv() => Ok("Told to hang up"),
        _ = terminate.recv() => Ok("Told to terminate"),
    }
}

#[cfg(not(unix))]
async fn terminated() -> std::io::Result<&'static str> {
    std::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command)?;

        return Ok(());
    }

    logging::init(
        cli.log_level,
        cli.log_dir.map(|log_dir| (cli.log_level, log_dir)),
    )
    .await;

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let bridge = Bridge::open(config).await?;

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting");
            Ok(())
        }
        why = terminated() => {
            info!("{}, quitting", why?);
            Ok(())
        }
        result = bridge.run() => {
            error!("Bridge returned");
            match result {
                Err(e) => Err(e.into()),
                Ok(()) => Err(color_eyre::eyre::eyre!("Bridge stopped unexpectedly")),
            }
        }
    };

    bridge.shutdown().await;

    outcome
}
