use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mutualnet_core::message::Message;
use mutualnet_core::transport::{self, Inbound};
use mutualnet_directory::clock::ClockState;
use mutualnet_directory::config::{Cli, DirectoryConfig};
use mutualnet_directory::{Directory, TcpLivenessProbe};
use mutualnet_core::message::LogicalDate;
use tracing::{error, info, warn};

#[compio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match DirectoryConfig::load(cli.config.as_ref()) {
        Ok(base) => cli.apply(base),
        Err(e) => {
            error!(error = %e, "failed to load directory config");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "mutualnet-directory exited with a fatal error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: DirectoryConfig) -> mutualnet_core::error::Result<()> {
    let directory = Directory::new(
        TcpLivenessProbe {
            host: config.probe_host.clone(),
        },
        config.probe_host.clone(),
        ClockState::monday_open(LogicalDate::new(2026, 1, 5)),
    );
    let directory = std::sync::Arc::new(directory);

    let (tx, rx) = flume::unbounded::<Inbound>();
    let listen_addr = config.listen_addr.clone();
    let listen_port = config.listen_port;
    compio::runtime::spawn(async move {
        if let Err(e) = transport::serve(&listen_addr, listen_port, tx).await {
            error!(error = %e, "directory accept loop failed");
        }
    })
    .detach();

    {
        let directory = directory.clone();
        let tick_interval = Duration::from_secs(config.tick_interval_secs.max(1));
        let probe_host = config.probe_host.clone();
        compio::runtime::spawn(async move {
            loop {
                compio::time::sleep(tick_interval).await;
                let (date, hour) = directory.advance_tick();
                info!(?date, hour, "logical clock tick");
                let update = Message::TimeUpdate {
                    server_date: date,
                    server_time: hour,
                };
                for port in directory.active_super_peer_ports() {
                    let update = update.clone();
                    let host = probe_host.clone();
                    compio::runtime::spawn(async move {
                        let _ = transport::send(&host, port, &update, false, Duration::from_secs(2), 1).await;
                    })
                    .detach();
                }
            }
        })
        .detach();
    }

    info!(addr = %config.listen_addr, port = config.listen_port, "mutualnet-directory listening");

    while let Ok(inbound) = rx.recv_async().await {
        let directory = directory.clone();
        compio::runtime::spawn(async move {
            dispatch(&directory, inbound).await;
        })
        .detach();
    }
    Ok(())
}

async fn dispatch<P: mutualnet_directory::LivenessProbe>(
    directory: &mutualnet_directory::Directory<P>,
    inbound: Inbound,
) {
    let action = inbound.message.action();
    let reply = match inbound.message {
        Message::Register { group, name, port_num } => {
            Some(directory.register(group, &name, port_num).await)
        }
        Message::Election {
            group,
            name,
            port_num,
            elec_num,
        } => Some(directory.election(group, &name, port_num, elec_num).await),
        Message::Query { group } => Some(directory.query(group)),
        other => {
            warn!(action = other.action(), "directory received unsupported action");
            None
        }
    };
    if let (Some(reply), Some(sender)) = (reply, inbound.reply) {
        info!(action, reply_action = reply.action(), "directory replied");
        sender.send(reply);
    }
}
