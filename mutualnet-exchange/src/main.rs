use std::process::ExitCode;

use clap::Parser;
use mutualnet_core::timer::TimerService;
use mutualnet_core::transport;
use mutualnet_exchange::config::{Cli, NodeConfig};
use mutualnet_exchange::node::NodeEvent;
use mutualnet_exchange::precommit_log::JsonLinesLog;
use mutualnet_exchange::{FundCatalogue, JsonFileInventory, Node, OverlayNode, Participant};
use tracing::{error, info};

#[compio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match NodeConfig::load(cli.config.as_ref()) {
        Ok(base) => cli.apply(base),
        Err(e) => {
            error!(error = %e, "failed to load node config");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "mutualnet-exchange exited with a fatal error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: NodeConfig) -> mutualnet_core::error::Result<()> {
    let catalogue = FundCatalogue::load(&config.catalogue_path)?;
    let inventory = JsonFileInventory::load(&config.inventory_path)?;
    let precommit_log = JsonLinesLog::open(&config.precommit_log_path)?;
    let participant = Participant::new(Box::new(inventory), Box::new(precommit_log));

    let overlay = OverlayNode::new(config.name.clone(), config.region, config.listen_port);

    let (event_tx, event_rx) = flume::unbounded::<NodeEvent>();
    let timers = TimerService::new(event_tx.clone());

    let mut node = Node::new(
        overlay,
        participant,
        catalogue,
        config.directory_addr.clone(),
        config.directory_port,
        config.listen_addr.clone(),
        timers,
    );

    if let Err(e) = node.recover() {
        error!(error = %e, "failed to recover pre-commit log");
        return Err(mutualnet_core::error::MutualNetError::protocol(e.to_string()));
    }

    let (net_tx, net_rx) = flume::unbounded::<transport::Inbound>();
    {
        let listen_addr = config.listen_addr.clone();
        let listen_port = config.listen_port;
        compio::runtime::spawn(async move {
            if let Err(e) = transport::serve(&listen_addr, listen_port, net_tx).await {
                error!(error = %e, "exchange accept loop failed");
            }
        })
        .detach();
    }
    {
        let event_tx = event_tx.clone();
        compio::runtime::spawn(async move {
            while let Ok(inbound) = net_rx.recv_async().await {
                if event_tx.send_async(NodeEvent::Network(inbound)).await.is_err() {
                    break;
                }
            }
        })
        .detach();
    }

    node.bootstrap().await;
    info!(name = %config.name, region = config.region, port = config.listen_port, "mutualnet-exchange listening");

    node.run(event_rx).await;
    Ok(())
}
