//! One-shot customer CLI (SPEC_FULL.md §6, excluded subsystem — interface
//! only). Connects to an exchange, sends a single `TradeMF{fund, qty}`,
//! waits for the synchronous `TradeMFAck`, and exits 0 on `OK`, 1
//! otherwise. Used by integration tests to drive a buy end-to-end.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mutualnet_core::message::{Message, TradeResult};
use mutualnet_core::transport;

#[derive(Debug, Parser)]
#[command(name = "mutualnet-client", about = "Send one TradeMF to an exchange and print the ack")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long)]
    port: u16,

    #[arg(long)]
    fund: String,

    #[arg(long, default_value_t = 1)]
    qty: u32,
}

#[compio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let reply = transport::send(
        &cli.host,
        cli.port,
        &Message::TradeMf {
            data: cli.fund.clone(),
            qty: cli.qty,
        },
        true,
        Duration::from_secs(15),
        1,
    )
    .await;

    match reply {
        Ok(Some(Message::TradeMfAck { result, order_number })) => {
            println!("order {order_number}: {result:?}");
            if matches!(result, TradeResult::Ok) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Ok(other) => {
            eprintln!("unexpected reply: {other:?}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("trade request failed: {e}");
            ExitCode::FAILURE
        }
    }
}
