use std::env;
use std::io;
use std::process::ExitCode;

use bbt_dash::Dashboard;
use bbt_dash::config::Config;
use bbt_dash::csv::{read_actions, write_history};
use bbt_dash::sim::SimChain;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: bbt-dash <actions.csv>");
        return ExitCode::from(2);
    };

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let actions = match read_actions(path.clone()) {
        Ok(actions) => actions,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let dashboard = Dashboard::new(config, Some(SimChain::new()));
    if let Err(e) = dashboard.connect().await {
        error!(reason = %e, "failed to connect wallet");
        return ExitCode::FAILURE;
    }

    let (action_sender, action_receiver) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        for result in actions {
            match result {
                Ok(action) => {
                    if action_sender.send(action).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    for submitted in dashboard.run(ReceiverStream::new(action_receiver)).await {
        let hash = submitted.hash;
        if let Err(e) = submitted.wait().await {
            warn!(hash = %hash, reason = %e, "confirmation task aborted");
        }
    }

    let snapshot = dashboard.system_metrics().await;
    info!(
        total_supply = %snapshot.total_supply,
        reserve = %snapshot.reserve_balance,
        ratio = %snapshot.collateralization_ratio,
        health = %snapshot.system_health,
        "final system state"
    );

    if let Err(e) = write_history(&dashboard.history(), io::stdout().lock()) {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
