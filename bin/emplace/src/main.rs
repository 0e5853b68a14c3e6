//! emplace deploys a compiled contract to an EVM chain, and does nothing when it is already there.

mod cli;
mod config;

use anyhow::Result;
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, DeployArgs};
use config::ProjectConfig;
use emplace_deploy::{
    DEPLOYER_ACCOUNT, DefaultOrchestrator, DeployError, DeploymentRecord, DeploymentRequest,
    NetworkTier,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let project = ProjectConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Deploy(args) => deploy(&project, args).await,
    }
}

async fn deploy(project: &ProjectConfig, args: DeployArgs) -> Result<()> {
    let runtime = project.runtime(&args)?;
    let request = DeploymentRequest {
        contract_name: args.tags.clone(),
        constructor_args: project.constructor_args(&args.tags, args.args.as_deref()),
        deployer: DEPLOYER_ACCOUNT.to_string(),
    };

    tracing::info!(
        network = %runtime.network,
        rpc_url = %runtime.rpc_url,
        contract = %request.contract_name,
        "Starting deployment..."
    );

    let record = match DefaultOrchestrator::from_config(&runtime)?.run(request).await {
        Ok(record) => record,
        Err(err) => {
            if let Some(classified) = err.downcast_ref::<DeployError>() {
                tracing::error!(error = %classified, "Deployment aborted");
            }
            return Err(err);
        }
    };

    println!("{}", summary(&runtime.network, &record));

    Ok(())
}

fn summary(network: &str, record: &DeploymentRecord) -> Table {
    let mut table = Table::new();
    table
        .set_header(vec!["Contract", "Network", "Address", "Transaction", "Chain", "Tier"])
        .add_row(vec![
            record.contract_name.clone(),
            network.to_string(),
            record.address.to_string(),
            record.transaction_hash.to_string(),
            record.chain_id.clone(),
            NetworkTier::classify(&record.chain_id).to_string(),
        ]);
    table
}
