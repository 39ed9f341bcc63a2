use anyhow::Result;
use bank_ledger::cli::Cli;
use bank_ledger::telemetry;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);
    cli.run().await
}
