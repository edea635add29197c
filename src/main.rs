use clap::Parser;
use modis_processor::cli::{run, Cli};
use modis_processor::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
