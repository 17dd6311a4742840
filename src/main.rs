use clap::Parser;
use restaurant_enricher::cli::{run, Cli};
use restaurant_enricher::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
