use tracing::{debug, info};

use crate::cli::args::{Cli, Commands, RunArgs};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::processors::EnrichmentPipeline;
use crate::writers::OutputInspector;

pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(&cli);

    match cli.command {
        Commands::Run(ref args) => run_pipeline(args, cli.quiet).await,
        Commands::Info { ref output, sample } => {
            let info = OutputInspector::inspect(output)?;
            println!("{}", info.summary());

            let largest = info.largest_partitions(sample);
            if !largest.is_empty() {
                println!("\nLargest partitions:");
                for partition in largest {
                    println!(
                        "  {:<28} {:>8} rows",
                        partition.geohash.as_deref().unwrap_or("(none)"),
                        partition.rows
                    );
                }
            }

            let rows = OutputInspector::read_rows(output, Some(sample))?;
            if !rows.is_empty() {
                println!("\nSample rows:");
                for row in rows {
                    println!(
                        "  {} [{}] ({}, {}) avg_tmpr_c={} wthr_date={}",
                        row.id,
                        row.geohash.as_deref().unwrap_or("-"),
                        fmt_opt(row.lat),
                        fmt_opt(row.lng),
                        fmt_opt(row.avg_tmpr_c),
                        row.wthr_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
                    );
                }
            }
            Ok(())
        }
    }
}

/// Load layered configuration and apply the command-line overrides on top.
pub fn load_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.check()?;
    debug!("{:?}", config);
    Ok(config)
}

async fn run_pipeline(args: &RunArgs, quiet: bool) -> Result<()> {
    let config = load_config(args)?;
    info!("{}", config.summary());

    let pipeline = EnrichmentPipeline::from_config(config)?.with_silent(quiet);
    let report = pipeline.run().await?;

    println!("{}", report.summary());
    if !report.sample.is_empty() {
        println!("\nFirst {} enriched rows:", report.sample.len());
        for line in &report.sample {
            println!("  {}", line);
        }
    }
    Ok(())
}

fn setup_logging(cli: &Cli) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("restaurant_enricher={}", cli.log_level())));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .try_init();

    if result.is_ok() {
        debug!("Logging initialized at level: {}", cli.log_level());
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "-".to_string())
}
