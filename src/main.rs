use anyhow::Result;
use clap::Parser;
use rapidcsv::config::Config;
use rapidcsv::db::Database;
use rapidcsv::ingestion::{CsvSource, IngestionOrchestrator, IngestionReport, IngestionRun};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rapidcsv", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Source name; also the destination table name
    source_name: String,

    /// CSV file with a header row
    file_path: PathBuf,
}

fn show_usage() {
    let program = std::env::args().next().unwrap_or_else(|| "rapidcsv".to_string());
    println!("Usage: {} <table> <csv>", program);
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rapidcsv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(_) => {
            println!("Invalid command usage\n");
            show_usage();
            return ExitCode::from(1);
        }
    };

    match run(args).await {
        Ok(report) => {
            info!(
                "Run {} finished: {} rows in {}",
                report.run_id, report.rows_loaded, report.table_name
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<IngestionReport> {
    let config = Config::load()?;
    let orchestrator = IngestionOrchestrator::new();
    let source = CsvSource::new(&args.file_path);

    let mut run = IngestionRun::new(args.source_name);
    orchestrator.plan(&mut run, &source)?;

    let database = Database::from_config(&config);
    let mut store = database.sql_connection().await?;

    let report = orchestrator.apply(&mut run, store.as_mut(), &source).await?;
    Ok(report)
}
