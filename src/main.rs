use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod calculator;
mod config;
mod export;
mod fetch;
mod filler;
mod models;
mod national;
mod output;
mod pipeline;
mod ranking;
mod reference;
mod report;
mod search_index;
mod states;
mod yaai;

use config::DataPaths;

#[derive(Parser)]
#[command(name = "barometer")]
#[command(about = "Builds the Financial Health Barometer and Young Adult Affordability datasets", long_about = None)]
struct Cli {
    /// Directory the dashboards load their data files from
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch government statistics and rebuild the Barometer dataset
    Run {
        /// Housing reference file (defaults to <data-dir>/reference/housing-burden.json)
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Seed for the estimates of missing values
        #[arg(long)]
        seed: Option<u64>,
        /// Do not query search trends
        #[arg(long)]
        skip_trends: bool,
    },
    /// Score the Young Adult Affordability Index
    Yaai {
        /// Young adult dataset, JSON or generated script (defaults to <data-dir>/young-adult-data.json)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Refresh the national youth unemployment rate from BLS first
        #[arg(long)]
        refresh_unemployment: bool,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Fetch every search term for every state into today's raw trends file
    FetchTrends,
    /// Build the search-trends index from a raw trends file
    TrendsIndex {
        /// Date of the raw file, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Export latest.json as CSV for researchers
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report of latest.json
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barometer=info")))
        .init();

    let cli = Cli::parse();
    let paths = DataPaths::new(cli.data_dir);

    match cli.command {
        Commands::Run {
            reference,
            seed,
            skip_trends,
        } => {
            let options = pipeline::BarometerOptions {
                paths: paths.clone(),
                reference,
                seed,
                skip_trends,
            };
            let dataset = pipeline::run_barometer(&options).await?;

            println!("National averages:");
            for line in report::national_summary(&dataset) {
                println!("- {line}");
            }
            println!(
                "Written {} and {}.",
                paths.latest_json().display(),
                paths.dashboard_script().display()
            );
        }
        Commands::Yaai {
            input,
            refresh_unemployment,
            top,
        } => {
            let input = input.unwrap_or_else(|| paths.young_adult_json());
            let dataset = pipeline::run_yaai(&input, &paths, refresh_unemployment).await?;

            print!("{}", report::affordability_summary(&dataset, top));
            println!(
                "Written {} and {}.",
                paths.young_adult_json().display(),
                paths.student_map_script().display()
            );
        }
        Commands::FetchTrends => {
            let today = Utc::now().date_naive();
            let (outcome, path) = pipeline::run_fetch_trends(&paths, today).await?;

            if outcome.aborted {
                println!(
                    "Trends fetch aborted after {} requests; partial data saved to {}.",
                    outcome.requests,
                    path.display()
                );
            } else {
                println!(
                    "Fetched {} terms ({} failed) into {}.",
                    outcome.requests,
                    outcome.failures,
                    path.display()
                );
            }
        }
        Commands::TrendsIndex { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let dataset = pipeline::run_trends_index(&paths, date)?;

            println!("Search trends index for {} states:", dataset.states.len());
            for line in report::national_summary(&dataset) {
                println!("- {line}");
            }
        }
        Commands::Export { out } => {
            let dataset = output::read_dataset(&paths.latest_json())?;
            let out = out.unwrap_or_else(|| paths.csv_export());
            let rows = export::write_csv(&dataset, &out)?;
            println!("Exported {rows} states to {}.", out.display());
        }
        Commands::Report { out, top } => {
            let dataset = output::read_dataset(&paths.latest_json())?;
            let report = report::build_report(&dataset, top);
            std::fs::write(&out, report).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
