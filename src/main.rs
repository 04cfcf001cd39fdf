//! keiba-harvest
//!
//! CLI for harvesting NAR race records and querying the stored history.

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use keiba_harvest::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "keiba_harvest=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load_from(&cli.config)?;
    tracing::debug!("Configuration loaded: {:?}", config);

    match cli.command {
        Commands::InitIndexes => cli::run_init_indexes(&config).await,
        Commands::RaceIds { start, end } => cli::run_race_ids(&config, start, end).await,
        Commands::IngestRaces { start, end, force } => cli::run_ingest_races(&config, start, end, force).await,
        Commands::IngestResults { start, end, force } => cli::run_ingest_results(&config, start, end, force).await,
        Commands::IngestHorses {
            ids,
            start,
            end,
            skip_profile,
            skip_pedigree,
            skip_history,
            force,
        } => {
            cli::run_ingest_horses(
                &config,
                ids,
                start,
                end,
                skip_profile,
                skip_pedigree,
                skip_history,
                force,
            )
            .await
        }
        Commands::IngestHumans { role, ids, force } => cli::run_ingest_humans(&config, role, ids, force).await,
        Commands::History { role, ids, labels } => cli::run_history(&config, role, ids, labels).await,
        Commands::Search {
            role,
            race_name,
            venue,
            surface,
            distance,
            from,
            to,
            participant,
        } => cli::run_search(&config, role, race_name, venue, surface, distance, from, to, participant).await,
        Commands::Duplicates {
            races,
            start,
            end,
            role,
            threshold,
            history,
            exclude,
        } => cli::run_duplicates(&config, races, start, end, role, threshold, history, exclude).await,
    }
}
