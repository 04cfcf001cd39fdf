//! CLI commands for keiba-harvest.
//!
//! Ingestion commands drive the browser and write to the store; query
//! commands read the store and print JSON to stdout.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use keiba_harvest::config::AppConfig;
use keiba_harvest::ingest::{HorseParts, IngestReport, Ingestor};
use keiba_harvest::query::{Criterion, HistoryQuery, QueryEngine, SearchFilter};
use keiba_harvest::retry::{retry_item, RetryPolicy};
use keiba_harvest::scraper::{ChromeLauncher, ChromeSession, Session, SessionManager};
use keiba_harvest::storage::{DocumentStore, MongoStore, Repository};
use keiba_harvest::types::{Role, Surface};
use keiba_harvest::RaceId;

#[derive(Parser)]
#[command(name = "keiba-harvest")]
#[command(version, about = "Harvest NAR race records into MongoDB and query them", long_about = None)]
pub struct Cli {
    /// Config file stem (config.toml, config.yaml, ...)
    #[arg(short, long, global = true, default_value = "config")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the collection indexes
    InitIndexes,

    /// List the first race id of every race day between two dates
    RaceIds {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },

    /// Fetch race cards (pre-event info and starting entries) between two dates
    IngestRaces {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Refetch races already stored
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch result tables for races stored between two dates
    IngestResults {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch horse profiles, pedigrees and history
    IngestHorses {
        /// Horse ids; defaults to every horse entered in the date range
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        #[arg(long, required_unless_present = "ids")]
        start: Option<NaiveDate>,
        #[arg(long, required_unless_present = "ids")]
        end: Option<NaiveDate>,
        #[arg(long)]
        skip_profile: bool,
        #[arg(long)]
        skip_pedigree: bool,
        #[arg(long)]
        skip_history: bool,
        /// Refetch profiles and pedigrees already stored
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch jockey or trainer profiles
    IngestHumans {
        /// jockey or trainer
        #[arg(long)]
        role: Role,
        /// Profile ids; defaults to every id referenced by a starting entry
        /// but not yet stored
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        #[arg(short, long)]
        force: bool,
    },

    /// Race history of one or more participants
    History {
        /// horse, jockey or trainer
        #[arg(long, default_value = "horse")]
        role: Role,
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
        /// One label per id; a single id without a label is labelled by itself
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },

    /// Search historical starts by race attributes
    Search {
        #[arg(long, default_value = "horse")]
        role: Role,
        /// Regular expression on the race name
        #[arg(long)]
        race_name: Option<String>,
        #[arg(long)]
        venue: Option<String>,
        /// 芝, ダ or 障
        #[arg(long)]
        surface: Option<Surface>,
        #[arg(long)]
        distance: Option<u32>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        participant: Option<String>,
    },

    /// Participants starting at least `threshold` times across a set of races
    Duplicates {
        /// Race ids; defaults to every race stored in the date range
        #[arg(long, value_delimiter = ',')]
        races: Vec<RaceId>,
        #[arg(long, required_unless_present = "races")]
        start: Option<NaiveDate>,
        #[arg(long, required_unless_present = "races")]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "horse")]
        role: Role,
        #[arg(short, long, default_value_t = 2)]
        threshold: u32,
        /// Print the participants' history instead of their ids
        #[arg(long)]
        history: bool,
        /// Ids left out of the history output
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },
}

/// Browser-side state threaded through batch items.
struct Live {
    ingestor: Ingestor<ChromeLauncher>,
    session: ChromeSession,
}

impl Live {
    async fn close(self) {
        let mut session = self.session;
        session.close().await;
    }
}

/// Outputs of the items that succeeded and names of those given up on.
struct Batch<R> {
    done: Vec<R>,
    failed: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct BatchSummary {
    items: usize,
    pages: u32,
    written: usize,
    skipped: usize,
    failed: Vec<String>,
}

impl From<Batch<IngestReport>> for BatchSummary {
    fn from(batch: Batch<IngestReport>) -> Self {
        let mut summary = BatchSummary {
            items: batch.done.len() + batch.failed.len(),
            failed: batch.failed,
            ..BatchSummary::default()
        };
        for report in batch.done {
            summary.pages += report.pages;
            summary.written += report.written;
            summary.skipped += report.skipped;
        }
        summary
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    Ok(Arc::new(MongoStore::connect(&config.store).await?))
}

async fn start_browser(config: &AppConfig, store: Arc<dyn DocumentStore>) -> anyhow::Result<Live> {
    let launcher = ChromeLauncher::new(config.scraper.chrome_path.clone());
    let ingestor = Ingestor::new(SessionManager::new(launcher, &config.scraper), Repository::new(store));
    let session = ingestor.launch().await?;
    Ok(Live { ingestor, session })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `operation` over every item, retrying each per `policy`. Items the
/// policy gives up on are logged and recorded, and the batch moves on.
async fn run_batch<T, R, F, Fut>(mut live: Live, policy: &RetryPolicy, items: Vec<T>, mut operation: F) -> (Live, Batch<R>)
where
    T: Clone + Display,
    F: FnMut(Live, T) -> Fut,
    Fut: Future<Output = (Live, keiba_harvest::Result<R>)>,
{
    let total = items.len();
    let mut batch = Batch {
        done: Vec::with_capacity(total),
        failed: Vec::new(),
    };

    for (index, item) in items.into_iter().enumerate() {
        let name = item.to_string();
        let (next, result) = retry_item(policy, &name, live, |live| operation(live, item.clone())).await;
        live = next;
        match result {
            Ok(output) => batch.done.push(output),
            Err(e) => {
                tracing::error!(item = %name, error = %e, "batch item skipped");
                batch.failed.push(name);
            }
        }
        if (index + 1) % 50 == 0 {
            tracing::info!("{}/{} items done", index + 1, total);
        }
    }

    (live, batch)
}

/// Race ids stored with a pre-event date in `[start, end]`.
async fn stored_races(store: &Arc<dyn DocumentStore>, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Vec<RaceId>> {
    let engine = QueryEngine::new(store.clone());
    Ok(engine.race_ids_by_date(start, end).await?)
}

pub async fn run_init_indexes(config: &AppConfig) -> anyhow::Result<()> {
    let store = connect(config).await?;
    store.ensure_indexes().await?;
    tracing::info!("Indexes ready");
    Ok(())
}

pub async fn run_race_ids(config: &AppConfig, start: NaiveDate, end: NaiveDate) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let Live { mut ingestor, session } = start_browser(config, store).await?;

    let (session, ids) = ingestor.enumerator().race_ids(session, start, end).await;
    Live { ingestor, session }.close().await;

    let ids: BTreeSet<RaceId> = ids?.into_iter().collect();
    let ids: Vec<String> = ids.iter().map(RaceId::to_string).collect();
    print_json(&ids)
}

pub async fn run_ingest_races(config: &AppConfig, start: NaiveDate, end: NaiveDate, force: bool) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let policy = RetryPolicy::from(&config.ingest);
    let Live { mut ingestor, session } = start_browser(config, store).await?;

    let (session, first_races) = ingestor.enumerator().race_ids(session, start, end).await;
    let live = Live { ingestor, session };
    let first_races: BTreeSet<RaceId> = match first_races {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            live.close().await;
            return Err(e.into());
        }
    };
    tracing::info!("{} race days between {} and {}", first_races.len(), start, end);

    // The calendar links each day's first race; its page lists the rest.
    let (live, days) = run_batch(live, &policy, first_races.into_iter().collect(), |live, first: RaceId| async move {
        let Live { mut ingestor, session } = live;
        let (session, result) = ingestor.enumerator().expand_day(session, &first).await;
        (Live { ingestor, session }, result)
    })
    .await;
    let race_ids: BTreeSet<RaceId> = days.done.into_iter().flatten().collect();
    tracing::info!("{} races to ingest ({} days failed)", race_ids.len(), days.failed.len());

    let (live, batch) = run_batch(live, &policy, race_ids.into_iter().collect(), |live, race_id: RaceId| async move {
        let Live { mut ingestor, session } = live;
        let (session, result) = ingestor.ingest_race(session, &race_id, force).await;
        (Live { ingestor, session }, result)
    })
    .await;
    live.close().await;

    let mut summary = BatchSummary::from(batch);
    summary.failed.extend(days.failed);
    print_json(&summary)
}

pub async fn run_ingest_results(config: &AppConfig, start: NaiveDate, end: NaiveDate, force: bool) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let policy = RetryPolicy::from(&config.ingest);
    let race_ids = stored_races(&store, start, end).await?;
    tracing::info!("{} stored races between {} and {}", race_ids.len(), start, end);

    let live = start_browser(config, store).await?;
    let (live, batch) = run_batch(live, &policy, race_ids, |live, race_id: RaceId| async move {
        let Live { mut ingestor, session } = live;
        let (session, result) = ingestor.ingest_results(session, &race_id, force).await;
        (Live { ingestor, session }, result)
    })
    .await;
    live.close().await;
    print_json(&BatchSummary::from(batch))
}

#[allow(clippy::too_many_arguments)]
pub async fn run_ingest_horses(
    config: &AppConfig,
    ids: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    skip_profile: bool,
    skip_pedigree: bool,
    skip_history: bool,
    force: bool,
) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let policy = RetryPolicy::from(&config.ingest);
    let parts = HorseParts {
        profile: !skip_profile,
        pedigree: !skip_pedigree,
        history: !skip_history,
    };

    let horse_ids = match (ids.is_empty(), start, end) {
        (false, _, _) => ids,
        (true, Some(start), Some(end)) => {
            let engine = QueryEngine::new(store.clone());
            let mut horse_ids = BTreeSet::new();
            for race_id in engine.race_ids_by_date(start, end).await? {
                horse_ids.extend(engine.role_ids_by_race(&race_id, Role::Horse).await?);
            }
            horse_ids.into_iter().collect()
        }
        _ => anyhow::bail!("either --ids or both --start and --end are required"),
    };
    tracing::info!("{} horses to ingest", horse_ids.len());

    let live = start_browser(config, store).await?;
    let (live, batch) = run_batch(live, &policy, horse_ids, |live, horse_id: String| async move {
        let Live { mut ingestor, session } = live;
        let (session, result) = ingestor.ingest_horse(session, &horse_id, parts, force).await;
        (Live { ingestor, session }, result)
    })
    .await;
    live.close().await;
    print_json(&BatchSummary::from(batch))
}

pub async fn run_ingest_humans(config: &AppConfig, role: Role, ids: Vec<String>, force: bool) -> anyhow::Result<()> {
    if role == Role::Horse {
        anyhow::bail!("use ingest-horses for horses");
    }
    let store = connect(config).await?;
    let policy = RetryPolicy::from(&config.ingest);

    let ids = if ids.is_empty() {
        QueryEngine::new(store.clone()).missing_profile_ids(role).await?
    } else {
        ids
    };
    tracing::info!("{} {} profiles to ingest", ids.len(), role);

    let live = start_browser(config, store).await?;
    let (live, batch) = run_batch(live, &policy, ids, |live, id: String| async move {
        let Live { mut ingestor, session } = live;
        let (session, result) = ingestor.ingest_human(session, role, &id, force).await;
        (Live { ingestor, session }, result)
    })
    .await;
    live.close().await;
    print_json(&BatchSummary::from(batch))
}

pub async fn run_history(config: &AppConfig, role: Role, ids: Vec<String>, labels: Vec<String>) -> anyhow::Result<()> {
    let engine = QueryEngine::new(connect(config).await?);

    let query = if !labels.is_empty() {
        HistoryQuery::batch(role, ids, labels)?
    } else if ids.len() == 1 {
        HistoryQuery::single(role, ids[0].clone(), ids[0].clone())?
    } else {
        HistoryQuery::batch(role, ids.clone(), ids)?
    };
    print_json(&engine.history(&query).await?)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    config: &AppConfig,
    role: Role,
    race_name: Option<String>,
    venue: Option<String>,
    surface: Option<Surface>,
    distance: Option<u32>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    participant: Option<String>,
) -> anyhow::Result<()> {
    let filter = SearchFilter::builder(role)
        .race_name(Criterion::from(race_name))
        .venue(Criterion::from(venue))
        .surface(Criterion::from(surface))
        .distance(Criterion::from(distance))
        .dates(from, to)
        .participant(Criterion::from(participant))
        .build()?;

    let engine = QueryEngine::new(connect(config).await?);
    print_json(&engine.search(&filter).await?)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_duplicates(
    config: &AppConfig,
    races: Vec<RaceId>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    role: Role,
    threshold: u32,
    history: bool,
    exclude: Vec<String>,
) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let races = match (races.is_empty(), start, end) {
        (false, _, _) => races,
        (true, Some(start), Some(end)) => stored_races(&store, start, end).await?,
        _ => anyhow::bail!("either --races or both --start and --end are required"),
    };

    let engine = QueryEngine::new(store);
    if history {
        print_json(&engine.co_occurring_history(&races, role, threshold, &exclude).await?)
    } else {
        print_json(&engine.find_duplicates(&races, role, threshold).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "keiba-harvest",
            "search",
            "--role",
            "jockey",
            "--surface",
            "ダ",
            "--distance",
            "1200",
            "--from",
            "2024-01-01",
        ]);
        match cli.command {
            Commands::Search {
                role,
                surface,
                distance,
                from,
                to,
                ..
            } => {
                assert_eq!(role, Role::Jockey);
                assert_eq!(surface, Some(Surface::Dirt));
                assert_eq!(distance, Some(1200));
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(to, None);
            }
            _ => panic!("expected search"),
        }
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_parse_duplicates_with_races() {
        let cli = Cli::parse_from([
            "keiba-harvest",
            "duplicates",
            "--races",
            "202444010501,202444010502",
            "--threshold",
            "3",
        ]);
        match cli.command {
            Commands::Duplicates {
                races,
                threshold,
                role,
                history,
                ..
            } => {
                assert_eq!(races.len(), 2);
                assert_eq!(threshold, 3);
                assert_eq!(role, Role::Horse);
                assert!(!history);
            }
            _ => panic!("expected duplicates"),
        }
    }

    #[test]
    fn test_date_range_required_without_ids() {
        assert!(Cli::try_parse_from(["keiba-harvest", "ingest-horses"]).is_err());
        assert!(Cli::try_parse_from(["keiba-harvest", "ingest-horses", "--ids", "2020100001"]).is_ok());
    }

    #[test]
    fn test_summary_totals() {
        let batch = Batch {
            done: vec![
                IngestReport {
                    pages: 1,
                    written: 12,
                    skipped: 0,
                },
                IngestReport {
                    pages: 0,
                    written: 0,
                    skipped: 1,
                },
            ],
            failed: vec!["202444010511".to_string()],
        };
        let summary = BatchSummary::from(batch);
        assert_eq!(summary.items, 3);
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.written, 12);
        assert_eq!(summary.skipped, 1);
    }
}
