//! Single-item ingestion: fetch, decode, upsert.
//!
//! Each operation takes the live session and hands it back with the
//! outcome, whether or not the fetch replaced it. Batch loops belong to the
//! caller (see [`crate::retry`]).
//!
//! The page cache lives for one operation: a retried or forced call always
//! goes back to the site.

use tracing::{debug, info};

use crate::error::{Context, Error, Result};
use crate::race_id::RaceId;
use crate::scraper::parsers::{
    EntryTableParser, HistoryParser, HorseParser, HumanParser, PedigreeParser, PreEventParser, ResultTableParser,
};
use crate::scraper::{
    horse_url, jockey_url, pedigree_url, race_card_url, race_result_url, trainer_url, Launcher, RaceIdEnumerator,
    RenderedPage, SessionManager,
};
use crate::storage::Repository;
use crate::types::Role;

/// Unwrap a result or hand the session back with the error.
macro_rules! try_with {
    ($session:expr, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => return ($session, Err(e.into())),
        }
    };
}

/// What one ingestion call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: u32,
    pub written: usize,
    pub skipped: usize,
}

/// Which parts of a horse to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorseParts {
    pub profile: bool,
    pub pedigree: bool,
    pub history: bool,
}

impl Default for HorseParts {
    fn default() -> Self {
        Self {
            profile: true,
            pedigree: true,
            history: true,
        }
    }
}

pub struct Ingestor<L: Launcher> {
    manager: SessionManager<L>,
    repository: Repository,
}

impl<L: Launcher> Ingestor<L> {
    pub fn new(manager: SessionManager<L>, repository: Repository) -> Self {
        Self { manager, repository }
    }

    pub async fn launch(&self) -> Result<L::Session> {
        self.manager.launch().await
    }

    pub fn enumerator(&mut self) -> RaceIdEnumerator<'_, L> {
        RaceIdEnumerator::new(&mut self.manager)
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Start a decoding session: pages cached by earlier calls are dropped.
    fn begin(&mut self) {
        self.manager.clear_cache();
    }

    async fn fetch(&mut self, session: L::Session, url: &str) -> (L::Session, Result<RenderedPage>) {
        self.manager.fetch(session, url).await
    }

    /// Pre-event metadata and starting entries from the race card. A race
    /// already on file is skipped unless `force`; so is each entry.
    pub async fn ingest_race(
        &mut self,
        session: L::Session,
        race_id: &RaceId,
        force: bool,
    ) -> (L::Session, Result<IngestReport>) {
        self.begin();
        let mut report = IngestReport::default();
        if !force && try_with!(session, self.repository.pre_event_exists(race_id).await) {
            debug!(%race_id, "race already stored, skipping fetch");
            report.skipped += 1;
            return (session, Ok(report));
        }

        let (session, page) = self.fetch(session, &race_card_url(race_id)).await;
        let page = try_with!(session, page);
        report.pages += 1;

        let info = try_with!(session, PreEventParser::parse(page.html()).with_context(|| format!("race {race_id}")));
        let entries = try_with!(session, EntryTableParser::parse(page.html()).with_context(|| format!("race {race_id}")));

        if try_with!(session, self.repository.save_pre_event(race_id, &info).await) {
            report.written += 1;
        }

        let mut pending = Vec::with_capacity(entries.len());
        for entry in entries {
            if !force && try_with!(session, self.repository.starting_entry_exists(race_id, entry.entry_number).await) {
                report.skipped += 1;
                continue;
            }
            pending.push(entry);
        }
        report.written += try_with!(session, self.repository.save_starting_entries(race_id, &pending).await);

        info!(%race_id, written = report.written, skipped = report.skipped, "race ingested");
        (session, Ok(report))
    }

    /// Result rows, plus the starting-entry view the result page carries.
    pub async fn ingest_results(
        &mut self,
        session: L::Session,
        race_id: &RaceId,
        force: bool,
    ) -> (L::Session, Result<IngestReport>) {
        self.begin();
        let mut report = IngestReport::default();
        if !force && try_with!(session, self.repository.results_exist(race_id).await) {
            debug!(%race_id, "results already stored, skipping fetch");
            report.skipped += 1;
            return (session, Ok(report));
        }

        let (session, page) = self.fetch(session, &race_result_url(race_id)).await;
        let page = try_with!(session, page);
        report.pages += 1;

        let rows = try_with!(session, ResultTableParser::parse(page.html()).with_context(|| format!("results {race_id}")));
        let (entries, results): (Vec<_>, Vec<_>) = rows.into_iter().map(|row| (row.entry, row.result)).unzip();

        report.written += try_with!(session, self.repository.save_starting_entries(race_id, &entries).await);
        report.written += try_with!(session, self.repository.save_results(race_id, &results).await);

        info!(%race_id, rows = results.len(), "results ingested");
        (session, Ok(report))
    }

    /// Profile and pedigree are fetched only when missing (or `force`);
    /// history is always refreshed.
    pub async fn ingest_horse(
        &mut self,
        mut session: L::Session,
        horse_id: &str,
        parts: HorseParts,
        force: bool,
    ) -> (L::Session, Result<IngestReport>) {
        self.begin();
        let mut report = IngestReport::default();
        let profile_url = horse_url(horse_id);

        if parts.profile {
            if force || !try_with!(session, self.repository.profile_exists(Role::Horse, horse_id).await) {
                let (next, page) = self.fetch(session, &profile_url).await;
                session = next;
                let page = try_with!(session, page);
                report.pages += 1;
                let profile = try_with!(session, HorseParser::parse(page.html()).with_context(|| format!("horse {horse_id}")));
                if try_with!(session, self.repository.save_horse(horse_id, &profile).await) {
                    report.written += 1;
                }
            } else {
                report.skipped += 1;
            }
        }

        if parts.pedigree {
            if force || !try_with!(session, self.repository.pedigree_exists(horse_id).await) {
                let (next, page) = self.fetch(session, &pedigree_url(horse_id)).await;
                session = next;
                let page = try_with!(session, page);
                report.pages += 1;
                let pedigree =
                    try_with!(session, PedigreeParser::parse(page.html()).with_context(|| format!("pedigree {horse_id}")));
                if try_with!(session, self.repository.save_pedigree(horse_id, &pedigree).await) {
                    report.written += 1;
                }
            } else {
                report.skipped += 1;
            }
        }

        if parts.history {
            let (next, page) = self.fetch(session, &profile_url).await;
            session = next;
            let page = try_with!(session, page);
            report.pages += 1;
            let rows = try_with!(session, HistoryParser::parse(page.html()).with_context(|| format!("history {horse_id}")));
            let trainer_id = try_with!(session, self.repository.horse_trainer_id(horse_id).await);
            let saved = self
                .repository
                .save_history(horse_id, trainer_id.as_deref(), &rows)
                .await
                .with_context(|| format!("history {horse_id}"));
            report.written += try_with!(session, saved);
        }

        info!(horse_id, pages = report.pages, written = report.written, "horse ingested");
        (session, Ok(report))
    }

    /// Jockey or trainer profile, skipped when already stored unless `force`.
    pub async fn ingest_human(
        &mut self,
        session: L::Session,
        role: Role,
        id: &str,
        force: bool,
    ) -> (L::Session, Result<IngestReport>) {
        let url = match role {
            Role::Jockey => jockey_url(id),
            Role::Trainer => trainer_url(id),
            Role::Horse => return (session, Err(Error::query("ingest_human", id, "horses use ingest_horse"))),
        };
        self.begin();

        let mut report = IngestReport::default();
        if !force && try_with!(session, self.repository.profile_exists(role, id).await) {
            debug!(%role, id, "profile already stored, skipping fetch");
            report.skipped += 1;
            return (session, Ok(report));
        }

        let (session, page) = self.fetch(session, &url).await;
        let page = try_with!(session, page);
        report.pages += 1;

        let profile = try_with!(session, HumanParser::parse(page.html()).with_context(|| format!("{role} {id}")));
        if try_with!(session, self.repository.save_human(role, id, &profile).await) {
            report.written += 1;
        }
        (session, Ok(report))
    }
}
