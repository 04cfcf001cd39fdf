//! Race-id discovery over a date range.
//!
//! Walks the monthly calendar backward from the end date, collecting the
//! first-race id of every racing venue-day, then expands single days into
//! all of their race numbers on demand.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use super::browser::Launcher;
use super::parsers::{CalendarParser, RaceNumberParser};
use super::session::SessionManager;
use super::{calendar_url, race_card_url};
use crate::error::{Context, Error, Result};
use crate::race_id::RaceId;

/// Enumerates race ids through a session manager.
pub struct RaceIdEnumerator<'a, L: Launcher> {
    manager: &'a mut SessionManager<L>,
}

impl<'a, L: Launcher> RaceIdEnumerator<'a, L> {
    pub fn new(manager: &'a mut SessionManager<L>) -> Self {
        Self { manager }
    }

    /// First-race ids of every racing day in `start..=end`. Order carries
    /// no meaning.
    pub async fn race_ids(
        &mut self,
        mut session: L::Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> (L::Session, Result<HashSet<RaceId>>) {
        self.manager.clear_cache();
        let mut race_ids = HashSet::new();
        if start > end {
            return (session, Ok(race_ids));
        }

        let mut month = first_of_month(end);
        while month >= first_of_month(start) {
            let url = calendar_url(month.year(), month.month());
            let (next, page) = self.manager.fetch(session, &url).await;
            session = next;

            let found = match page.and_then(|page| {
                CalendarParser::parse(page.html()).with_context(|| format!("calendar {}", url))
            }) {
                Ok(found) => found,
                Err(e) => return (session, Err(e)),
            };

            let before = race_ids.len();
            race_ids.extend(
                found
                    .into_iter()
                    .filter(|id| id.date() >= start && id.date() <= end),
            );
            debug!(
                year = month.year(),
                month = month.month(),
                days = race_ids.len() - before,
                "calendar month read"
            );

            month = match previous_month(month) {
                Some(previous) => previous,
                None => break,
            };
        }

        info!(%start, %end, days = race_ids.len(), "race days enumerated");
        (session, Ok(race_ids))
    }

    /// Every race id of the venue-day that `first_race` belongs to.
    pub async fn expand_day(&mut self, session: L::Session, first_race: &RaceId) -> (L::Session, Result<Vec<RaceId>>) {
        self.manager.clear_cache();
        let url = race_card_url(first_race);
        let (session, page) = self.manager.fetch(session, &url).await;

        let result = page.and_then(|page| {
            RaceNumberParser::parse(page.html()).with_context(|| format!("race numbers {}", first_race))
        });
        let result = result.and_then(|ids| {
            if ids.is_empty() {
                Err(Error::query("expand_day", first_race.to_string(), "no race numbers linked"))
            } else {
                Ok(ids)
            }
        });
        (session, result)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn previous_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 1 {
        NaiveDate::from_ymd_opt(date.year() - 1, 12, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() - 1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::session::tests::{test_config, FakeLauncher};

    fn calendar(kaisai_ids: &[&str]) -> String {
        let links: String = kaisai_ids
            .iter()
            .map(|id| format!(r#"<div><a href="../top/race_list.html?kaisai_id={id}&kaisai_date=x">x</a></div>"#))
            .collect();
        // the enumerator only looks at links carrying "&kaisai_id="
        let links = links.replace("?kaisai_id=", "?a=1&kaisai_id=");
        format!(r#"<html><body><div class="RaceKaisaiBox">{links}</div></body></html>"#)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_walks_months_and_filters_boundaries() {
        let launcher = FakeLauncher::default()
            .with_page(&calendar_url(2024, 2), &calendar(&["2024440201", "2024440212"]))
            .with_page(&calendar_url(2024, 1), &calendar(&["2024440104", "2024440105", "2024650120", "2024440131"]))
            .with_page(&calendar_url(2023, 12), &calendar(&["2023441230"]));
        let mut manager = SessionManager::new(launcher.clone(), &test_config());
        let session = manager.launch().await.unwrap();

        let mut enumerator = RaceIdEnumerator::new(&mut manager);
        let (_session, race_ids) = enumerator.race_ids(session, date(2024, 1, 5), date(2024, 2, 10)).await;

        let mut race_ids: Vec<String> = race_ids.unwrap().iter().map(RaceId::to_string).collect();
        race_ids.sort();
        assert_eq!(race_ids, vec!["202444010501", "202444013101", "202444020101"]);
        // two calendar months fetched, December never visited
        assert_eq!(launcher.navigations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crosses_year_boundary() {
        let launcher = FakeLauncher::default()
            .with_page(&calendar_url(2024, 1), &calendar(&["2024440103"]))
            .with_page(&calendar_url(2023, 12), &calendar(&["2023441229"]));
        let mut manager = SessionManager::new(launcher, &test_config());
        let session = manager.launch().await.unwrap();

        let (_session, race_ids) = RaceIdEnumerator::new(&mut manager)
            .race_ids(session, date(2023, 12, 1), date(2024, 1, 31))
            .await;

        assert_eq!(race_ids.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expand_day() {
        let first: RaceId = "202444010501".parse().unwrap();
        let widget = r#"<div class="RaceNumWrap">
            <a href="../race/shutuba.html?race_id=202444010501">1R</a>
            <a href="../race/shutuba.html?race_id=202444010502">2R</a>
        </div>"#;
        let launcher = FakeLauncher::default().with_page(&race_card_url(&first), widget);
        let mut manager = SessionManager::new(launcher.clone(), &test_config());
        let session = manager.launch().await.unwrap();

        let mut enumerator = RaceIdEnumerator::new(&mut manager);
        let (session, ids) = enumerator.expand_day(session, &first).await;
        let ids = ids.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1].race(), 2);

        // a repeated expansion reads the live page, not the previous copy
        let (_session, again) = enumerator.expand_day(session, &first).await;
        assert_eq!(again.unwrap(), ids);
        assert_eq!(launcher.navigations(), 2);
    }
}
