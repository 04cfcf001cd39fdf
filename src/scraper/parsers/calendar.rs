//! Race calendar and race-number navigation parsers for nar.netkeiba.com.
//!
//! The monthly calendar links every venue-day as a `kaisai_id`
//! (`YYYY` + venue code + `MMDD`); appending race number `01` gives the id
//! of that day's first race.

use scraper::Html;
use tracing::warn;

use super::{required, selector};
use crate::error::{DecodeError, IdentityError};
use crate::race_id::{RaceId, BANEI_VENUE_CODE};

const CALENDAR_LINKS: &str = "div.RaceKaisaiBox > div > a";
const KAISAI_PARAM: &str = "&kaisai_id=";
const RACE_NUMBERS: &str = "div.RaceNumWrap";
const RACE_PARAM: &str = "race_id=";

/// Parser for monthly race calendar pages
pub struct CalendarParser;

impl CalendarParser {
    /// First-race ids for every venue-day on the calendar, ban'ei excluded.
    pub fn parse(html: &str) -> Result<Vec<RaceId>, DecodeError> {
        let document = Html::parse_document(html);
        let mut race_ids = Vec::new();

        for link in document.select(&selector(CALENDAR_LINKS)?) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Some((_, kaisai_id)) = href.split_once(KAISAI_PARAM) else {
                continue;
            };
            let kaisai_id = query_value(kaisai_id);
            if kaisai_id.get(4..6) == Some(BANEI_VENUE_CODE) {
                continue;
            }

            let race_id: RaceId = match format!("{kaisai_id}01").parse() {
                Ok(race_id) => race_id,
                Err(IdentityError::UnknownVenueCode(code)) => {
                    warn!(kaisai_id, code, "calendar links an unknown venue, skipped");
                    continue;
                }
                Err(_) => return Err(DecodeError::malformed("kaisai_id", kaisai_id)),
            };
            if !race_ids.contains(&race_id) {
                race_ids.push(race_id);
            }
        }

        Ok(race_ids)
    }
}

/// Parser for the race-number navigation widget on a race page
pub struct RaceNumberParser;

impl RaceNumberParser {
    /// Every race id linked from the widget, in page order.
    pub fn parse(html: &str) -> Result<Vec<RaceId>, DecodeError> {
        let document = Html::parse_document(html);
        let widget = required(&document, RACE_NUMBERS)?;
        let mut race_ids = Vec::new();

        for link in widget.select(&selector("a")?) {
            let Some((_, id)) = link.value().attr("href").and_then(|h| h.split_once(RACE_PARAM)) else {
                continue;
            };
            let id = query_value(id);
            let race_id: RaceId = id.parse().map_err(|_| DecodeError::malformed("race_id", id))?;
            if !race_ids.contains(&race_id) {
                race_ids.push(race_id);
            }
        }

        Ok(race_ids)
    }
}

/// A query parameter value up to the next `&` or `#`.
fn query_value(rest: &str) -> &str {
    rest.split(['&', '#']).next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALENDAR_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<table class="Calendar_Table">
  <tr>
    <td class="RaceCellBox">
      <div class="RaceKaisaiBox">
        <div><a href="../top/race_list.html?kaisai_date=20240105&kaisai_id=2024440105">大井</a></div>
        <div><a href="../top/race_list.html?kaisai_date=20240105&kaisai_id=2024650105">帯広ば</a></div>
      </div>
    </td>
    <td class="RaceCellBox">
      <div class="RaceKaisaiBox">
        <div><a href="../top/race_list.html?kaisai_date=20240106&kaisai_id=2024430106&rf=cal">船橋</a></div>
        <div><a href="../top/race_list.html?kaisai_date=20240106">一覧</a></div>
      </div>
    </td>
  </tr>
</table>
</body>
</html>"#;

    const RACE_NUM_HTML: &str = r#"<div class="RaceNumWrap">
  <ul class="fc">
    <li><a href="../race/shutuba.html?race_id=202444010501&rf=race_submenu">1R</a></li>
    <li><a href="../race/shutuba.html?race_id=202444010502&rf=race_submenu">2R</a></li>
    <li class="Active"><a href="../race/shutuba.html?race_id=202444010503">3R</a></li>
  </ul>
</div>"#;

    fn ids(race_ids: &[RaceId]) -> Vec<String> {
        race_ids.iter().map(RaceId::to_string).collect()
    }

    #[test]
    fn test_calendar_first_races_without_banei() {
        let race_ids = CalendarParser::parse(CALENDAR_HTML).unwrap();
        assert_eq!(ids(&race_ids), vec!["202444010501", "202443010601"]);
    }

    #[test]
    fn test_empty_calendar() {
        assert!(CalendarParser::parse("<html></html>").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_venue_is_skipped() {
        let html = r#"<div class="RaceKaisaiBox">
            <div><a href="x?a=1&kaisai_id=2024990105">?</a></div>
            <div><a href="x?a=1&kaisai_id=2024440105">大井</a></div>
        </div>"#;
        let race_ids = CalendarParser::parse(html).unwrap();
        assert_eq!(ids(&race_ids), vec!["202444010501"]);
    }

    #[test]
    fn test_malformed_kaisai_id() {
        let html = r#"<div class="RaceKaisaiBox"><div><a href="x?a=1&kaisai_id=20249901">?</a></div></div>"#;
        assert!(CalendarParser::parse(html).is_err());
    }

    #[test]
    fn test_race_numbers() {
        let race_ids = RaceNumberParser::parse(RACE_NUM_HTML).unwrap();
        assert_eq!(ids(&race_ids), vec!["202444010501", "202444010502", "202444010503"]);
    }

    #[test]
    fn test_missing_race_number_widget() {
        let err = RaceNumberParser::parse("<html></html>").unwrap_err();
        assert_eq!(err, DecodeError::missing(RACE_NUMBERS));
    }
}
