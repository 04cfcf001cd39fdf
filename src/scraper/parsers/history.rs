//! Past-performance table parser for db.netkeiba.com horse pages.
//!
//! Each row describes one start and feeds three collections: the race's
//! pre-event metadata, the horse's starting entry and its result.

use scraper::{ElementRef, Html};
use tracing::warn;

use super::result_table::finish;
use super::{digits, last_path_segment, non_empty, number, selector, strict_number, table_rows, text_of};
use crate::error::DecodeError;
use crate::race_id::strip_digits;
use crate::types::{GroundCondition, HistoryRow, PreEventInfo, ResultEntry, StartingEntry, Surface, Weather};

const TABLE: &str = "table.db_h_race_results.nk_tb_common";

const DATE: usize = 0;
const VENUE: usize = 1;
const WEATHER: usize = 2;
const RACE_NUMBER: usize = 3;
const RACE_NAME: usize = 4;
const FIELD_SIZE: usize = 6;
const BRACKET: usize = 7;
const ENTRY_NUMBER: usize = 8;
const ODDS: usize = 9;
const POPULARITY: usize = 10;
const FINISH: usize = 11;
const JOCKEY: usize = 12;
const CARRIED_WEIGHT: usize = 13;
const DISTANCE: usize = 14;
const GROUND: usize = 15;
const TIME: usize = 17;
const MARGIN: usize = 18;
const PASSING: usize = 20;
const PACE: usize = 21;
const FINAL_SPLIT: usize = 22;
const BODY_WEIGHT: usize = 23;
const COLUMNS: usize = 28;

/// Parser for horse past-performance tables
pub struct HistoryParser;

impl HistoryParser {
    /// Parse all past starts. A horse page without the table (no starts yet)
    /// yields an empty list; rows without an entry number are skipped.
    pub fn parse(html: &str) -> Result<Vec<HistoryRow>, DecodeError> {
        let document = Html::parse_document(html);
        let Some(table) = document.select(&selector(TABLE)?).next() else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for cells in table_rows(table)? {
            if let Some(row) = Self::parse_row(&cells)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn parse_row(cells: &[ElementRef<'_>]) -> Result<Option<HistoryRow>, DecodeError> {
        if cells.len() < COLUMNS {
            return Err(DecodeError::malformed(
                "history_row",
                format!("{} cells", cells.len()),
            ));
        }
        let text = |i: usize| text_of(cells[i]);
        let anchor_id = |i: usize| -> Result<Option<String>, DecodeError> {
            Ok(cells[i]
                .select(&selector("a")?)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(last_path_segment))
        };

        // Scratched and some overseas starts print no entry number; they
        // have no key in starting_entry or result.
        let Some(entry_number) = strict_number::<u32>("entry_number", &text(ENTRY_NUMBER))? else {
            warn!(date = %text(DATE), race = %text(RACE_NAME), "past start without entry number, row skipped");
            return Ok(None);
        };
        let (surface, distance) = course(&text(DISTANCE))?;
        let (finish_position, finish_status) = finish(&text(FINISH));

        let pre_event = PreEventInfo {
            name: non_empty(&text(RACE_NAME)),
            surface,
            distance,
            weather: text(WEATHER).parse::<Weather>().ok(),
            ground_condition: text(GROUND).parse::<GroundCondition>().ok(),
            venue: non_empty(&strip_digits(&text(VENUE))),
            field_size: number(&text(FIELD_SIZE)),
            ..Default::default()
        };

        let entry = StartingEntry {
            entry_number,
            bracket: number(&text(BRACKET)),
            carried_weight: number(&text(CARRIED_WEIGHT)),
            jockey_name: non_empty(&text(JOCKEY)),
            body_weight: non_empty(&text(BODY_WEIGHT)),
            odds: number(&text(ODDS)),
            popularity: number(&text(POPULARITY)),
            jockey_id: anchor_id(JOCKEY)?,
            ..Default::default()
        };

        let result = ResultEntry {
            entry_number,
            finish_position,
            finish_status,
            time: non_empty(&text(TIME)),
            margin: non_empty(&text(MARGIN)),
            passing: non_empty(&text(PASSING)),
            pace: non_empty(&text(PACE)),
            final_split: number(&text(FINAL_SPLIT)),
        };

        Ok(Some(HistoryRow {
            link_race_id: anchor_id(RACE_NAME)?,
            date: text(DATE),
            venue: strip_digits(&text(VENUE)).trim().to_string(),
            race_number: text(RACE_NUMBER),
            pre_event,
            entry,
            result,
        }))
    }
}

/// `ダ1200` -> (Some(Dirt), Some(1200)). Overseas rows may print a surface
/// outside the closed set; those stay absent.
fn course(text: &str) -> Result<(Option<Surface>, Option<u32>), DecodeError> {
    let Some(first) = text.chars().next() else {
        return Ok((None, None));
    };
    let surface = first.to_string().parse::<Surface>().ok();
    let distance = digits(text);
    if surface.is_some() && distance.is_none() {
        return Err(DecodeError::malformed("distance", text));
    }
    Ok((surface, distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
        format!("<tr>{tds}</tr>")
    }

    fn sample_html() -> String {
        let first = row(&[
            r#"<a href="/race/list/20240105/">2024/01/05</a>"#,
            r#"<a href="/race/sum/44/20240105/">1大井5</a>"#,
            "晴",
            "11",
            r#"<a href="/race/202444010511/" title="Ｃ３一">Ｃ３一</a>"#,
            "",
            "14",
            "3",
            "5",
            "3.4",
            "1",
            "1",
            r#"<a href="/jockey/result/recent/05339/">御神本</a>"#,
            "56.0",
            "ダ1200",
            "良",
            "**",
            "1:13.2",
            "-0.3",
            "**",
            "3-3",
            "12.1-38.0",
            "38.1",
            "480(+4)",
            "",
            "",
            "(ムーンホース)",
            "100.0",
        ]);
        let second = row(&[
            "2023/12/20",
            "10船橋3",
            "曇",
            "7",
            r#"<a href="/race/202343122007/">Ｃ３二</a>"#,
            "",
            "12",
            "6",
            "9",
            "",
            "",
            "除外",
            r#"<a href="/jockey/result/recent/05512/">山田</a>"#,
            "54.0",
            "ダ1500",
            "不良",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            "計不",
            "",
            "",
            "",
            "",
        ]);
        format!(
            r#"<html><body><table class="db_h_race_results nk_tb_common">
<thead><tr><th>日付</th><th>開催</th></tr></thead>
<tbody>{first}{second}</tbody></table></body></html>"#
        )
    }

    #[test]
    fn test_parse_history() {
        let rows = HistoryParser::parse(&sample_html()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.link_race_id.as_deref(), Some("202444010511"));
        assert_eq!(first.venue, "大井");
        assert_eq!(first.race_id().unwrap().to_string(), "202444010511");
        assert_eq!(first.pre_event.surface, Some(Surface::Dirt));
        assert_eq!(first.pre_event.distance, Some(1200));
        assert_eq!(first.pre_event.weather, Some(Weather::Sunny));
        assert_eq!(first.pre_event.ground_condition, Some(GroundCondition::Firm));
        assert_eq!(first.pre_event.field_size, Some(14));
        assert_eq!(first.entry.entry_number, 5);
        assert_eq!(first.entry.jockey_id.as_deref(), Some("05339"));
        assert_eq!(first.result.finish_position, Some(1));
        assert_eq!(first.result.passing.as_deref(), Some("3-3"));
        assert_eq!(first.result.pace.as_deref(), Some("12.1-38.0"));
        assert_eq!(first.result.final_split, Some(38.1));
    }

    #[test]
    fn test_excluded_start() {
        let rows = HistoryParser::parse(&sample_html()).unwrap();
        let second = &rows[1];

        assert_eq!(second.venue, "船橋");
        assert_eq!(second.race_id().unwrap().to_string(), "202343122007");
        assert_eq!(second.result.finish_position, None);
        assert_eq!(second.result.finish_status.as_deref(), Some("除外"));
        assert_eq!(second.result.time, None);
        assert_eq!(second.entry.odds, None);
    }

    #[test]
    fn test_row_without_entry_number_is_skipped() {
        let scratched = row(&[
            "2023/11/02", "8大井2", "晴", "5", r#"<a href="/race/202344110205/">Ｃ３三</a>"#, "", "11", "", "", "",
            "", "取消", "", "", "ダ1400", "良", "", "", "", "", "", "", "", "", "", "", "", "",
        ]);
        let html = sample_html().replace("</tbody>", &format!("{scratched}</tbody>"));

        let rows = HistoryParser::parse(&html).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.date != "2023/11/02"));
    }

    #[test]
    fn test_race_id_falls_back_to_link() {
        let html = sample_html().replace("1大井5", "1どこか5");
        let rows = HistoryParser::parse(&html).unwrap();

        assert_eq!(rows[0].venue, "どこか");
        assert_eq!(rows[0].race_id().unwrap().to_string(), "202444010511");
    }

    #[test]
    fn test_no_table_means_no_starts() {
        assert!(HistoryParser::parse("<html><body></body></html>").unwrap().is_empty());
    }

    #[test]
    fn test_short_row_is_malformed() {
        let html = format!(
            r#"<table class="db_h_race_results nk_tb_common">{}</table>"#,
            row(&["2024/01/05", "1大井5"])
        );
        assert!(HistoryParser::parse(&html).is_err());
    }
}
