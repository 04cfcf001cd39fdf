//! Race result table parser for nar.netkeiba.com.

use scraper::{ElementRef, Html};

use super::{link_id, non_empty, number, required, strict_number, table_rows, text_of};
use crate::error::DecodeError;
use crate::types::{RaceResultRow, ResultEntry, StartingEntry};

const TABLE: &str = "table#All_Result_Table";

const FINISH: usize = 0;
const BRACKET: usize = 1;
const ENTRY_NUMBER: usize = 2;
const HORSE_NAME: usize = 3;
const SEX_AGE: usize = 4;
const CARRIED_WEIGHT: usize = 5;
const JOCKEY: usize = 6;
const TIME: usize = 7;
const MARGIN: usize = 8;
const POPULARITY: usize = 9;
const ODDS: usize = 10;
const FINAL_SPLIT: usize = 11;
const STABLE: usize = 12;
const BODY_WEIGHT: usize = 13;

/// Parser for race result pages
pub struct ResultTableParser;

impl ResultTableParser {
    pub fn parse(html: &str) -> Result<Vec<RaceResultRow>, DecodeError> {
        let document = Html::parse_document(html);
        let table = required(&document, TABLE)?;

        table_rows(table)?
            .iter()
            .map(|cells| Self::parse_row(cells))
            .collect()
    }

    fn parse_row(cells: &[ElementRef<'_>]) -> Result<RaceResultRow, DecodeError> {
        if cells.len() <= BODY_WEIGHT {
            return Err(DecodeError::malformed(
                "result_row",
                format!("{} cells", cells.len()),
            ));
        }
        let text = |i: usize| text_of(cells[i]);

        let entry_number = strict_number::<u32>("entry_number", &text(ENTRY_NUMBER))?
            .ok_or_else(|| DecodeError::malformed("entry_number", ""))?;
        let row = cells[0]
            .parent()
            .and_then(ElementRef::wrap)
            .ok_or_else(|| DecodeError::missing("tr"))?;
        let (finish_position, finish_status) = finish(&text(FINISH));

        let entry = StartingEntry {
            entry_number,
            bracket: number(&text(BRACKET)),
            horse_name: non_empty(&text(HORSE_NAME)),
            sex_age: non_empty(&text(SEX_AGE)),
            carried_weight: number(&text(CARRIED_WEIGHT)),
            jockey_name: non_empty(&text(JOCKEY)),
            stable: non_empty(&text(STABLE)),
            body_weight: non_empty(&text(BODY_WEIGHT)),
            odds: number(&text(ODDS)),
            popularity: number(&text(POPULARITY)),
            horse_id: link_id(row, "span.Horse_Name > a")?,
            jockey_id: link_id(row, "td.Jockey > a")?,
            trainer_id: link_id(row, "td.Trainer > a")?,
        };

        let result = ResultEntry {
            entry_number,
            finish_position,
            finish_status,
            time: non_empty(&text(TIME)),
            margin: non_empty(&text(MARGIN)),
            passing: None,
            pace: None,
            final_split: number(&text(FINAL_SPLIT)),
        };

        Ok(RaceResultRow { entry, result })
    }
}

/// Split a finishing-order cell into a numeric place or a status text
/// such as 取消, 除外 or 中止.
pub(crate) fn finish(text: &str) -> (Option<u32>, Option<String>) {
    match number::<u32>(text) {
        Some(place) => (Some(place), None),
        None => (None, non_empty(text)),
    }
}
