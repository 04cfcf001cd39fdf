//! Race card (shutuba) table parser for nar.netkeiba.com.

use scraper::{ElementRef, Html};
use tracing::debug;

use super::{link_id, non_empty, number, required, strict_number, table_rows, text_of};
use crate::error::DecodeError;
use crate::types::StartingEntry;

const TABLE: &str = "table.ShutubaTable";

// Column positions; 2 is the prediction-mark column and is skipped.
const BRACKET: usize = 0;
const ENTRY_NUMBER: usize = 1;
const HORSE_NAME: usize = 3;
const SEX_AGE: usize = 4;
const CARRIED_WEIGHT: usize = 5;
const JOCKEY: usize = 6;
const STABLE: usize = 7;
const BODY_WEIGHT: usize = 8;
const ODDS: usize = 9;
const POPULARITY: usize = 10;

/// Parser for race card entry tables
pub struct EntryTableParser;

impl EntryTableParser {
    /// Parse every entry row. Rows without an entry number (draw not yet
    /// published) are left out.
    pub fn parse(html: &str) -> Result<Vec<StartingEntry>, DecodeError> {
        let document = Html::parse_document(html);
        let table = required(&document, TABLE)?;

        let mut entries = Vec::new();
        for cells in table_rows(table)? {
            if let Some(entry) = Self::parse_row(&cells)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn parse_row(cells: &[ElementRef<'_>]) -> Result<Option<StartingEntry>, DecodeError> {
        if cells.len() <= POPULARITY {
            return Err(DecodeError::malformed(
                "shutuba_row",
                format!("{} cells", cells.len()),
            ));
        }
        let text = |i: usize| text_of(cells[i]);

        let Some(entry_number) = strict_number::<u32>("entry_number", &text(ENTRY_NUMBER))? else {
            debug!("skipping shutuba row without entry number");
            return Ok(None);
        };

        let row = cells[0]
            .parent()
            .and_then(ElementRef::wrap)
            .ok_or_else(|| DecodeError::missing("tr"))?;

        Ok(Some(StartingEntry {
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
            horse_id: link_id(row, "span.HorseName > a")?,
            jockey_id: link_id(row, "td.Jockey a")?,
            trainer_id: link_id(row, "td.Trainer > a")?,
        }))
    }
}
