//! Horse profile parser for db.netkeiba.com.

use chrono::NaiveDate;
use scraper::Html;

use super::{link_id, required, text_nodes, text_of};
use crate::error::DecodeError;
use crate::types::HorseProfile;

const NAME: &str = "div.horse_title > h1";
const PROFILE: &str = "div.db_prof_area_02";

/// Parser for horse profile pages
pub struct HorseParser;

impl HorseParser {
    pub fn parse(html: &str) -> Result<HorseProfile, DecodeError> {
        let document = Html::parse_document(html);
        let name = text_of(required(&document, NAME)?);
        let area = required(&document, PROFILE)?;
        let tokens = text_nodes(area);

        Ok(HorseProfile {
            name: (!name.is_empty()).then_some(name),
            birthday: labelled(&tokens, "生年月日").map(|b| japanese_date(&b)),
            trainer_id: link_id(area, "a[href*='/trainer/']")?,
            owner: labelled(&tokens, "馬主"),
            breeder: labelled(&tokens, "生産者"),
            origin: labelled(&tokens, "産地"),
            auction_price: labelled(&tokens, "セリ取引価格"),
        })
    }
}

/// Value following `label` in the profile's text run; `-` marks an
/// unrecorded value.
fn labelled(tokens: &[String], label: &str) -> Option<String> {
    let position = tokens.iter().position(|t| t == label)?;
    tokens
        .get(position + 1)
        .filter(|value| value.as_str() != "-")
        .cloned()
}

/// `2020年3月15日` -> `2020-03-15`; anything else is kept as printed.
fn japanese_date(text: &str) -> String {
    NaiveDate::parse_from_str(text, "%Y年%m月%d日")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| text.to_string())
}
