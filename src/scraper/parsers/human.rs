//! Jockey and trainer profile parser for db.netkeiba.com.
//!
//! Both page kinds share the same header block: the name and its reading on
//! separate lines of the `h1`, and the birthday leading the paragraph below.

use chrono::NaiveDate;
use scraper::Html;

use super::{required, selector};
use crate::error::DecodeError;
use crate::types::HumanProfile;

const HEADER: &str = "div.Name";

/// Parser for jockey and trainer profile pages
pub struct HumanParser;

impl HumanParser {
    pub fn parse(html: &str) -> Result<HumanProfile, DecodeError> {
        let document = Html::parse_document(html);
        let header = required(&document, HEADER)?;

        let h1 = header
            .select(&selector("h1")?)
            .next()
            .ok_or_else(|| DecodeError::missing("div.Name h1"))?;
        let lines: Vec<String> = h1
            .text()
            .collect::<String>()
            .lines()
            .map(clean)
            .filter(|line| !line.is_empty())
            .collect();

        let birthday = header
            .select(&selector("p")?)
            .next()
            .map(|p| p.text().collect::<String>())
            .and_then(|text| text.split_whitespace().next().and_then(parse_birthday));

        Ok(HumanProfile {
            name: lines.first().cloned(),
            reading: if lines.len() > 1 { lines.last().cloned() } else { None },
            birthday,
        })
    }
}

/// Drop whitespace, brackets and non-breaking spaces.
fn clean(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '（' | '）' | '\u{a0}'))
        .collect()
}

/// `1982/10/04` -> `1982-10-04`. Non-date leading tokens are not a birthday.
fn parse_birthday(token: &str) -> Option<String> {
    let cleaned = clean(token).replace('/', "-");
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}
