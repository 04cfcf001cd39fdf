//! HTML decoders for netkeiba.com pages.
//!
//! Every decoder is a pure function of the page markup. A missing container
//! is a [`DecodeError`]; a missing optional value is `None`.

pub mod calendar;
pub mod entry_table;
pub mod history;
pub mod horse;
pub mod human;
pub mod pedigree;
pub mod pre_event;
pub mod result_table;

pub use calendar::{CalendarParser, RaceNumberParser};
pub use entry_table::EntryTableParser;
pub use history::HistoryParser;
pub use horse::HorseParser;
pub use human::HumanParser;
pub use pedigree::PedigreeParser;
pub use pre_event::PreEventParser;
pub use result_table::ResultTableParser;

use std::str::FromStr;

use scraper::{ElementRef, Html, Selector};

use crate::error::DecodeError;

pub(crate) fn selector(css: &'static str) -> Result<Selector, DecodeError> {
    Selector::parse(css).map_err(|_| DecodeError::malformed("selector", css))
}

/// First element matching `css`, or a `MissingElement` error naming it.
pub(crate) fn required<'a>(document: &'a Html, css: &'static str) -> Result<ElementRef<'a>, DecodeError> {
    document
        .select(&selector(css)?)
        .next()
        .ok_or_else(|| DecodeError::missing(css))
}

/// Element text with runs of whitespace collapsed.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stripped, non-empty text nodes in document order.
pub(crate) fn text_nodes(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Id carried by the first `a` under `css`: the last non-empty path segment
/// of its href.
pub(crate) fn link_id(element: ElementRef<'_>, css: &'static str) -> Result<Option<String>, DecodeError> {
    Ok(element
        .select(&selector(css)?)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(last_path_segment))
}

pub(crate) fn last_path_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

pub(crate) fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parse a numeric cell. Blank and placeholder cells ("--", "---.-") are
/// absent values.
pub(crate) fn number<T: FromStr>(text: &str) -> Option<T> {
    text.trim().replace(',', "").parse().ok()
}

/// Like [`number`] but a non-blank unparsable value is an error.
pub(crate) fn strict_number<T: FromStr>(field: &'static str, text: &str) -> Result<Option<T>, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.replace(',', "")
        .parse()
        .map(Some)
        .map_err(|_| DecodeError::malformed(field, text))
}

/// All ASCII and full-width digits of `text` as a number.
pub(crate) fn digits(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .filter_map(|c| c.to_digit(10).or_else(|| fullwidth_digit(c)))
        .filter_map(|d| char::from_digit(d, 10))
        .collect();
    digits.parse().ok()
}

fn fullwidth_digit(c: char) -> Option<u32> {
    ('０'..='９').contains(&c).then(|| c as u32 - '０' as u32)
}

/// The `td` cells of every body row that has any.
pub(crate) fn table_rows<'a>(table: ElementRef<'a>) -> Result<Vec<Vec<ElementRef<'a>>>, DecodeError> {
    let tr = selector("tr")?;
    let td = selector("td")?;
    Ok(table
        .select(&tr)
        .map(|row| row.select(&td).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_path_segment() {
        assert_eq!(last_path_segment("/horse/2019104567/").as_deref(), Some("2019104567"));
        assert_eq!(
            last_path_segment("https://db.netkeiba.com/jockey/result/recent/05339/").as_deref(),
            Some("05339")
        );
        assert_eq!(last_path_segment("https://db.netkeiba.com/trainer/01120").as_deref(), Some("01120"));
        assert_eq!(last_path_segment("/race/202444010511/?ref=top").as_deref(), Some("202444010511"));
        assert_eq!(last_path_segment("/"), None);
    }

    #[test]
    fn test_digits() {
        assert_eq!(digits("14頭"), Some(14));
        assert_eq!(digits("ダ1200m"), Some(1200));
        assert_eq!(digits("１２頭"), Some(12));
        assert_eq!(digits("頭"), None);
    }

    #[test]
    fn test_number_placeholders() {
        assert_eq!(number::<f64>("---.-"), None);
        assert_eq!(number::<f64>(" 12.3 "), Some(12.3));
        assert_eq!(number::<u32>("1,200"), Some(1200));
    }

    #[test]
    fn test_strict_number() {
        assert_eq!(strict_number::<u32>("entry_number", " 7 "), Ok(Some(7)));
        assert_eq!(strict_number::<u32>("entry_number", ""), Ok(None));
        assert!(strict_number::<u32>("entry_number", "x").is_err());
    }
}
