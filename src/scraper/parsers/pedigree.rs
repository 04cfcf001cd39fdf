//! Pedigree table parser for db.netkeiba.com.
//!
//! The blood table flattens the ancestry tree into rows: an ancestor cell's
//! `rowspan` gives its generation (16 -> parents ... 1 -> 5th generation).
//! Cells of one generation appear in tree order, so the running count of
//! cells seen per rowspan, written in binary with one digit per generation,
//! is the path to that ancestor: `0` is the sire side (`f`), `1` the dam
//! side (`m`).

use std::collections::HashMap;

use scraper::Html;

use super::{link_id, required, selector};
use crate::error::DecodeError;
use crate::types::Pedigree;

const TABLE: &str = "table.blood_table";

/// Generation depth for a cell rowspan.
fn generation_of(rowspan: u32) -> Option<u32> {
    match rowspan {
        16 => Some(1),
        8 => Some(2),
        4 => Some(3),
        2 => Some(4),
        1 => Some(5),
        _ => None,
    }
}

/// Generation-path code of the `index`-th cell at `depth`.
pub fn generation_path(depth: u32, index: u32) -> String {
    format!("{:0width$b}", index, width = depth as usize)
        .chars()
        .map(|bit| if bit == '0' { 'f' } else { 'm' })
        .collect()
}

/// Parser for horse pedigree pages
pub struct PedigreeParser;

impl PedigreeParser {
    pub fn parse(html: &str) -> Result<Pedigree, DecodeError> {
        let document = Html::parse_document(html);
        let table = required(&document, TABLE)?;
        let tr = selector("tr")?;
        let td = selector("td")?;

        let mut seen: HashMap<u32, u32> = HashMap::new();
        let mut pedigree = Pedigree::default();

        for row in table.select(&tr) {
            for cell in row.select(&td) {
                let rowspan = match cell.value().attr("rowspan") {
                    Some(value) => value
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| DecodeError::malformed("rowspan", value))?,
                    None => 1,
                };
                let depth = generation_of(rowspan).ok_or(DecodeError::UnexpectedRowspan { rowspan })?;

                let count = seen.entry(rowspan).or_insert(0);
                if *count >= 1 << depth {
                    return Err(DecodeError::malformed(
                        "pedigree",
                        format!("more than {} cells with rowspan {}", 1u32 << depth, rowspan),
                    ));
                }
                let path = generation_path(depth, *count);
                *count += 1;

                pedigree.ancestors.insert(path, link_id(cell, "a")?);
            }
        }

        Ok(pedigree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Blood table `rows` rows high; a cell of each rowspan starts every
    /// `rowspan` rows.
    fn blood_table(rows: u32) -> String {
        let mut html = String::from(r#"<table class="blood_table">"#);
        let mut id = 0;
        for r in 0..rows {
            html.push_str("<tr>");
            for rowspan in [16u32, 8, 4, 2, 1] {
                if rowspan <= rows && r % rowspan == 0 {
                    id += 1;
                    let span = if rowspan == 1 {
                        String::new()
                    } else {
                        format!(r#" rowspan="{rowspan}""#)
                    };
                    html.push_str(&format!(
                        r#"<td{span}><a href="/horse/anc{id:03}/">Ancestor {id}</a><br><a href="/horse/sire/anc{id:03}/">産駒</a></td>"#
                    ));
                }
            }
            html.push_str("</tr>");
        }
        html.push_str("</table>");
        html
    }

    #[test]
    fn test_generation_path() {
        assert_eq!(generation_path(1, 0), "f");
        assert_eq!(generation_path(1, 1), "m");
        assert_eq!(generation_path(3, 1), "ffm");
        assert_eq!(generation_path(4, 2), "ffmf");
        assert_eq!(generation_path(5, 31), "mmmmm");
    }

    #[test]
    fn test_five_generations_yield_31_distinct_codes() {
        let pedigree = PedigreeParser::parse(&blood_table(16)).unwrap();

        assert_eq!(pedigree.len(), 31);
        let ids: HashSet<_> = pedigree.ancestors.values().flatten().collect();
        assert_eq!(ids.len(), 31);
        for path in pedigree.ancestors.keys() {
            assert!(path.len() <= 5);
            assert!(path.chars().all(|c| c == 'f' || c == 'm'));
        }
        assert_eq!(pedigree.get("f"), Some("anc001"));
        assert_eq!(pedigree.get("ff"), Some("anc002"));
        assert_eq!(pedigree.get("fffff"), Some("anc005"));
    }

    #[test]
    fn test_full_table_covers_both_sides() {
        let pedigree = PedigreeParser::parse(&blood_table(32)).unwrap();

        assert_eq!(pedigree.len(), 62);
        assert!(pedigree.get("m").is_some());
        assert!(pedigree.get("mmmmm").is_some());
        assert_ne!(pedigree.get("f"), pedigree.get("m"));
    }

    #[test]
    fn test_unexpected_rowspan() {
        let html = r#"<table class="blood_table"><tr><td rowspan="3"><a href="/horse/x/">X</a></td></tr></table>"#;
        let err = PedigreeParser::parse(html).unwrap_err();
        assert_eq!(err, DecodeError::UnexpectedRowspan { rowspan: 3 });
    }

    #[test]
    fn test_cell_without_link() {
        let html = r#"<table class="blood_table"><tr><td rowspan="16">不明</td></tr></table>"#;
        let pedigree = PedigreeParser::parse(html).unwrap();
        assert_eq!(pedigree.ancestors.get("f"), Some(&None));
    }

    #[test]
    fn test_missing_table() {
        let err = PedigreeParser::parse("<html></html>").unwrap_err();
        assert_eq!(err, DecodeError::missing(TABLE));
    }
}
