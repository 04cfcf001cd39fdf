//! Race header (pre-event metadata) parser for nar.netkeiba.com.
//!
//! The header is read as the `|`-joined run of its text nodes and decoded
//! positionally:
//!
//! | pos | token                 | field                      |
//! |-----|-----------------------|----------------------------|
//! | 0   | `Ｃ３一`              | name                       |
//! | 1   | `20:50発走 /`         | start time                 |
//! | 2   | `ダ1200m`             | surface, distance          |
//! | 3   | `(右) / 天候:晴`      | direction, weather         |
//! | 4   | `/ 馬場:良`           | ground condition           |
//! | 5   | `1回`                 | (unused)                   |
//! | 6   | `大井`                | venue                      |
//! | 7   | `5日目`               | (unused)                   |
//! | 8   | `サラ系一般`          | grade                      |
//! | 9   | `14頭`                | field size                 |
//! | 10  | `本賞金:100、40、...` | prize                      |
//!
//! When position 1 lacks the `発走` marker it is an extra optional token and
//! every later position shifts down by one.

use regex::Regex;
use scraper::Html;

use super::{digits, required, text_nodes};
use crate::error::DecodeError;
use crate::types::{GroundCondition, PreEventInfo, Surface, Weather};

const CONTAINER: &str = "div.RaceList_Item02";
const POST_TIME_MARKER: &str = "発走";

/// Parser for the race page header
pub struct PreEventParser;

impl PreEventParser {
    pub fn parse(html: &str) -> Result<PreEventInfo, DecodeError> {
        let document = Html::parse_document(html);
        let container = required(&document, CONTAINER)?;
        Self::parse_tokens(&text_nodes(container))
    }

    /// Decode the positional token run.
    pub fn parse_tokens(tokens: &[String]) -> Result<PreEventInfo, DecodeError> {
        let mut tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
        if tokens.len() > 1 && !tokens[1].contains(POST_TIME_MARKER) {
            tokens.remove(1);
        }

        let mut info = PreEventInfo::default();
        for (position, token) in tokens.iter().enumerate() {
            match position {
                0 => info.name = Some(token.to_string()),
                1 => info.start_time = start_time(token),
                2 => {
                    let (surface, distance) = course_and_distance(token)?;
                    info.surface = Some(surface);
                    info.distance = Some(distance);
                }
                3 => {
                    let (direction, weather) = direction_and_weather(token)?;
                    info.direction = direction;
                    info.weather = weather;
                }
                4 => info.ground_condition = ground_condition(token)?,
                6 => info.venue = Some(token.to_string()),
                8 => info.grade = Some(token.to_string()),
                9 => {
                    info.field_size =
                        Some(digits(token).ok_or_else(|| DecodeError::malformed("field_size", *token))?)
                }
                10 => info.prize = Some(prize(token)?),
                _ => {}
            }
        }

        Ok(info)
    }
}

fn pattern(re: &'static str) -> Result<Regex, DecodeError> {
    Regex::new(re).map_err(|_| DecodeError::malformed("pattern", re))
}

fn start_time(token: &str) -> Option<String> {
    let time = token.split(POST_TIME_MARKER).next().unwrap_or(token).trim();
    (!time.is_empty()).then(|| time.to_string())
}

/// `ダ1200m` -> (Dirt, 1200)
fn course_and_distance(token: &str) -> Result<(Surface, u32), DecodeError> {
    let surface_text = pattern(r"\d+m")?.replace_all(token, "");
    let surface = surface_text
        .trim()
        .parse::<Surface>()
        .map_err(|_| DecodeError::malformed("surface", token))?;
    let distance = digits(token).ok_or_else(|| DecodeError::malformed("distance", token))?;
    Ok((surface, distance))
}

/// `(右) / 天候:晴` -> (Some("右"), Some(Sunny))
fn direction_and_weather(token: &str) -> Result<(Option<String>, Option<Weather>), DecodeError> {
    let direction = pattern(r"\((.+?)\)")?
        .captures(token)
        .map(|caps| caps[1].trim().to_string())
        .ok_or_else(|| DecodeError::malformed("direction", token))?;

    let weather = if token.contains("天候") {
        let label = after_colon(token);
        if label.is_empty() {
            None
        } else {
            Some(
                label
                    .parse::<Weather>()
                    .map_err(|_| DecodeError::malformed("weather", token))?,
            )
        }
    } else {
        None
    };

    Ok((Some(direction), weather))
}

/// `/ 馬場:良` -> Some(Firm); `-` means not yet announced.
fn ground_condition(token: &str) -> Result<Option<GroundCondition>, DecodeError> {
    let label = after_colon(token);
    if label.is_empty() || label.contains('-') {
        return Ok(None);
    }
    label
        .parse::<GroundCondition>()
        .map(Some)
        .map_err(|_| DecodeError::malformed("ground_condition", token))
}

/// `本賞金:100、40、25、15、10万円` -> 100.0
fn prize(token: &str) -> Result<f64, DecodeError> {
    let first = token.split('、').next().unwrap_or(token);
    first
        .replace("本賞金:", "")
        .replace("万円", "")
        .trim()
        .parse()
        .map_err(|_| DecodeError::malformed("prize", token))
}

fn after_colon(token: &str) -> &str {
    token.rsplit(':').next().unwrap_or(token).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="RaceList_Item02">
  <h1 class="RaceName">Ｃ３一</h1>
  <div class="RaceData01">
    20:50発走 /
    <span>ダ1200m</span>
    (右)
    / 天候:晴<span class="Icon_Weather Weather01"></span>
    <span class="Item04">/ 馬場:良</span>
  </div>
  <div class="RaceData02">
    <span>1回</span>
    <span>大井</span>
    <span>5日目</span>
    <span>サラ系一般</span>
    <span>14頭</span>
    <span>本賞金:100、40、25、15、10万円</span>
  </div>
</div>
</body>
</html>"#;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_header() {
        let info = PreEventParser::parse(SAMPLE_HTML).unwrap();

        assert_eq!(info.name.as_deref(), Some("Ｃ３一"));
        assert_eq!(info.start_time.as_deref(), Some("20:50"));
        assert_eq!(info.surface, Some(Surface::Dirt));
        assert_eq!(info.distance, Some(1200));
        assert_eq!(info.direction.as_deref(), Some("右"));
        assert_eq!(info.weather, Some(Weather::Sunny));
        assert_eq!(info.ground_condition, Some(GroundCondition::Firm));
        assert_eq!(info.venue.as_deref(), Some("大井"));
        assert_eq!(info.grade.as_deref(), Some("サラ系一般"));
        assert_eq!(info.field_size, Some(14));
        assert_eq!(info.prize, Some(100.0));
    }

    #[test]
    fn test_extra_token_shifts_positions() {
        let info = PreEventParser::parse_tokens(&tokens(&[
            "東京ダービー",
            "JpnI",
            "20:10発走 /",
            "ダ2000m",
            "(右) / 天候:曇",
            "/ 馬場:稍重",
            "4回",
            "大井",
            "3日目",
            "サラ系３歳",
            "16頭",
            "本賞金:10000、3500",
        ]))
        .unwrap();

        assert_eq!(info.name.as_deref(), Some("東京ダービー"));
        assert_eq!(info.start_time.as_deref(), Some("20:10"));
        assert_eq!(info.distance, Some(2000));
        assert_eq!(info.weather, Some(Weather::Cloudy));
        assert_eq!(info.ground_condition, Some(GroundCondition::Good));
        assert_eq!(info.venue.as_deref(), Some("大井"));
        assert_eq!(info.field_size, Some(16));
        assert_eq!(info.prize, Some(10000.0));
    }

    #[test]
    fn test_unannounced_ground_and_weather_are_absent() {
        let info = PreEventParser::parse_tokens(&tokens(&[
            "Ｃ２",
            "15:00発走 /",
            "ダ1400m",
            "(左)",
            "/ 馬場:-",
        ]))
        .unwrap();

        assert_eq!(info.direction.as_deref(), Some("左"));
        assert_eq!(info.weather, None);
        assert_eq!(info.ground_condition, None);
        assert_eq!(info.venue, None);
        assert_eq!(info.prize, None);
    }

    #[test]
    fn test_missing_container() {
        let err = PreEventParser::parse("<html><body></body></html>").unwrap_err();
        assert_eq!(err, DecodeError::missing(CONTAINER));
    }

    #[test]
    fn test_unknown_surface_is_malformed() {
        let err = PreEventParser::parse_tokens(&tokens(&["x", "15:00発走", "砂1400m"])).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { field: "surface", .. }));
    }
}
