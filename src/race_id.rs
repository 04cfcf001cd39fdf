//! Race identifiers and the closed venue table.
//!
//! A race id is twelve characters: `YYYY` + venue code + `MM` + `DD` + race
//! number, e.g. `202444010511` is race 11 at 大井 on 2024-01-05.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentityError;

/// A racecourse from the closed venue enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Venue {
    code: &'static str,
    name: &'static str,
}

impl Venue {
    const fn new(name: &'static str, code: &'static str) -> Self {
        Self { code, name }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn from_code(code: &str) -> Result<Self, IdentityError> {
        VENUES
            .iter()
            .copied()
            .find(|v| v.code == code)
            .ok_or_else(|| IdentityError::UnknownVenueCode(code.to_string()))
    }

    /// Look up a venue by display name. Embedded digits ("3大井" on history
    /// pages) are ignored.
    pub fn from_name(name: &str) -> Result<Self, IdentityError> {
        let cleaned = strip_digits(name);
        let cleaned = cleaned.trim();
        VENUES
            .iter()
            .copied()
            .find(|v| v.name == cleaned)
            .ok_or_else(|| IdentityError::UnknownVenueName(name.to_string()))
    }
}

/// Venue code of the Obihiro ban'ei course, which the enumerator skips.
pub const BANEI_VENUE_CODE: &str = "65";

/// Domestic (JRA + NAR) and overseas venues known to the source site.
pub static VENUES: &[Venue] = &[
    Venue::new("札幌", "01"),
    Venue::new("函館", "02"),
    Venue::new("福島", "03"),
    Venue::new("新潟", "04"),
    Venue::new("東京", "05"),
    Venue::new("中山", "06"),
    Venue::new("中京", "07"),
    Venue::new("京都", "08"),
    Venue::new("阪神", "09"),
    Venue::new("小倉", "10"),
    Venue::new("門別", "30"),
    Venue::new("北見", "31"),
    Venue::new("岩見沢", "32"),
    Venue::new("帯広", "33"),
    Venue::new("旭川", "34"),
    Venue::new("盛岡", "35"),
    Venue::new("水沢", "36"),
    Venue::new("上山", "37"),
    Venue::new("三条", "38"),
    Venue::new("足利", "39"),
    Venue::new("宇都宮", "40"),
    Venue::new("高崎", "41"),
    Venue::new("浦和", "42"),
    Venue::new("船橋", "43"),
    Venue::new("大井", "44"),
    Venue::new("川崎", "45"),
    Venue::new("金沢", "46"),
    Venue::new("笠松", "47"),
    Venue::new("名古屋", "48"),
    Venue::new("園田", "50"),
    Venue::new("姫路", "51"),
    Venue::new("益田", "52"),
    Venue::new("福山", "53"),
    Venue::new("高知", "54"),
    Venue::new("佐賀", "55"),
    Venue::new("荒尾", "56"),
    Venue::new("中津", "57"),
    Venue::new("札幌（地方競馬）", "58"),
    Venue::new("函館（地方競馬）", "59"),
    Venue::new("新潟（地方競馬）", "60"),
    Venue::new("中京（地方競馬）", "61"),
    Venue::new("帯広ば", "65"),
    // Overseas: names are truncated to four characters on history pages.
    Venue::new("アスコッ", "A0"),
    Venue::new("アメリカ", "A4"),
    Venue::new("イギリス", "A6"),
    Venue::new("フランス", "A8"),
    Venue::new("グッドウ", "AF"),
    Venue::new("カラ", "B0"),
    Venue::new("オースト", "B6"),
    Venue::new("カナダ", "B8"),
    Venue::new("ドーヴィ", "C4"),
    Venue::new("アラブ首", "C7"),
    Venue::new("ロンシャ", "C8"),
    Venue::new("ウッドバ", "E3"),
    Venue::new("トルコ", "E8"),
    Venue::new("サンタア", "F3"),
    Venue::new("チャーチ", "F4"),
    Venue::new("ベルモン", "FD"),
    Venue::new("香港", "G0"),
    Venue::new("フレミン", "G4"),
    Venue::new("ムーニー", "G5"),
    Venue::new("コーフィ", "G6"),
    Venue::new("シャティ", "H1"),
    Venue::new("メイダン", "J0"),
    Venue::new("ソウル", "K0"),
    Venue::new("シンガポ", "M0"),
    Venue::new("キングア", "P0"),
];

/// Composite race identifier: date, venue and race number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RaceId {
    date: NaiveDate,
    venue: Venue,
    race: u8,
}

impl RaceId {
    pub fn new(date: NaiveDate, venue: Venue, race: u32) -> Result<Self, IdentityError> {
        if !(1..=99).contains(&race) {
            return Err(IdentityError::RaceNumber(race));
        }
        if !(0..=9999).contains(&date.year()) {
            return Err(IdentityError::MalformedRaceId(date.to_string()));
        }
        Ok(Self {
            date,
            venue,
            race: race as u8,
        })
    }

    /// Encode (date, venue name, race number) into a race id.
    pub fn encode(date: NaiveDate, venue_name: &str, race: u32) -> Result<Self, IdentityError> {
        Self::new(date, Venue::from_name(venue_name)?, race)
    }

    /// Inverse of [`RaceId::encode`].
    pub fn decode(&self) -> (NaiveDate, &'static str, u32) {
        (self.date, self.venue.name(), self.race as u32)
    }

    /// Build an id from the loosely formatted cells of a history row:
    /// `"2024/01/05"`, `"3大井5"`, `"11"`.
    pub fn from_history_cells(date: &str, venue: &str, race: &str) -> Result<Self, IdentityError> {
        let digits: String = date.chars().filter(char::is_ascii_digit).collect();
        let date = NaiveDate::parse_from_str(&digits, "%Y%m%d")
            .map_err(|_| IdentityError::MalformedRaceId(date.to_string()))?;
        let race: u32 = race
            .trim()
            .parse()
            .map_err(|_| IdentityError::MalformedRaceId(race.to_string()))?;
        Self::encode(date, venue, race)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn race(&self) -> u32 {
        self.race as u32
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Same day and venue, different race number.
    pub fn with_race(&self, race: u32) -> Result<Self, IdentityError> {
        Self::new(self.date, self.venue, race)
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{}{:02}{:02}{:02}",
            self.date.year(),
            self.venue.code,
            self.date.month(),
            self.date.day(),
            self.race
        )
    }
}

impl FromStr for RaceId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdentityError::MalformedRaceId(s.to_string());
        if s.len() != 12 || !s.is_ascii() {
            return Err(malformed());
        }
        let number = |range: std::ops::Range<usize>| -> Result<u32, IdentityError> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            part.parse::<u32>().map_err(|_| malformed())
        };

        let year = number(0..4)? as i32;
        let venue = Venue::from_code(&s[4..6])?;
        let month = number(6..8)?;
        let day = number(8..10)?;
        let race = number(10..12)?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)?;

        Self::new(date, venue, race).map_err(|_| malformed())
    }
}

impl Serialize for RaceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RaceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub(crate) fn strip_digits(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_digit()).collect()
}
