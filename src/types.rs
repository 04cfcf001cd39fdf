//! Typed records decoded from the source pages.
//!
//! Fields that a page may legitimately lack are `Option`s: `None` is the
//! explicit "missing" marker, never a stand-in default.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::race_id::RaceId;

/// Closed label enumerations. The label is the text printed on the site and
/// the value stored in documents; `code` is the ordinal used for
/// categorical encoding downstream.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn code(&self) -> usize {
                Self::ALL.iter().position(|v| v == self).unwrap_or_default()
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label() == s)
                    .ok_or_else(|| s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

labelled_enum!(
    /// Course surface letter.
    Surface {
        Turf => "芝",
        Dirt => "ダ",
        Steeplechase => "障",
    }
);

labelled_enum!(
    Weather {
        Sunny => "晴",
        Cloudy => "曇",
        LightRain => "小雨",
        Rain => "雨",
        LightSnow => "小雪",
        Snow => "雪",
    }
);

labelled_enum!(
    /// Going, from firm to soft.
    GroundCondition {
        Firm => "良",
        Good => "稍重",
        Yielding => "重",
        Soft => "不良",
    }
);

/// Which participant a history query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Horse,
    Jockey,
    Trainer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Horse => "horse",
            Role::Jockey => "jockey",
            Role::Trainer => "trainer",
        }
    }

    /// Field holding this role's id on starting entries.
    pub fn id_field(&self) -> &'static str {
        match self {
            Role::Horse => "horse_id",
            Role::Jockey => "jockey_id",
            Role::Trainer => "trainer_id",
        }
    }

    /// The participant joined in beside this one: horses show their jockey,
    /// jockeys and trainers show the horse.
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Horse => Role::Jockey,
            Role::Jockey | Role::Trainer => Role::Horse,
        }
    }

    /// Base for synthesized labels of co-occurring participants
    /// (101, 1001, 10001, ...), kept apart from real entry numbers.
    pub fn label_base(&self) -> u32 {
        match self {
            Role::Horse => 100,
            Role::Jockey => 1000,
            Role::Trainer => 10000,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "horse" => Ok(Role::Horse),
            "jockey" => Ok(Role::Jockey),
            "trainer" => Ok(Role::Trainer),
            other => Err(format!("invalid role {other:?}, expected horse, jockey or trainer")),
        }
    }
}

/// Pre-race metadata from the race page header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreEventInfo {
    pub name: Option<String>,
    /// "HH:MM" post time.
    pub start_time: Option<String>,
    pub surface: Option<Surface>,
    /// Meters.
    pub distance: Option<u32>,
    /// 右 / 左 / 直 and variants such as 右 外.
    pub direction: Option<String>,
    pub weather: Option<Weather>,
    pub ground_condition: Option<GroundCondition>,
    pub venue: Option<String>,
    pub grade: Option<String>,
    pub field_size: Option<u32>,
    /// First-place prize, in units of 10,000 yen.
    pub prize: Option<f64>,
}

/// A participant's registration for one race.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartingEntry {
    pub entry_number: u32,
    pub bracket: Option<u32>,
    pub horse_name: Option<String>,
    pub sex_age: Option<String>,
    pub carried_weight: Option<f64>,
    pub jockey_name: Option<String>,
    pub stable: Option<String>,
    /// "480(+4)" as printed.
    pub body_weight: Option<String>,
    pub odds: Option<f64>,
    pub popularity: Option<u32>,
    pub horse_id: Option<String>,
    pub jockey_id: Option<String>,
    pub trainer_id: Option<String>,
}

/// Outcome of one entry in a finished race.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub entry_number: u32,
    pub finish_position: Option<u32>,
    /// 取消 / 除外 / 中止 when the entry did not finish normally.
    pub finish_status: Option<String>,
    pub time: Option<String>,
    pub margin: Option<String>,
    /// Corner positions, "5-5-3-2".
    pub passing: Option<String>,
    /// Pace splits, "36.1-38.0".
    pub pace: Option<String>,
    /// Final-stretch split in seconds.
    pub final_split: Option<f64>,
}

/// One row of a race result page: what was run and who ran it.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceResultRow {
    pub entry: StartingEntry,
    pub result: ResultEntry,
}

/// One row of a horse's past-performance table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// Race id carried by the race-name link, as printed.
    pub link_race_id: Option<String>,
    pub date: String,
    /// Venue name with embedded digits stripped.
    pub venue: String,
    pub race_number: String,
    pub pre_event: PreEventInfo,
    pub entry: StartingEntry,
    pub result: ResultEntry,
}

impl HistoryRow {
    /// Canonical race id derived from date, venue and race number. When the
    /// venue is not in the table, the id on the race-name link is used.
    pub fn race_id(&self) -> Result<RaceId, crate::error::IdentityError> {
        RaceId::from_history_cells(&self.date, &self.venue, &self.race_number).or_else(|e| {
            self.link_race_id
                .as_deref()
                .and_then(|id| id.parse().ok())
                .ok_or(e)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorseProfile {
    pub name: Option<String>,
    pub birthday: Option<String>,
    pub trainer_id: Option<String>,
    pub owner: Option<String>,
    pub breeder: Option<String>,
    pub origin: Option<String>,
    pub auction_price: Option<String>,
}

/// Jockey or trainer profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanProfile {
    pub name: Option<String>,
    pub reading: Option<String>,
    /// "YYYY-MM-DD".
    pub birthday: Option<String>,
}

/// Ancestors keyed by generation-path code ("f", "mf", "ffm", ...).
/// A `None` id is an ancestor cell without a profile link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pedigree {
    pub ancestors: BTreeMap<String, Option<String>>,
}

impl Pedigree {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.ancestors.get(path).and_then(|id| id.as_deref())
    }

    pub fn len(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for surface in Surface::ALL {
            assert_eq!(surface.label().parse::<Surface>().unwrap(), *surface);
        }
        assert_eq!("稍重".parse::<GroundCondition>(), Ok(GroundCondition::Good));
        assert!("晴れ".parse::<Weather>().is_err());
    }

    #[test]
    fn test_categorical_codes() {
        assert_eq!(GroundCondition::Firm.code(), 0);
        assert_eq!(GroundCondition::Soft.code(), 3);
        assert_eq!(Weather::LightRain.code(), 2);
    }

    #[test]
    fn test_role_label_base() {
        assert_eq!(Role::Horse.label_base(), 100);
        assert_eq!(Role::Jockey.label_base(), 1000);
        assert_eq!(Role::Trainer.label_base(), 10000);
    }

    #[test]
    fn test_role_counterpart() {
        assert_eq!(Role::Horse.counterpart(), Role::Jockey);
        assert_eq!(Role::Trainer.counterpart(), Role::Horse);
    }

    #[test]
    fn test_surface_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Surface::Dirt).unwrap(), "\"ダ\"");
    }
}
