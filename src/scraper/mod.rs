//! Web scraper module for netkeiba.com
//!
//! Provides browser automation, page decoding and race-id enumeration.

pub mod browser;
pub mod cache;
pub mod enumerator;
pub mod parsers;
pub mod session;

pub use browser::{ChromeLauncher, ChromeSession, Launcher, Session};
pub use enumerator::RaceIdEnumerator;
pub use session::{RenderedPage, SessionManager};

use crate::race_id::RaceId;

/// Base URLs for netkeiba.com
pub const NAR_URL: &str = "https://nar.netkeiba.com";
pub const DB_URL: &str = "https://db.netkeiba.com";

/// Build monthly race calendar URL
pub fn calendar_url(year: i32, month: u32) -> String {
    format!("{}/top/calendar.html?year={}&month={}", NAR_URL, year, month)
}

/// Build race card (shutuba) URL
pub fn race_card_url(race_id: &RaceId) -> String {
    format!("{}/race/shutuba.html?race_id={}", NAR_URL, race_id)
}

/// Build race result URL
pub fn race_result_url(race_id: &RaceId) -> String {
    format!("{}/race/result.html?race_id={}", NAR_URL, race_id)
}

/// Build horse profile URL
pub fn horse_url(horse_id: &str) -> String {
    format!("{}/horse/{}", DB_URL, horse_id)
}

/// Build horse pedigree URL
pub fn pedigree_url(horse_id: &str) -> String {
    format!("{}/horse/ped/{}", DB_URL, horse_id)
}

/// Build jockey profile URL
pub fn jockey_url(jockey_id: &str) -> String {
    format!("{}/jockey/{}", DB_URL, jockey_id)
}

/// Build trainer profile URL
pub fn trainer_url(trainer_id: &str) -> String {
    format!("{}/trainer/{}", DB_URL, trainer_id)
}
