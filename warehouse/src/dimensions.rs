use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::warn;

use crate::loader::dedup_by_key;
use crate::records::{ActivityEvent, SongRecord};
use crate::tables::{ArtistRow, SongsRow, TimeRow, UserRow};

/// The page value marking an actual song play. Only these events feed the
/// users and time dimensions and the songplays fact table.
pub const NEXT_SONG_PAGE: &str = "NextSong";

pub fn songs_table(records: &[SongRecord]) -> Vec<SongsRow> {
    let rows: Vec<SongsRow> = records
        .iter()
        .map(|r| SongsRow {
            song_id: r.song_id.clone(),
            title: r.title.clone(),
            artist_id: r.artist_id.clone(),
            year: r.year,
            duration: r.duration,
        })
        .collect();
    dedup_by_key(rows, SongsRow::full_key)
}

/// Artist rows are deduplicated on the full tuple, not on artist_id alone:
/// two song records for one artist with differing location metadata produce
/// two rows, surfacing the source inconsistency instead of hiding it.
pub fn artists_table(records: &[SongRecord]) -> Vec<ArtistRow> {
    let rows: Vec<ArtistRow> = records
        .iter()
        .map(|r| ArtistRow {
            artist_id: r.artist_id.clone(),
            name: r.artist_name.clone(),
            location: r.artist_location.clone(),
            latitude: r.artist_latitude,
            longitude: r.artist_longitude,
        })
        .collect();
    dedup_by_key(rows, ArtistRow::full_key)
}

/// One row per distinct (user_id, first_name, last_name, gender, level)
/// tuple. A user whose level changed over time keeps one row per level:
/// history is preserved, not collapsed.
pub fn users_table(events: &[ActivityEvent]) -> Vec<UserRow> {
    let rows: Vec<UserRow> = events
        .iter()
        .filter(|e| e.page == NEXT_SONG_PAGE)
        .map(|e| UserRow {
            user_id: e.user_id.clone(),
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            gender: e.gender.clone(),
            level: e.level.clone(),
        })
        .collect();
    dedup_by_key(rows, UserRow::full_key)
}

/// One row per distinct timestamp of a qualifying event, decomposed in UTC.
pub fn time_table(events: &[ActivityEvent]) -> Vec<TimeRow> {
    let rows: Vec<TimeRow> = events
        .iter()
        .filter(|e| e.page == NEXT_SONG_PAGE)
        .filter_map(|e| decompose(e.ts))
        .collect();
    dedup_by_key(rows, TimeRow::full_key)
}

/// Decomposes an epoch-millisecond timestamp into the time dimension row.
///
/// Calendar convention, fixed across the whole pipeline: UTC throughout,
/// `week` is the ISO week-of-year, `weekday` is ISO numbering with
/// 1 = Monday .. 7 = Sunday.
pub fn decompose(ts: i64) -> Option<TimeRow> {
    let instant = utc_instant(ts)?;
    Some(TimeRow {
        start_time: ts,
        hour: instant.hour() as i32,
        day: instant.day() as i32,
        week: instant.iso_week().week() as i32,
        month: instant.month() as i32,
        year: instant.year(),
        weekday: instant.weekday().number_from_monday() as i32,
    })
}

pub fn utc_instant(ts: i64) -> Option<DateTime<Utc>> {
    let instant = DateTime::from_timestamp_millis(ts);
    if instant.is_none() {
        warn!(ts, "Timestamp outside representable range, dropping row");
    }
    instant
}
