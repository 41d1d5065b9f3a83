use std::collections::HashMap;

use crate::dimensions::{NEXT_SONG_PAGE, utc_instant};
use crate::loader::dedup_by_key;
use crate::records::{ActivityEvent, SongRecord};
use crate::tables::SongplayRow;
use chrono::Datelike;

/// Derives the songplays fact table.
///
/// Each qualifying event is left-joined to song records on the textual
/// `(artist name, title)` pair. This is a best-effort match, not a foreign
/// key: an unmatched event keeps a row with null song/artist ids, and an
/// ambiguous match fans the event out into one row per matching song.
///
/// Rows are deduplicated on the full tuple before `songplay_id` assignment,
/// so exact-duplicate input events collapse; dedup after assignment would be
/// a no-op since the surrogate key makes every row unique.
pub fn songplays_table(events: &[ActivityEvent], songs: &[SongRecord]) -> Vec<SongplayRow> {
    let mut by_artist_title: HashMap<(&str, &str), Vec<&SongRecord>> = HashMap::new();
    for song in songs {
        by_artist_title
            .entry((song.artist_name.as_str(), song.title.as_str()))
            .or_default()
            .push(song);
    }

    let mut rows = Vec::new();
    for event in events.iter().filter(|e| e.page == NEXT_SONG_PAGE) {
        let Some(instant) = utc_instant(event.ts) else {
            continue;
        };

        let matches = match (event.artist.as_deref(), event.song.as_deref()) {
            (Some(artist), Some(song)) => by_artist_title
                .get(&(artist, song))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            _ => &[],
        };

        let identities: Vec<(Option<String>, Option<String>)> = if matches.is_empty() {
            vec![(None, None)]
        } else {
            matches
                .iter()
                .map(|s| (Some(s.song_id.clone()), Some(s.artist_id.clone())))
                .collect()
        };

        for (song_id, artist_id) in identities {
            rows.push(SongplayRow {
                songplay_id: 0,
                start_time: event.ts,
                user_id: event.user_id.clone(),
                level: event.level.clone(),
                song_id,
                artist_id,
                session_id: event.session_id,
                location: event.location.clone(),
                user_agent: event.user_agent.clone(),
                // Derived from the event timestamp, never an independent
                // source, so partitions agree with the time dimension.
                year: instant.year(),
                month: instant.month() as i32,
            });
        }
    }

    let mut rows = dedup_by_key(rows, |r| {
        (
            r.start_time,
            r.user_id.clone(),
            r.level.clone(),
            r.song_id.clone(),
            r.artist_id.clone(),
            r.session_id,
            r.location.clone(),
            r.user_agent.clone(),
            r.year,
            r.month,
        )
    });

    // Per-run surrogate keys: monotonic, unique within this run only,
    // with no ordering relationship to event time.
    for (id, row) in rows.iter_mut().enumerate() {
        row.songplay_id = id as i64;
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn song(song_id: &str, artist_id: &str, artist_name: &str, title: &str) -> SongRecord {
        SongRecord {
            song_id: song_id.to_string(),
            title: title.to_string(),
            artist_id: artist_id.to_string(),
            artist_name: artist_name.to_string(),
            artist_location: None,
            artist_latitude: None,
            artist_longitude: None,
            duration: 218.93179,
            year: 2005,
            num_songs: 1,
        }
    }

    fn play(artist: Option<&str>, title: Option<&str>, ts: i64, session_id: i64) -> ActivityEvent {
        ActivityEvent {
            user_id: Some("26".to_string()),
            first_name: Some("Ryan".to_string()),
            last_name: Some("Smith".to_string()),
            gender: Some("M".to_string()),
            level: "free".to_string(),
            page: NEXT_SONG_PAGE.to_string(),
            song: title.map(String::from),
            artist: artist.map(String::from),
            length: Some(655.77751),
            session_id,
            location: None,
            user_agent: None,
            ts,
            item_in_session: 0,
            registration: None,
            auth: "Logged In".to_string(),
            method: "PUT".to_string(),
            status: 200,
        }
    }

    #[test]
    fn matched_event_carries_song_and_artist_identity() {
        let songs = vec![song("S1", "AR1", "Harmonia", "Sehr kosmisch")];
        let events = vec![play(Some("Harmonia"), Some("Sehr kosmisch"), 1541121934796, 583)];
        let rows = songplays_table(&events, &songs);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].song_id.as_deref(), Some("S1"));
        assert_eq!(rows[0].artist_id.as_deref(), Some("AR1"));
    }

    #[test]
    fn unmatched_event_is_kept_with_null_identity() {
        let songs = vec![song("S1", "AR1", "Harmonia", "Sehr kosmisch")];
        let events = vec![play(Some("Daft Punk"), Some("Aerodynamic"), 1541121934796, 583)];
        let rows = songplays_table(&events, &songs);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].song_id, None);
        assert_eq!(rows[0].artist_id, None);
    }

    #[test]
    fn ambiguous_match_fans_out_one_row_per_song() {
        // Two songs with the same title by the same artist name.
        let songs = vec![
            song("S1", "AR1", "Harmonia", "Sehr kosmisch"),
            song("S2", "AR1", "Harmonia", "Sehr kosmisch"),
        ];
        let events = vec![play(Some("Harmonia"), Some("Sehr kosmisch"), 1541121934796, 583)];
        let rows = songplays_table(&events, &songs);
        assert_eq!(rows.len(), 2);
        let ids: HashSet<_> = rows.iter().map(|r| r.song_id.clone()).collect();
        assert!(ids.contains(&Some("S1".to_string())));
        assert!(ids.contains(&Some("S2".to_string())));
    }

    #[test]
    fn duplicate_events_collapse_before_key_assignment() {
        let events = vec![
            play(None, None, 1541121934796, 583),
            play(None, None, 1541121934796, 583),
        ];
        let rows = songplays_table(&events, &[]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn surrogate_keys_are_unique_within_the_run() {
        let events = vec![
            play(None, Some("A"), 1541121934796, 1),
            play(None, Some("B"), 1541121934796, 2),
            play(None, Some("C"), 1541121934796, 3),
        ];
        let rows = songplays_table(&events, &[]);
        let ids: HashSet<i64> = rows.iter().map(|r| r.songplay_id).collect();
        assert_eq!(ids.len(), rows.len());
    }

    #[test]
    fn non_next_song_events_are_filtered_out() {
        let mut event = play(None, None, 1541121934796, 583);
        event.page = "Home".to_string();
        assert!(songplays_table(&[event], &[]).is_empty());
    }

    #[test]
    fn partition_columns_follow_start_time_utc() {
        // 2018-11-02T01:25:34.796Z
        let events = vec![play(None, None, 1541121934796, 583)];
        let rows = songplays_table(&events, &[]);
        assert_eq!(rows[0].year, 2018);
        assert_eq!(rows[0].month, 11);
        assert_eq!(rows[0].start_time, 1541121934796);
    }
}
