use common::Result;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::records::{ActivityEvent, FromRaw, SongRecord};

/// The validated, deduplicated output of one source read, with the number
/// of records dropped by the skip-and-count policy.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

pub async fn load_songs(dataset: &dyn Dataset, pattern: &str) -> Result<Loaded<SongRecord>> {
    load::<SongRecord>(dataset, pattern).await
}

pub async fn load_activity(dataset: &dyn Dataset, pattern: &str) -> Result<Loaded<ActivityEvent>> {
    load::<ActivityEvent>(dataset, pattern).await
}

/// Reads raw records for one kind, coerces them against the schema registry,
/// skips and counts anything malformed, and removes exact duplicates.
async fn load<T: FromRaw>(dataset: &dyn Dataset, pattern: &str) -> Result<Loaded<T>> {
    let batch = dataset.read_records(pattern).await?;
    let total = batch.records.len() + batch.malformed;
    let mut skipped = batch.malformed;

    let mut records = Vec::with_capacity(batch.records.len());
    for raw in &batch.records {
        match T::from_json(raw) {
            Ok(record) => records.push(record),
            Err(violation) => {
                debug!(kind = ?T::KIND, %violation, "Skipping record");
                skipped += 1;
            }
        }
    }

    let records = dedup_by_key(records, T::full_key);
    if skipped > 0 {
        warn!(
            kind = ?T::KIND,
            skipped,
            total,
            "Dropped records failing schema coercion"
        );
    }

    Ok(Loaded { records, skipped })
}

/// Order-preserving, first-wins removal of rows whose key collides. With a
/// full-row key this is exact-duplicate removal with set semantics.
pub fn dedup_by_key<T, K, F>(rows: Vec<T>, key: F) -> Vec<T>
where
    K: Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RawBatch;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct StubDataset {
        records: Vec<Value>,
        malformed: usize,
    }

    #[async_trait]
    impl Dataset for StubDataset {
        async fn read_records(&self, _pattern: &str) -> Result<RawBatch> {
            Ok(RawBatch {
                records: self.records.clone(),
                malformed: self.malformed,
            })
        }
    }

    fn song(id: &str, title: &str) -> Value {
        json!({
            "artist_id": "AR1",
            "artist_latitude": null,
            "artist_location": null,
            "artist_longitude": null,
            "artist_name": "Casual",
            "duration": 218.93179,
            "num_songs": 1,
            "song_id": id,
            "title": title,
            "year": 2005
        })
    }

    #[tokio::test]
    async fn exact_duplicates_collapse_to_one() {
        let dataset = StubDataset {
            records: vec![song("S1", "Alpha"), song("S1", "Alpha"), song("S2", "Beta")],
            malformed: 0,
        };
        let loaded = load_songs(&dataset, "song_data/*.json").await.unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped, 0);
    }

    #[tokio::test]
    async fn near_duplicates_both_survive() {
        // Same song_id, different title: not equal tuples, both retained.
        let dataset = StubDataset {
            records: vec![song("S1", "Alpha"), song("S1", "Alpha (remix)")],
            malformed: 0,
        };
        let loaded = load_songs(&dataset, "song_data/*.json").await.unwrap();
        assert_eq!(loaded.records.len(), 2);
    }

    #[tokio::test]
    async fn violations_are_skipped_and_counted() {
        let mut bad = song("S3", "Gamma");
        bad["duration"] = json!("very long");
        let dataset = StubDataset {
            records: vec![song("S1", "Alpha"), bad, json!({"unrelated": true})],
            malformed: 2,
        };
        let loaded = load_songs(&dataset, "song_data/*.json").await.unwrap();
        assert_eq!(loaded.records.len(), 1);
        // two coercion failures plus two unparseable lines
        assert_eq!(loaded.skipped, 4);
    }

    #[tokio::test]
    async fn empty_source_yields_empty_set() {
        let dataset = StubDataset {
            records: vec![],
            malformed: 0,
        };
        let loaded = load_songs(&dataset, "song_data/*.json").await.unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.skipped, 0);
    }
}
