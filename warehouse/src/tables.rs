use arrow::array::{ArrayRef, Float64Builder, Int32Builder, Int64Builder, StringBuilder};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use common::Result;
use std::sync::Arc;

use crate::schema;

/// One warehouse table: name, partition layout, arrow schema, and the
/// conversion from row values to a record batch.
pub trait WarehouseTable: Sized {
    const NAME: &'static str;
    const PARTITION_COLUMNS: &'static [&'static str];

    fn schema() -> Schema;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch>;

    /// `(column, value)` pairs aligned with `PARTITION_COLUMNS`, formatted
    /// as Hive-style directory components.
    fn partition_values(&self) -> Vec<(&'static str, String)>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongsRow {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

impl SongsRow {
    pub fn full_key(&self) -> (String, String, String, i32, u64) {
        (
            self.song_id.clone(),
            self.title.clone(),
            self.artist_id.clone(),
            self.year,
            self.duration.to_bits(),
        )
    }
}

impl WarehouseTable for SongsRow {
    const NAME: &'static str = "songs";
    const PARTITION_COLUMNS: &'static [&'static str] = &["year", "artist_id"];

    fn schema() -> Schema {
        schema::songs_schema()
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let mut song_id = StringBuilder::new();
        let mut title = StringBuilder::new();
        let mut artist_id = StringBuilder::new();
        let mut year = Int32Builder::new();
        let mut duration = Float64Builder::new();
        for row in rows {
            song_id.append_value(&row.song_id);
            title.append_value(&row.title);
            artist_id.append_value(&row.artist_id);
            year.append_value(row.year);
            duration.append_value(row.duration);
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(song_id.finish()),
            Arc::new(title.finish()),
            Arc::new(artist_id.finish()),
            Arc::new(year.finish()),
            Arc::new(duration.finish()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    fn partition_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("year", self.year.to_string()),
            ("artist_id", self.artist_id.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ArtistRow {
    pub fn full_key(&self) -> (String, String, Option<String>, Option<u64>, Option<u64>) {
        (
            self.artist_id.clone(),
            self.name.clone(),
            self.location.clone(),
            self.latitude.map(f64::to_bits),
            self.longitude.map(f64::to_bits),
        )
    }
}

impl WarehouseTable for ArtistRow {
    const NAME: &'static str = "artists";
    const PARTITION_COLUMNS: &'static [&'static str] = &[];

    fn schema() -> Schema {
        schema::artists_schema()
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let mut artist_id = StringBuilder::new();
        let mut name = StringBuilder::new();
        let mut location = StringBuilder::new();
        let mut latitude = Float64Builder::new();
        let mut longitude = Float64Builder::new();
        for row in rows {
            artist_id.append_value(&row.artist_id);
            name.append_value(&row.name);
            location.append_option(row.location.as_deref());
            latitude.append_option(row.latitude);
            longitude.append_option(row.longitude);
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(artist_id.finish()),
            Arc::new(name.finish()),
            Arc::new(location.finish()),
            Arc::new(latitude.finish()),
            Arc::new(longitude.finish()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    fn partition_values(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: String,
}

impl UserRow {
    pub fn full_key(
        &self,
    ) -> (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
    ) {
        (
            self.user_id.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.gender.clone(),
            self.level.clone(),
        )
    }
}

impl WarehouseTable for UserRow {
    const NAME: &'static str = "users";
    const PARTITION_COLUMNS: &'static [&'static str] = &[];

    fn schema() -> Schema {
        schema::users_schema()
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let mut user_id = StringBuilder::new();
        let mut first_name = StringBuilder::new();
        let mut last_name = StringBuilder::new();
        let mut gender = StringBuilder::new();
        let mut level = StringBuilder::new();
        for row in rows {
            user_id.append_option(row.user_id.as_deref());
            first_name.append_option(row.first_name.as_deref());
            last_name.append_option(row.last_name.as_deref());
            gender.append_option(row.gender.as_deref());
            level.append_value(&row.level);
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(user_id.finish()),
            Arc::new(first_name.finish()),
            Arc::new(last_name.finish()),
            Arc::new(gender.finish()),
            Arc::new(level.finish()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    fn partition_values(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub start_time: i64,
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

impl TimeRow {
    // All other fields are pure functions of start_time, so the full-row
    // key reduces to it.
    pub fn full_key(&self) -> i64 {
        self.start_time
    }
}

impl WarehouseTable for TimeRow {
    const NAME: &'static str = "time";
    const PARTITION_COLUMNS: &'static [&'static str] = &["year", "month"];

    fn schema() -> Schema {
        schema::time_schema()
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let mut start_time = Int64Builder::new();
        let mut hour = Int32Builder::new();
        let mut day = Int32Builder::new();
        let mut week = Int32Builder::new();
        let mut month = Int32Builder::new();
        let mut year = Int32Builder::new();
        let mut weekday = Int32Builder::new();
        for row in rows {
            start_time.append_value(row.start_time);
            hour.append_value(row.hour);
            day.append_value(row.day);
            week.append_value(row.week);
            month.append_value(row.month);
            year.append_value(row.year);
            weekday.append_value(row.weekday);
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(start_time.finish()),
            Arc::new(hour.finish()),
            Arc::new(day.finish()),
            Arc::new(week.finish()),
            Arc::new(month.finish()),
            Arc::new(year.finish()),
            Arc::new(weekday.finish()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    fn partition_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("year", self.year.to_string()),
            ("month", format!("{:02}", self.month)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub songplay_id: i64,
    pub start_time: i64,
    pub user_id: Option<String>,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub year: i32,
    pub month: i32,
}

impl WarehouseTable for SongplayRow {
    const NAME: &'static str = "songplays";
    const PARTITION_COLUMNS: &'static [&'static str] = &["year", "month"];

    fn schema() -> Schema {
        schema::songplays_schema()
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        let mut songplay_id = Int64Builder::new();
        let mut start_time = Int64Builder::new();
        let mut user_id = StringBuilder::new();
        let mut level = StringBuilder::new();
        let mut song_id = StringBuilder::new();
        let mut artist_id = StringBuilder::new();
        let mut session_id = Int64Builder::new();
        let mut location = StringBuilder::new();
        let mut user_agent = StringBuilder::new();
        let mut year = Int32Builder::new();
        let mut month = Int32Builder::new();
        for row in rows {
            songplay_id.append_value(row.songplay_id);
            start_time.append_value(row.start_time);
            user_id.append_option(row.user_id.as_deref());
            level.append_value(&row.level);
            song_id.append_option(row.song_id.as_deref());
            artist_id.append_option(row.artist_id.as_deref());
            session_id.append_value(row.session_id);
            location.append_option(row.location.as_deref());
            user_agent.append_option(row.user_agent.as_deref());
            year.append_value(row.year);
            month.append_value(row.month);
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(songplay_id.finish()),
            Arc::new(start_time.finish()),
            Arc::new(user_id.finish()),
            Arc::new(level.finish()),
            Arc::new(song_id.finish()),
            Arc::new(artist_id.finish()),
            Arc::new(session_id.finish()),
            Arc::new(location.finish()),
            Arc::new(user_agent.finish()),
            Arc::new(year.finish()),
            Arc::new(month.finish()),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    fn partition_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("year", self.year.to_string()),
            ("month", format!("{:02}", self.month)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    #[test]
    fn batch_columns_follow_declared_schema() {
        let rows = vec![SongsRow {
            song_id: "S1".to_string(),
            title: "Alpha".to_string(),
            artist_id: "AR1".to_string(),
            year: 2005,
            duration: 218.93179,
        }];
        let batch = SongsRow::to_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema().as_ref(), &schema::songs_schema());
    }

    #[test]
    fn nullable_columns_round_trip_nulls() {
        let rows = vec![ArtistRow {
            artist_id: "AR1".to_string(),
            name: "Casual".to_string(),
            location: None,
            latitude: None,
            longitude: None,
        }];
        let batch = ArtistRow::to_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column(2).is_null(0));
        assert!(batch.column(3).is_null(0));
    }

    #[test]
    fn partition_values_align_with_partition_columns() {
        let row = SongplayRow {
            songplay_id: 0,
            start_time: 1541121934796,
            user_id: Some("26".to_string()),
            level: "free".to_string(),
            song_id: None,
            artist_id: None,
            session_id: 583,
            location: None,
            user_agent: None,
            year: 2018,
            month: 11,
        };
        let values = row.partition_values();
        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        assert_eq!(columns, SongplayRow::PARTITION_COLUMNS);
        assert_eq!(values[1].1, "11");
    }
}
