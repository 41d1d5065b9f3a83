use arrow::datatypes::{DataType, Field, Schema};
use lazy_static::lazy_static;

/// The two raw record kinds the pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Song,
    Activity,
}

impl RecordKind {
    /// Ordered (field name, semantic type, nullable) triples for the raw kind.
    pub fn raw_schema(&self) -> &'static Schema {
        match self {
            RecordKind::Song => &RAW_SONG_SCHEMA,
            RecordKind::Activity => &RAW_ACTIVITY_SCHEMA,
        }
    }

    /// Default glob pattern locating the kind's files under the input root.
    pub fn path_pattern(&self) -> &'static str {
        match self {
            RecordKind::Song => "song_data/*/*/*/*.json",
            RecordKind::Activity => "log_data/*.json",
        }
    }
}

// Raw source schemas. Field names follow the source files verbatim,
// so the activity fields are camelCase.
pub fn raw_song_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_name", DataType::Utf8, false),
        Field::new("duration", DataType::Float64, false),
        Field::new("num_songs", DataType::Int32, false),
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
    ])
}

pub fn raw_activity_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("auth", DataType::Utf8, false),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("itemInSession", DataType::Int32, false),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("method", DataType::Utf8, false),
        Field::new("page", DataType::Utf8, false),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, false),
        Field::new("song", DataType::Utf8, true),
        Field::new("status", DataType::Int32, false),
        Field::new("ts", DataType::Int64, false),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ])
}

// Warehouse table schemas.
pub fn songs_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("duration", DataType::Float64, false),
    ])
}

pub fn artists_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ])
}

pub fn users_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DataType::Utf8, true),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, false),
    ])
}

pub fn time_schema() -> Schema {
    Schema::new(vec![
        Field::new("start_time", DataType::Int64, false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ])
}

pub fn songplays_schema() -> Schema {
    Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_time", DataType::Int64, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, false),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
    ])
}

// Lazy-loaded static schemas
lazy_static! {
    static ref RAW_SONG_SCHEMA: Schema = raw_song_schema();
    static ref RAW_ACTIVITY_SCHEMA: Schema = raw_activity_schema();
}
