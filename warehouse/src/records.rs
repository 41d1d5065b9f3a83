use arrow::datatypes::DataType;
use serde_json::{Map, Value};

use crate::schema::RecordKind;

/// Per-record schema failure. Absorbed by the loader (skip-and-count),
/// never propagated as a fatal error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("field `{field}`: {reason}")]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// One raw song metadata record, the source of truth for song and artist identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub duration: f64,
    pub year: i32,
    pub num_songs: i32,
}

/// One raw user-activity log line. Only `page == "NextSong"` rows represent
/// an actual play.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: String,
    pub page: String,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub ts: i64,
    pub item_in_session: i32,
    pub registration: Option<f64>,
    pub auth: String,
    pub method: String,
    pub status: i32,
}

/// A raw record type that can be validated, coerced, and deduplicated.
///
/// `full_key` is the full field tuple (floats keyed by their IEEE bit
/// patterns), so deduplication has set semantics: records equal in every
/// field collapse to one, records differing anywhere both survive.
pub trait FromRaw: Sized {
    const KIND: RecordKind;
    type Key: std::hash::Hash + Eq;

    fn from_json(value: &Value) -> Result<Self, Violation>;
    fn full_key(&self) -> Self::Key;
}

type SongKey = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<u64>,
    Option<u64>,
    u64,
    i32,
    i32,
);

type ActivityKey = (
    (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<u64>,
    ),
    (
        i64,
        Option<String>,
        Option<String>,
        i64,
        i32,
        Option<u64>,
        String,
        String,
        i32,
    ),
);

impl FromRaw for SongRecord {
    const KIND: RecordKind = RecordKind::Song;
    type Key = SongKey;

    fn full_key(&self) -> SongKey {
        (
            self.song_id.clone(),
            self.title.clone(),
            self.artist_id.clone(),
            self.artist_name.clone(),
            self.artist_location.clone(),
            self.artist_latitude.map(f64::to_bits),
            self.artist_longitude.map(f64::to_bits),
            self.duration.to_bits(),
            self.year,
            self.num_songs,
        )
    }

    fn from_json(value: &Value) -> Result<Self, Violation> {
        let obj = validate_raw(Self::KIND, value)?;
        Ok(Self {
            song_id: req_str(obj, "song_id")?,
            title: req_str(obj, "title")?,
            artist_id: req_str(obj, "artist_id")?,
            artist_name: req_str(obj, "artist_name")?,
            artist_location: opt_str(obj, "artist_location")?,
            artist_latitude: opt_f64(obj, "artist_latitude")?,
            artist_longitude: opt_f64(obj, "artist_longitude")?,
            duration: req_f64(obj, "duration")?,
            year: req_i32(obj, "year")?,
            num_songs: req_i32(obj, "num_songs")?,
        })
    }
}

impl FromRaw for ActivityEvent {
    const KIND: RecordKind = RecordKind::Activity;
    type Key = ActivityKey;

    fn full_key(&self) -> ActivityKey {
        (
            (
                self.user_id.clone(),
                self.first_name.clone(),
                self.last_name.clone(),
                self.gender.clone(),
                self.level.clone(),
                self.page.clone(),
                self.song.clone(),
                self.artist.clone(),
                self.length.map(f64::to_bits),
            ),
            (
                self.session_id,
                self.location.clone(),
                self.user_agent.clone(),
                self.ts,
                self.item_in_session,
                self.registration.map(f64::to_bits),
                self.auth.clone(),
                self.method.clone(),
                self.status,
            ),
        )
    }

    fn from_json(value: &Value) -> Result<Self, Violation> {
        let obj = validate_raw(Self::KIND, value)?;
        // The source writes userId = "" for logged-out sessions; treat it as absent.
        let user_id = opt_str(obj, "userId")?.filter(|id| !id.is_empty());
        Ok(Self {
            user_id,
            first_name: opt_str(obj, "firstName")?,
            last_name: opt_str(obj, "lastName")?,
            gender: opt_str(obj, "gender")?,
            level: req_str(obj, "level")?,
            page: req_str(obj, "page")?,
            song: opt_str(obj, "song")?,
            artist: opt_str(obj, "artist")?,
            length: opt_f64(obj, "length")?,
            session_id: req_i64(obj, "sessionId")?,
            location: opt_str(obj, "location")?,
            user_agent: opt_str(obj, "userAgent")?,
            ts: req_i64(obj, "ts")?,
            item_in_session: req_i32(obj, "itemInSession")?,
            registration: opt_f64(obj, "registration")?,
            auth: req_str(obj, "auth")?,
            method: req_str(obj, "method")?,
            status: req_i32(obj, "status")?,
        })
    }
}

/// Checks a raw value against the kind's declared (name, type, nullable)
/// triples: a non-nullable field that is absent, or a value that cannot be
/// coerced to its declared semantic type, fails the whole record.
fn validate_raw(kind: RecordKind, value: &Value) -> Result<&Map<String, Value>, Violation> {
    let obj = value
        .as_object()
        .ok_or_else(|| Violation::new("<record>", "not a JSON object"))?;

    for field in kind.raw_schema().fields() {
        match obj.get(field.name()) {
            None | Some(Value::Null) => {
                if !field.is_nullable() {
                    return Err(Violation::new(field.name(), "missing non-nullable field"));
                }
            }
            Some(raw) => {
                if !coercible(raw, field.data_type()) {
                    return Err(Violation::new(
                        field.name(),
                        format!("cannot coerce {} to {:?}", raw, field.data_type()),
                    ));
                }
            }
        }
    }

    Ok(obj)
}

fn coercible(value: &Value, ty: &DataType) -> bool {
    match ty {
        DataType::Utf8 => value.is_string(),
        DataType::Float64 => value.is_number(),
        DataType::Int64 => as_integral(value).is_some(),
        DataType::Int32 => as_integral(value)
            .map(|n| i32::try_from(n).is_ok())
            .unwrap_or(false),
        _ => false,
    }
}

// An integral JSON number, including floats with zero fraction (the source
// serializes some integer columns as floats).
fn as_integral(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Some(f as i64)
        }
        _ => None,
    }
}

fn req_str(obj: &Map<String, Value>, name: &str) -> Result<String, Violation> {
    opt_str(obj, name)?.ok_or_else(|| Violation::new(name, "missing non-nullable field"))
}

fn opt_str(obj: &Map<String, Value>, name: &str) -> Result<Option<String>, Violation> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Violation::new(name, format!("expected string, got {}", other))),
    }
}

fn req_f64(obj: &Map<String, Value>, name: &str) -> Result<f64, Violation> {
    opt_f64(obj, name)?.ok_or_else(|| Violation::new(name, "missing non-nullable field"))
}

fn opt_f64(obj: &Map<String, Value>, name: &str) -> Result<Option<f64>, Violation> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| Violation::new(name, format!("expected number, got {}", v))),
    }
}

fn req_i64(obj: &Map<String, Value>, name: &str) -> Result<i64, Violation> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(Violation::new(name, "missing non-nullable field")),
        Some(v) => as_integral(v)
            .ok_or_else(|| Violation::new(name, format!("expected integer, got {}", v))),
    }
}

fn req_i32(obj: &Map<String, Value>, name: &str) -> Result<i32, Violation> {
    let n = req_i64(obj, name)?;
    i32::try_from(n).map_err(|_| Violation::new(name, format!("{} out of range for Int32", n)))
}
