use async_trait::async_trait;
use common::{Error, Result};
use common::config::S3Settings;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Raw records read from one path pattern. Lines that were not valid JSON
/// are counted rather than failing the read.
#[derive(Debug, Default)]
pub struct RawBatch {
    pub records: Vec<Value>,
    pub malformed: usize,
}

/// Read capability over the raw data. JSON-line oriented, schema-on-read:
/// every non-empty line of every matching object yields one raw record.
#[async_trait]
pub trait Dataset: Send + Sync {
    async fn read_records(&self, pattern: &str) -> Result<RawBatch>;
}

/// Dataset backed by any `object_store` implementation rooted at a prefix.
pub struct ObjectStoreDataset {
    store: Arc<dyn ObjectStore>,
    root: StorePath,
}

impl ObjectStoreDataset {
    pub fn new(store: Arc<dyn ObjectStore>, root: StorePath) -> Self {
        Self { store, root }
    }

    /// Builds a dataset from a root URI: `s3://bucket/prefix`, `file:///dir`,
    /// or a bare local directory. S3 access uses the explicit settings only;
    /// the process environment is never consulted.
    pub fn from_uri(uri: &str, s3: Option<&S3Settings>) -> Result<Self> {
        let (store, root) = store_for_uri(uri, s3)?;
        Ok(Self::new(store, root))
    }

    fn relative_key(&self, location: &StorePath) -> Option<String> {
        let root = self.root.as_ref();
        let full = location.as_ref();
        if root.is_empty() {
            return Some(full.to_string());
        }
        full.strip_prefix(root)
            .map(|rest| rest.trim_start_matches('/').to_string())
    }
}

#[async_trait]
impl Dataset for ObjectStoreDataset {
    async fn read_records(&self, pattern: &str) -> Result<RawBatch> {
        let matcher = glob_to_regex(pattern)?;
        let list_prefix = join_prefix(&self.root, literal_prefix(pattern));

        let mut stream = self.store.list(Some(&list_prefix));
        let mut keys = Vec::new();
        while let Some(meta) = stream.try_next().await.map_err(|e| source_err(pattern, e))? {
            if let Some(rel) = self.relative_key(&meta.location) {
                if matcher.is_match(&rel) {
                    keys.push(meta.location);
                }
            }
        }
        keys.sort();

        let mut batch = RawBatch::default();
        for key in keys {
            let bytes = self
                .store
                .get(&key)
                .await
                .map_err(|e| source_err(pattern, e))?
                .bytes()
                .await
                .map_err(|e| source_err(pattern, e))?;
            let text = String::from_utf8_lossy(&bytes);
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(value) => batch.records.push(value),
                    Err(e) => {
                        debug!(object = %key, error = %e, "Skipping unparseable line");
                        batch.malformed += 1;
                    }
                }
            }
        }

        Ok(batch)
    }
}

fn source_err(pattern: &str, err: impl std::fmt::Display) -> Error {
    Error::SourceUnavailable {
        stage: pattern.to_string(),
        message: err.to_string(),
    }
}

/// Resolves a root URI to an object store plus the root prefix inside it.
pub fn store_for_uri(
    uri: &str,
    s3: Option<&S3Settings>,
) -> Result<(Arc<dyn ObjectStore>, StorePath)> {
    if let Some(rest) = uri.strip_prefix("s3://") {
        let url = Url::parse(uri)?;
        let bucket = url
            .host_str()
            .ok_or_else(|| Error::InvalidInput(format!("s3 URI without bucket: {}", rest)))?;
        let settings = s3.ok_or_else(|| {
            Error::InvalidInput("s3 root configured but no [s3] settings provided".to_string())
        })?;

        let store = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&settings.region)
            .with_access_key_id(&settings.access_key)
            .with_secret_access_key(&settings.secret_key)
            .with_endpoint(&settings.endpoint)
            .with_allow_http(true)
            .build()?;

        let prefix = StorePath::from(url.path().trim_matches('/'));
        return Ok((Arc::new(store), prefix));
    }

    let dir = match uri.strip_prefix("file://") {
        Some(path) => path.to_string(),
        None => uri.to_string(),
    };
    let store = LocalFileSystem::new_with_prefix(&dir)
        .map_err(|e| Error::Storage(format!("cannot open local root {}: {}", dir, e)))?;
    Ok((Arc::new(store), StorePath::default()))
}

fn join_prefix(root: &StorePath, literal: &str) -> StorePath {
    match (root.as_ref().is_empty(), literal.is_empty()) {
        (true, true) => StorePath::default(),
        (true, false) => StorePath::from(literal),
        (false, true) => root.clone(),
        (false, false) => StorePath::from(format!("{}/{}", root.as_ref(), literal)),
    }
}

/// The leading wildcard-free directories of a glob pattern, used to narrow
/// the listing before regex matching.
fn literal_prefix(pattern: &str) -> &str {
    match pattern.find('*') {
        None => pattern,
        Some(idx) => match pattern[..idx].rfind('/') {
            Some(slash) => &pattern[..slash],
            None => "",
        },
    }
}

/// Glob-to-regex translation: `*` matches within one path segment.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for (i, part) in pattern.split('*').enumerate() {
        if i > 0 {
            expr.push_str("[^/]*");
        }
        expr.push_str(&regex::escape(part));
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::InvalidInput(format!("bad path pattern: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn glob_matches_segment_wise() {
        let re = glob_to_regex("song_data/*/*/*/*.json").unwrap();
        assert!(re.is_match("song_data/A/B/C/TRAABJL12903CDCF1A.json"));
        assert!(!re.is_match("song_data/A/B/TRAABJL12903CDCF1A.json"));
        assert!(!re.is_match("log_data/2018-11-01-events.json"));

        let re = glob_to_regex("log_data/*.json").unwrap();
        assert!(re.is_match("log_data/2018-11-01-events.json"));
        assert!(!re.is_match("log_data/2018/11/events.json"));
    }

    #[test]
    fn literal_prefix_stops_at_first_wildcard() {
        assert_eq!(literal_prefix("song_data/*/*/*/*.json"), "song_data");
        assert_eq!(literal_prefix("log_data/*.json"), "log_data");
        assert_eq!(literal_prefix("*.json"), "");
        assert_eq!(literal_prefix("log_data/events.json"), "log_data/events.json");
    }

    #[tokio::test]
    async fn reads_json_lines_and_counts_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log_data");
        std::fs::create_dir_all(&log_dir).unwrap();
        let mut file = std::fs::File::create(log_dir.join("2018-11-01-events.json")).unwrap();
        writeln!(file, "{{\"page\": \"NextSong\"}}").unwrap();
        writeln!(file, "not json at all").unwrap();
        writeln!(file, "{{\"page\": \"Home\"}}").unwrap();

        let dataset =
            ObjectStoreDataset::from_uri(dir.path().to_str().unwrap(), None).unwrap();
        let batch = dataset.read_records("log_data/*.json").await.unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.malformed, 1);
    }

    #[tokio::test]
    async fn pattern_only_matches_its_own_tree() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log_data");
        let song_dir = dir.path().join("song_data/A/B/C");
        std::fs::create_dir_all(&log_dir).unwrap();
        std::fs::create_dir_all(&song_dir).unwrap();
        std::fs::write(log_dir.join("events.json"), "{\"page\": \"Home\"}\n").unwrap();
        std::fs::write(song_dir.join("TRAAA.json"), "{\"song_id\": \"S1\"}\n").unwrap();

        let dataset =
            ObjectStoreDataset::from_uri(dir.path().to_str().unwrap(), None).unwrap();
        let batch = dataset.read_records("song_data/*/*/*/*.json").await.unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0]["song_id"], "S1");
    }
}
