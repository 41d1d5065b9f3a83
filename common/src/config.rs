use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Root URI of the raw data: a local directory, `file://...`, or `s3://bucket/prefix`.
    pub input_root: String,
    /// Root URI the five warehouse tables are written under.
    pub output_root: String,
    #[serde(default = "default_song_pattern")]
    pub song_pattern: String,
    #[serde(default = "default_log_pattern")]
    pub log_pattern: String,
    /// Explicit object-store credentials; process environment is never consulted.
    pub s3: Option<S3Settings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

fn default_song_pattern() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_pattern() -> String {
    "log_data/*.json".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP"));

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            input_root = %settings.input_root,
            output_root = %settings.output_root,
            "Loaded pipeline settings"
        );

        Ok(settings)
    }
}
