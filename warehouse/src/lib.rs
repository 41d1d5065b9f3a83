pub mod dataset;
pub mod dimensions;
pub mod facts;
pub mod loader;
pub mod pipeline;
pub mod records;
pub mod schema;
pub mod tables;
pub mod writer;

pub use pipeline::PipelineSummary;

use common::Result;
use common::config::Settings;

/// Loads settings from the given config file and runs one full pipeline
/// generation.
pub async fn run_warehouse_pipeline(config_path: &str) -> Result<PipelineSummary> {
    let settings = Settings::new(config_path)?;
    pipeline::run(&settings).await
}
