use common::Result;
use common::config::Settings;
use tracing::info;

use crate::dataset::{Dataset, ObjectStoreDataset, store_for_uri};
use crate::writer::{ParquetTableWriter, PartitionedWriter};
use crate::{dimensions, facts, loader};

/// Row and skip counts from one completed run, for observability.
#[derive(Debug)]
pub struct PipelineSummary {
    pub songs: usize,
    pub artists: usize,
    pub users: usize,
    pub time: usize,
    pub songplays: usize,
    pub skipped_song_records: usize,
    pub skipped_activity_events: usize,
}

/// Runs a full pipeline generation against the configured roots. Either all
/// five tables are derived and written, or the run aborts with the failing
/// stage's error; there is no partial success.
pub async fn run(settings: &Settings) -> Result<PipelineSummary> {
    let dataset = ObjectStoreDataset::from_uri(&settings.input_root, settings.s3.as_ref())?;
    let (store, root) = store_for_uri(&settings.output_root, settings.s3.as_ref())?;
    let writer = ParquetTableWriter::new(store, root);
    run_with(&dataset, &writer, settings).await
}

pub async fn run_with<W: PartitionedWriter>(
    dataset: &dyn Dataset,
    writer: &W,
    settings: &Settings,
) -> Result<PipelineSummary> {
    info!(pattern = %settings.song_pattern, "Loading song records");
    let songs = loader::load_songs(dataset, &settings.song_pattern).await?;

    info!(pattern = %settings.log_pattern, "Loading activity events");
    let activity = loader::load_activity(dataset, &settings.log_pattern).await?;

    let songs_table = dimensions::songs_table(&songs.records);
    let artists_table = dimensions::artists_table(&songs.records);
    let users_table = dimensions::users_table(&activity.records);
    let time_table = dimensions::time_table(&activity.records);
    let songplays_table = facts::songplays_table(&activity.records, &songs.records);

    writer.write_table(&songs_table).await?;
    writer.write_table(&artists_table).await?;
    writer.write_table(&users_table).await?;
    writer.write_table(&time_table).await?;
    writer.write_table(&songplays_table).await?;

    let summary = PipelineSummary {
        songs: songs_table.len(),
        artists: artists_table.len(),
        users: users_table.len(),
        time: time_table.len(),
        songplays: songplays_table.len(),
        skipped_song_records: songs.skipped,
        skipped_activity_events: activity.skipped,
    };
    info!(?summary, "Pipeline run complete");
    Ok(summary)
}
