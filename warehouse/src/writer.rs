use async_trait::async_trait;
use bytes::Bytes;
use common::{Error, Result};
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::path::Path as StorePath;
use parquet::arrow::ArrowWriter;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::tables::WarehouseTable;

/// Write capability for the five warehouse tables: full-overwrite semantics,
/// columnar persistence, partition columns drive the physical layout.
#[async_trait]
pub trait PartitionedWriter: Send + Sync {
    async fn write_table<T: WarehouseTable + Clone + Send + Sync>(&self, rows: &[T]) -> Result<()>;
}

/// Persists tables as parquet under `<root>/<table>/<col>=<value>/...`,
/// one part file per partition-value tuple.
pub struct ParquetTableWriter {
    store: Arc<dyn ObjectStore>,
    root: StorePath,
}

impl ParquetTableWriter {
    pub fn new(store: Arc<dyn ObjectStore>, root: StorePath) -> Self {
        Self { store, root }
    }

    fn table_prefix(&self, table: &str) -> StorePath {
        if self.root.as_ref().is_empty() {
            StorePath::from(table)
        } else {
            StorePath::from(format!("{}/{}", self.root.as_ref(), table))
        }
    }

    /// Each run replaces the table wholesale; stale partitions from a prior
    /// run must not survive.
    async fn clear_table(&self, table: &str) -> Result<()> {
        let prefix = self.table_prefix(table);
        let mut stream = self.store.list(Some(&prefix));
        let mut keys = Vec::new();
        while let Some(meta) = stream.try_next().await.map_err(|e| sink_err(table, e))? {
            keys.push(meta.location);
        }
        for key in keys {
            self.store.delete(&key).await.map_err(|e| sink_err(table, e))?;
        }
        Ok(())
    }

    async fn put_parquet<T: WarehouseTable>(&self, key: &StorePath, rows: &[T]) -> Result<()> {
        let batch = T::to_batch(rows)?;
        let mut buffer: Vec<u8> = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        self.store
            .put(key, Bytes::from(buffer).into())
            .await
            .map_err(|e| sink_err(T::NAME, e))?;
        Ok(())
    }
}

#[async_trait]
impl PartitionedWriter for ParquetTableWriter {
    async fn write_table<T: WarehouseTable + Clone + Send + Sync>(&self, rows: &[T]) -> Result<()> {
        self.clear_table(T::NAME).await?;

        let prefix = self.table_prefix(T::NAME);
        let groups = group_by_partition(rows);
        let partitions = groups.len();

        if rows.is_empty() {
            // An empty source still produces the table, just with no rows.
            let key = StorePath::from(format!("{}/part-00000.parquet", prefix.as_ref()));
            self.put_parquet::<T>(&key, rows).await?;
        } else {
            for (dir, group) in groups {
                let key = if dir.is_empty() {
                    StorePath::from(format!("{}/part-00000.parquet", prefix.as_ref()))
                } else {
                    StorePath::from(format!("{}/{}/part-00000.parquet", prefix.as_ref(), dir))
                };
                self.put_parquet::<T>(&key, &group).await?;
            }
        }

        info!(
            table = T::NAME,
            rows = rows.len(),
            partitions,
            "Wrote table"
        );
        Ok(())
    }
}

/// Groups rows by their Hive-style partition directory, ordered for
/// deterministic output. Unpartitioned tables form a single group with an
/// empty directory.
fn group_by_partition<T: WarehouseTable + Clone>(rows: &[T]) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for row in rows {
        let dir = row
            .partition_values()
            .iter()
            .map(|(col, value)| format!("{}={}", col, value))
            .collect::<Vec<_>>()
            .join("/");
        groups.entry(dir).or_default().push(row.clone());
    }
    groups
}

fn sink_err(table: &str, err: impl std::fmt::Display) -> Error {
    Error::SinkUnavailable {
        table: table.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{SongplayRow, SongsRow};
    use object_store::local::LocalFileSystem;

    fn songplay(session_id: i64, year: i32, month: i32) -> SongplayRow {
        SongplayRow {
            songplay_id: session_id,
            start_time: 1541121934796,
            user_id: Some("26".to_string()),
            level: "free".to_string(),
            song_id: None,
            artist_id: None,
            session_id,
            location: None,
            user_agent: None,
            year,
            month,
        }
    }

    fn local_writer(dir: &std::path::Path) -> ParquetTableWriter {
        let store = LocalFileSystem::new_with_prefix(dir).unwrap();
        ParquetTableWriter::new(Arc::new(store), StorePath::default())
    }

    #[test]
    fn rows_group_by_partition_tuple() {
        let rows = vec![
            songplay(1, 2018, 11),
            songplay(2, 2018, 11),
            songplay(3, 2018, 12),
        ];
        let groups = group_by_partition(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["year=2018/month=11"].len(), 2);
        assert_eq!(groups["year=2018/month=12"].len(), 1);
    }

    #[tokio::test]
    async fn writes_hive_style_partition_directories() {
        let dir = tempfile::tempdir().unwrap();
        let writer = local_writer(dir.path());

        let rows = vec![songplay(1, 2018, 11), songplay(2, 2018, 12)];
        writer.write_table(&rows).await.unwrap();

        assert!(dir
            .path()
            .join("songplays/year=2018/month=11/part-00000.parquet")
            .exists());
        assert!(dir
            .path()
            .join("songplays/year=2018/month=12/part-00000.parquet")
            .exists());
    }

    #[tokio::test]
    async fn rewrite_replaces_prior_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let writer = local_writer(dir.path());

        writer.write_table(&[songplay(1, 2018, 11)]).await.unwrap();
        writer.write_table(&[songplay(1, 2018, 12)]).await.unwrap();

        assert!(!dir
            .path()
            .join("songplays/year=2018/month=11/part-00000.parquet")
            .exists());
        assert!(dir
            .path()
            .join("songplays/year=2018/month=12/part-00000.parquet")
            .exists());
    }

    #[tokio::test]
    async fn empty_table_still_produces_a_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = local_writer(dir.path());

        let rows = vec![SongsRow {
            song_id: "S1".to_string(),
            title: "Alpha".to_string(),
            artist_id: "AR1".to_string(),
            year: 2005,
            duration: 218.93179,
        }];
        // songs is partitioned; use an empty table to exercise the
        // single-file path as well.
        writer.write_table(&rows).await.unwrap();
        assert!(dir
            .path()
            .join("songs/year=2005/artist_id=AR1/part-00000.parquet")
            .exists());

        let empty: Vec<SongsRow> = Vec::new();
        writer.write_table(&empty).await.unwrap();
        assert!(dir.path().join("songs/part-00000.parquet").exists());
    }
}
