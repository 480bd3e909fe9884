//! On-disk persistence of the ingestion state
//!
//! Layout (paths come from [`StorageConfig`]):
//! - pending list: one-column CSV headed `Car Links`
//! - each partition: CSV in schema order plus a JSON-lines mirror
//! - link log: CSV with `URL,Outcome` rows
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written checkpoint.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    COLUMNS, Dataset, FieldValue, IngestionState, LinkLogEntry, ListingId, OutcomeCategory,
    Partition, VehicleRecord,
};
use crate::infrastructure::config::StorageConfig;

pub const PENDING_HEADER: &str = "Car Links";
pub const LINK_LOG_HEADERS: [&str; 2] = ["URL", "Outcome"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to move checkpoint into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },

    #[error("Checkpoint task failed: {0}")]
    Task(String),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable home of the ingestion state
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the state left by previous runs; missing files are empty
    async fn load(&self) -> StoreResult<IngestionState>;

    /// Persist pending list, both partitions and the link log
    async fn checkpoint(&self, state: &IngestionState) -> StoreResult<()>;
}

/// CSV and JSON-lines files on the local filesystem
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    paths: StorageConfig,
}

impl FileRecordStore {
    pub fn new(paths: StorageConfig) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StorageConfig {
        &self.paths
    }

    fn partition_paths(&self, partition: Partition) -> (&Path, &Path) {
        match partition {
            Partition::Sold => (self.paths.sold_csv.as_path(), self.paths.sold_json.as_path()),
            Partition::Referred => (
                self.paths.referred_csv.as_path(),
                self.paths.referred_json.as_path(),
            ),
        }
    }

    pub fn load_pending(&self) -> StoreResult<Vec<ListingId>> {
        let path = &self.paths.car_links_csv;
        let Some(mut reader) = open_csv(path)? else {
            return Ok(Vec::new());
        };

        let headers = reader.headers().map_err(|e| StoreError::csv(path, e))?.clone();
        let column = headers
            .iter()
            .position(|h| h.trim() == PENDING_HEADER)
            .unwrap_or(0);

        let mut pending = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| StoreError::csv(path, e))?;
            if let Some(link) = row.get(column).map(str::trim).filter(|link| !link.is_empty()) {
                pending.push(ListingId::from(link));
            }
        }
        debug!(path = %path.display(), count = pending.len(), "Loaded pending listings");
        Ok(pending)
    }

    pub fn save_pending(&self, pending: &[ListingId]) -> StoreResult<()> {
        let path = &self.paths.car_links_csv;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([PENDING_HEADER])
            .map_err(|e| StoreError::csv(path, e))?;
        for id in pending {
            writer
                .write_record([id.as_str()])
                .map_err(|e| StoreError::csv(path, e))?;
        }
        write_atomic(path, &finish_csv(path, writer)?)
    }

    /// Records of `partition`, typed back from the delimited form
    pub fn load_dataset(&self, partition: Partition) -> StoreResult<Dataset> {
        let (path, _) = self.partition_paths(partition);
        let Some(mut reader) = open_csv(path)? else {
            return Ok(Dataset::new(partition));
        };

        let headers = reader.headers().map_err(|e| StoreError::csv(path, e))?.clone();
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| StoreError::csv(path, e))?;
            let fields = headers
                .iter()
                .zip(row.iter())
                .map(|(column, cell)| (column, FieldValue::from_csv_cell(column, cell)));
            records.push(VehicleRecord::from_fields(fields));
        }
        debug!(path = %path.display(), count = records.len(), ?partition, "Loaded dataset");
        Ok(Dataset::from_records(partition, records))
    }

    /// Write both forms of a partition
    pub fn save_dataset(&self, dataset: &Dataset) -> StoreResult<()> {
        let (csv_path, json_path) = self.partition_paths(dataset.partition());

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(COLUMNS)
            .map_err(|e| StoreError::csv(csv_path, e))?;
        for record in dataset.records() {
            writer
                .write_record(record.iter().map(|(_, value)| value.to_csv_cell()))
                .map_err(|e| StoreError::csv(csv_path, e))?;
        }
        write_atomic(csv_path, &finish_csv(csv_path, writer)?)?;

        let mut lines = Vec::new();
        for record in dataset.records() {
            serde_json::to_writer(&mut lines, record).map_err(|e| StoreError::Json {
                path: json_path.to_path_buf(),
                source: e,
            })?;
            lines.push(b'\n');
        }
        write_atomic(json_path, &lines)
    }

    pub fn load_link_log(&self) -> StoreResult<Vec<LinkLogEntry>> {
        let path = &self.paths.scraped_links_csv;
        let Some(mut reader) = open_csv(path)? else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| StoreError::csv(path, e))?;
            let (Some(url), Some(outcome)) = (row.get(0), row.get(1)) else {
                continue;
            };
            match OutcomeCategory::parse(outcome) {
                Some(outcome) => entries.push(LinkLogEntry {
                    url: ListingId::from(url.trim()),
                    outcome,
                }),
                None => warn!(url = %url, outcome = %outcome, "Skipping link log row with unknown outcome"),
            }
        }
        Ok(entries)
    }

    pub fn save_link_log(&self, entries: &[LinkLogEntry]) -> StoreResult<()> {
        let path = &self.paths.scraped_links_csv;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(LINK_LOG_HEADERS)
            .map_err(|e| StoreError::csv(path, e))?;
        for entry in entries {
            writer
                .write_record([entry.url.as_str(), entry.outcome.as_str()])
                .map_err(|e| StoreError::csv(path, e))?;
        }
        write_atomic(path, &finish_csv(path, writer)?)
    }

    fn load_all(&self) -> StoreResult<IngestionState> {
        let state = IngestionState {
            pending: self.load_pending()?,
            sold: self.load_dataset(Partition::Sold)?,
            referred: self.load_dataset(Partition::Referred)?,
            link_log: self.load_link_log()?,
        };
        info!(
            pending = state.pending.len(),
            sold = state.sold.len(),
            referred = state.referred.len(),
            logged = state.link_log.len(),
            "Loaded ingestion state"
        );
        Ok(state)
    }

    /// Records and the link log go first and the pending list last, so a
    /// failed checkpoint leaves resolved listings pending on disk
    fn save_all(&self, state: &IngestionState) -> StoreResult<()> {
        self.save_dataset(&state.sold)?;
        self.save_dataset(&state.referred)?;
        self.save_link_log(&state.link_log)?;
        self.save_pending(&state.pending)?;
        debug!(pending = state.pending.len(), "Checkpoint written");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileRecordStore {
    async fn load(&self) -> StoreResult<IngestionState> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_all())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn checkpoint(&self, state: &IngestionState) -> StoreResult<()> {
        let store = self.clone();
        let snapshot = state.clone();
        tokio::task::spawn_blocking(move || store.save_all(&snapshot))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Reader over `path`, or `None` when the file does not exist yet
fn open_csv(path: &Path) -> StoreResult<Option<csv::Reader<fs::File>>> {
    match fs::File::open(path) {
        Ok(file) => Ok(Some(
            csv::ReaderBuilder::new().flexible(true).from_reader(file),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "File not found, starting empty");
            Ok(None)
        }
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn finish_csv(path: &Path, writer: csv::Writer<Vec<u8>>) -> StoreResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| StoreError::io(path, e.into_error()))
}

fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut file = NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    file.write_all(contents).map_err(|e| StoreError::io(path, e))?;
    file.as_file().sync_all().map_err(|e| StoreError::io(path, e))?;
    file.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
