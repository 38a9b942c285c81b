//! JSONL (JSON Lines) match log.
//!
//! Each Group gets one append-only file under `<data_dir>/matches/`, one match record per
//! line. Records are never rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{MatchLog, StorageConfig, StorageError};
use crate::models::{GroupId, MatchRecord};

/// Appends JSON lines to a file.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append a single entity to the file.
    pub fn append(&self, entity: &T) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(entity)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        debug!("Appended entity to {:?}", self.path);
        Ok(())
    }
}

/// Reads JSON lines from a file.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all entities, skipping lines that fail to parse.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entities = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(entity) => entities.push(entity),
                Err(e) => {
                    warn!(
                        "Failed to parse line {} in {:?}: {}",
                        index + 1,
                        self.path,
                        e
                    );
                }
            }
        }

        debug!("Read {} entities from {:?}", entities.len(), self.path);
        Ok(entities)
    }
}

/// Match log stored as one JSONL file per Group.
pub struct JsonlMatchLog {
    config: StorageConfig,
}

impl JsonlMatchLog {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MatchLog for JsonlMatchLog {
    async fn append(&self, record: &MatchRecord) -> Result<(), StorageError> {
        let writer = JsonlWriter::new(self.config.match_log_path(&record.group_id));
        let record = record.clone();
        tokio::task::spawn_blocking(move || writer.append(&record))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    async fn list(&self, group_id: &GroupId) -> Result<Vec<MatchRecord>, StorageError> {
        let reader: JsonlReader<MatchRecord> =
            JsonlReader::new(self.config.match_log_path(group_id));
        tokio::task::spawn_blocking(move || reader.read_all())
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }
}
