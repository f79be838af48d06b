//! Whole-table persistence.
//!
//! Tables are read in full and overwritten in full. There is no locking;
//! callers serialize runs.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Narrow storage seam used by the merge engine and the learned mapping.
pub trait TableStore<Row> {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn load(&self) -> Result<Vec<Row>>;

    /// Replace the whole table with `rows`.
    fn save(&self, rows: &[Row]) -> Result<()>;
}

impl<Row, T: TableStore<Row> + ?Sized> TableStore<Row> for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load(&self) -> Result<Vec<Row>> {
        (**self).load()
    }

    fn save(&self, rows: &[Row]) -> Result<()> {
        (**self).save(rows)
    }
}

/// Flat CSV file with a fixed header row.
#[derive(Debug, Clone)]
pub struct CsvTable<Row> {
    name: String,
    path: PathBuf,
    headers: &'static [&'static str],
    _row: PhantomData<fn() -> Row>,
}

impl<Row> CsvTable<Row> {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, headers: &'static [&'static str]) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            headers,
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl<Row> TableStore<Row> for CsvTable<Row>
where
    Row: Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Row>> {
        if !self.exists() {
            return Err(Error::TableMissing {
                table: self.name.clone(),
                path: self.path.clone(),
            });
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for (i, result) in rdr.deserialize::<Row>().enumerate() {
            let row = result.map_err(|e| Error::storage(&self.name, format!("row {}: {e}", i + 1)))?;
            rows.push(row);
        }
        tracing::debug!(table = %self.name, rows = rows.len(), "loaded table");
        Ok(rows)
    }

    fn save(&self, rows: &[Row]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write next to the target and rename so readers never see half a table.
        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file());
            wtr.write_record(self.headers)?;
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        tmp.persist(&self.path)
            .map_err(|e| Error::storage(&self.name, format!("replace {}: {}", self.path.display(), e.error)))?;

        tracing::debug!(table = %self.name, rows = rows.len(), "saved table");
        Ok(())
    }
}

/// In-memory table for tests and dry runs. Clones share the same rows.
///
/// A table created with [`MemoryTable::missing`] fails to load until it is saved.
#[derive(Debug)]
pub struct MemoryTable<Row> {
    name: String,
    rows: Arc<Mutex<Option<Vec<Row>>>>,
}

impl<Row> Clone for MemoryTable<Row> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<Row: Clone> MemoryTable<Row> {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(Mutex::new(Some(rows))),
        }
    }

    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(Mutex::new(None)),
        }
    }

    /// Current contents, empty if the table was never saved.
    pub fn snapshot(&self) -> Vec<Row> {
        self.rows
            .lock()
            .map(|guard| guard.clone().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl<Row: Clone> TableStore<Row> for MemoryTable<Row> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Row>> {
        let guard = self
            .rows
            .lock()
            .map_err(|_| Error::storage(&self.name, "lock poisoned"))?;
        guard.clone().ok_or_else(|| Error::TableMissing {
            table: self.name.clone(),
            path: PathBuf::from(format!("memory:{}", self.name)),
        })
    }

    fn save(&self, rows: &[Row]) -> Result<()> {
        let mut guard = self
            .rows
            .lock()
            .map_err(|_| Error::storage(&self.name, "lock poisoned"))?;
        *guard = Some(rows.to_vec());
        Ok(())
    }
}
