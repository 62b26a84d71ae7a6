use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use tracing::{debug, warn};

use crate::storage::model::{LogRecord, Partition};
use crate::timezone::{DATE_KEY_FORMAT, ZoneResolver};

/// Extension of partition files (`YYYY-MM-DD.json`).
pub const PARTITION_EXTENSION: &str = "json";

/// A partition that could not be read or parsed during a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptPartition {
    pub name: String,
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for CorruptPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "corrupt partition {} ({}): {}",
            self.name,
            self.path.display(),
            self.reason
        )
    }
}

impl std::error::Error for CorruptPartition {}

/// Result of [`LogStore::load_recent`]. Both lists are in date-descending order.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub partitions: Vec<Partition>,
    pub corrupt: Vec<CorruptPartition>,
}

/// Append-only store of probe records, one JSON array file per local date.
///
/// Every append is a read-modify-write of the whole partition performed inside
/// an exclusive section for that partition: an in-process mutex plus an
/// advisory lock on a `.YYYY-MM-DD.lock` sidecar, so another process writing
/// the same directory is excluded too. The new contents are written to a
/// `.tmp` file and renamed over the partition, so a failed write leaves the
/// previous contents intact.
pub struct LogStore {
    base_path: PathBuf,
    zone: ZoneResolver,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LogStore {
    /// Opens (creating if needed) a log directory for writing.
    ///
    /// Leftover `<date>.json.tmp` files from interrupted writes are removed,
    /// but only when that partition's lock can be taken: a `.tmp` under a held
    /// lock belongs to an append in progress in another process.
    pub fn open(base_path: impl Into<PathBuf>, zone: ZoneResolver) -> io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        let store = Self::with_path(base_path, zone);
        for entry in fs::read_dir(&store.base_path)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                store.remove_stale_tmp(&path);
            }
        }
        Ok(store)
    }

    /// Opens an existing log directory without touching its contents.
    /// For readers such as inspection tools that run beside a live writer.
    pub fn open_read_only(base_path: impl Into<PathBuf>, zone: ZoneResolver) -> io::Result<Self> {
        let base_path = base_path.into();
        if !fs::metadata(&base_path)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", base_path.display()),
            ));
        }
        Ok(Self::with_path(base_path, zone))
    }

    fn with_path(base_path: PathBuf, zone: ZoneResolver) -> Self {
        Self {
            base_path,
            zone,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn remove_stale_tmp(&self, path: &Path) {
        let partition = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".tmp"))
            .and_then(|n| partition_name_from_path(Path::new(n)));

        let lock_file = match partition {
            Some(name) => match self.open_lock_file(&name) {
                Ok(file) => match file.try_lock_exclusive() {
                    Ok(()) => Some(file),
                    Err(_) => {
                        debug!("Keeping {}: partition {} is being written", path.display(), name);
                        return;
                    }
                },
                Err(e) => {
                    warn!("Failed to open lock for {}: {}", path.display(), e);
                    return;
                }
            },
            None => None,
        };

        match fs::remove_file(path) {
            Ok(()) => debug!("Removed stale temporary file {}", path.display()),
            Err(e) => warn!("Failed to remove stale file {}: {}", path.display(), e),
        }

        if let Some(file) = lock_file {
            let _ = FileExt::unlock(&file);
        }
    }

    fn open_lock_file(&self, name: &str) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.base_path.join(format!(".{}.lock", name)))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Zone used to name partitions at write time.
    pub fn zone(&self) -> &ZoneResolver {
        &self.zone
    }

    /// Partition name for a write happening at `now`.
    pub fn partition_name(&self, now: DateTime<Utc>) -> String {
        self.zone.date_key(now)
    }

    pub fn partition_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", name, PARTITION_EXTENSION))
    }

    /// Appends a record to today's partition.
    /// Returns the name of the partition written.
    pub fn append(&self, record: LogRecord) -> io::Result<String> {
        self.append_at(record, Utc::now())
    }

    /// Appends a record to the partition that is current at `now`.
    pub fn append_at(&self, record: LogRecord, now: DateTime<Utc>) -> io::Result<String> {
        self.append_batch(vec![record], now)
    }

    /// Appends several records, in order, to the partition that is current at
    /// `now`, within one exclusive section and one atomic replace.
    pub fn append_batch(&self, records: Vec<LogRecord>, now: DateTime<Utc>) -> io::Result<String> {
        let name = self.partition_name(now);
        if records.is_empty() {
            return Ok(name);
        }

        let section = self.partition_lock(&name);
        let _local = section.lock().unwrap_or_else(PoisonError::into_inner);

        let lock_file = self.open_lock_file(&name)?;
        lock_file.lock_exclusive()?;

        let result = self.read_modify_write(&name, records);

        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!("Failed to release lock for partition {}: {}", name, e);
        }

        result.map(|count| {
            debug!("Partition {}: {} records", name, count);
            name
        })
    }

    /// In-process section for `name`. Sections of earlier dates that nobody
    /// holds are dropped, so the map stays at about one entry per open day.
    /// The `.YYYY-MM-DD.lock` sidecars stay on disk: removing a lock file
    /// that another process may have open would split the lock.
    fn partition_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|key, section| key.as_str() >= name || Arc::strong_count(section) > 1);
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Returns the resulting record count.
    fn read_modify_write(&self, name: &str, new_records: Vec<LogRecord>) -> io::Result<usize> {
        let path = self.partition_path(name);

        let mut records: Vec<LogRecord> = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    self.quarantine(&path, &e)?;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };

        records.extend(new_records);
        write_records_atomic(&path, &records)?;
        Ok(records.len())
    }

    /// Moves an unparsable partition aside so the append does not destroy it.
    fn quarantine(&self, path: &Path, cause: &serde_json::Error) -> io::Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("partition");
        let target = path.with_file_name(format!(
            "{}.corrupt-{}",
            file_name,
            Utc::now().timestamp_millis()
        ));
        fs::rename(path, &target)?;
        warn!(
            "Partition {} is corrupt ({}); moved to {} and starting a new one",
            path.display(),
            cause,
            target.display()
        );
        Ok(())
    }

    /// Lists partition names, newest first.
    /// Only files named `YYYY-MM-DD.json` are partitions.
    pub fn list_partitions(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(name) = partition_name_from_path(&path) {
                names.push(name);
            }
        }

        // Fixed-width keys: lexical order is chronological order.
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Reads one partition fully into memory.
    pub fn load_partition(&self, name: &str) -> Result<Partition, CorruptPartition> {
        let path = self.partition_path(name);
        let corrupt = |reason: String| CorruptPartition {
            name: name.to_string(),
            path: path.clone(),
            reason,
        };

        let bytes = fs::read(&path).map_err(|e| corrupt(e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Partition {
                name: name.to_string(),
                records: Vec::new(),
            });
        }
        let records: Vec<LogRecord> =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        Ok(Partition {
            name: name.to_string(),
            records,
        })
    }

    /// Loads the `max_partitions` newest partitions.
    ///
    /// A partition that fails to read or parse is skipped and reported in
    /// [`LoadOutcome::corrupt`]; the rest still load.
    pub fn load_recent(&self, max_partitions: usize) -> io::Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();

        for name in self.list_partitions()?.into_iter().take(max_partitions) {
            match self.load_partition(&name) {
                Ok(partition) => outcome.partitions.push(partition),
                Err(corrupt) => {
                    warn!("Skipping {}", corrupt);
                    outcome.corrupt.push(corrupt);
                }
            }
        }

        Ok(outcome)
    }
}

/// Extracts the date key from a `YYYY-MM-DD.json` path.
fn partition_name_from_path(path: &Path) -> Option<String> {
    if path.extension()? != PARTITION_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(stem, DATE_KEY_FORMAT).ok()?;
    Some(stem.to_string())
}

fn write_records_atomic(path: &Path, records: &[LogRecord]) -> io::Result<()> {
    let tmp_path = path.with_extension(format!("{}.tmp", PARTITION_EXTENSION));

    let write = || -> io::Result<()> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records).map_err(io::Error::other)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&tmp_path, path)
    };

    let result = write();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
