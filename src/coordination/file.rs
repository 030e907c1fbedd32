use chrono::Utc;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CoordinationChannel, RecordKey};
use crate::error::Result;

const TEMP_SUFFIX: &str = "tmp";
const CLAIM_SUFFIX: &str = "claim";

/// Coordination records stored as files in one directory.
///
/// Every write lands in a uniquely named scratch file first and is published
/// with a single `rename` (or `hard_link` for create-if-absent), so readers
/// never observe a partially written record.
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: PathBuf,
}

impl FileChannel {
    /// Open the channel rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: RecordKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn scratch_path(&self, key: RecordKey, suffix: &str) -> PathBuf {
        self.dir.join(format!(
            ".{}.{}.{}",
            key.file_name(),
            Uuid::new_v4().simple(),
            suffix
        ))
    }

    fn write_scratch(&self, key: RecordKey, text: &str) -> io::Result<PathBuf> {
        let scratch = self.scratch_path(key, TEMP_SUFFIX);
        write_synced(&scratch, text.as_bytes())?;
        Ok(scratch)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Replace `path` with `bytes` atomically (scratch file + rename in the same directory)
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let scratch = dir.join(format!(".{}.{}.{}", name, Uuid::new_v4().simple(), TEMP_SUFFIX));

    write_synced(&scratch, bytes)?;
    if let Err(e) = fs::rename(&scratch, path) {
        let _ = fs::remove_file(&scratch);
        return Err(e);
    }
    Ok(())
}

impl CoordinationChannel for FileChannel {
    fn set_flag(&self, key: RecordKey) -> Result<()> {
        self.write_value(key, &Utc::now().to_rfc3339())
    }

    fn clear_flag(&self, key: RecordKey) -> Result<()> {
        ignore_missing(fs::remove_file(self.path(key)))?;
        Ok(())
    }

    fn has_flag(&self, key: RecordKey) -> Result<bool> {
        match fs::metadata(self.path(key)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn write_value(&self, key: RecordKey, text: &str) -> Result<()> {
        let scratch = self.write_scratch(key, text)?;
        if let Err(e) = fs::rename(&scratch, self.path(key)) {
            let _ = fs::remove_file(&scratch);
            return Err(e.into());
        }
        debug!(record = %key, bytes = text.len(), "Record written");
        Ok(())
    }

    fn create_value(&self, key: RecordKey, text: &str) -> Result<bool> {
        let scratch = self.write_scratch(key, text)?;
        let linked = fs::hard_link(&scratch, self.path(key));
        let _ = fs::remove_file(&scratch);

        match linked {
            Ok(()) => {
                debug!(record = %key, "Record created");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_and_clear_value(&self, key: RecordKey) -> Result<Option<String>> {
        // Claim the record first so two concurrent readers cannot both get it.
        let claim = self.scratch_path(key, CLAIM_SUFFIX);
        match fs::rename(self.path(key), &claim) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let text = fs::read_to_string(&claim);
        if let Err(e) = fs::remove_file(&claim) {
            warn!("Failed to remove claimed {} record: {}", key, e);
        }
        Ok(Some(text?))
    }

    fn peek_value(&self, key: RecordKey) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn age(&self, key: RecordKey) -> Result<Option<Duration>> {
        match fs::metadata(self.path(key)) {
            Ok(meta) => Ok(Some(age_of(meta.modified()?))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn sweep_scratch(&self, older_than: Duration) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_scratch = name.starts_with('.')
                && (name.ends_with(TEMP_SUFFIX) || name.ends_with(CLAIM_SUFFIX));
            if !is_scratch {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if age_of(modified) >= older_than {
                ignore_missing(fs::remove_file(entry.path()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn age_of(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}
