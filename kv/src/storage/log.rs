//! The on-disk write-ahead log: an append-only sequence of length-prefixed
//! [`Record`] frames. Open-or-create, take an exclusive `fs4` lock for the
//! process lifetime, and buffer reads/writes through `BufReader`/`BufWriter`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::codec::{read_record, write_record};
use crate::error::{CResult, Error};
use crate::record::Record;

/// Opens (or creates) a WAL file for appending, holding an exclusive file
/// lock until dropped.
pub struct LogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogWriter {
    pub fn open(path: impl Into<PathBuf>) -> CResult<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Internal(format!("log file {:?} is already locked by another process", path))
        })?;

        Ok(LogWriter { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, fully buffering it before writing so that no
    /// partial frame is ever observable.
    pub fn append(&mut self, record: &Record) -> CResult<()> {
        write_record(&mut self.writer, record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A lazy, sequential reader over a WAL file's frames.
pub struct LogReader {
    reader: BufReader<File>,
}

impl LogReader {
    pub fn open(path: impl AsRef<Path>) -> CResult<Self> {
        let file = File::open(path)?;
        Ok(LogReader { reader: BufReader::new(file) })
    }
}

impl Iterator for LogReader {
    type Item = CResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_record(&mut self.reader) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Reads every record from `path` in order. A missing file is treated as an
/// empty log (there is nothing to replay on first start).
pub fn read_all(path: impl AsRef<Path>) -> CResult<Vec<Record>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    LogReader::open(path)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let mut writer = LogWriter::open(&path).unwrap();
            writer.append(&Record::set(1, "a", "1")).unwrap();
            writer.append(&Record::delete(0, "b")).unwrap();
            writer.append(&Record::commit(1)).unwrap();
        }

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, "a");
        assert_eq!(records[2].kind, crate::record::RecordKind::Commit);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.log");
        assert_eq!(read_all(&path).unwrap(), Vec::new());
    }

    #[test]
    fn second_writer_cannot_take_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let _first = LogWriter::open(&path).unwrap();
        assert!(LogWriter::open(&path).is_err());
    }
}
