//! The log's unit of data: a single mutation (or commit marker) tagged
//! with the transaction that produced it.

use std::fmt;

/// The kind of mutation a [`Record`] carries.
///
/// The discriminants are part of the on-disk contract: `SET = 0`, `DEL = 1`,
/// `COMMIT = 2`. Unknown values encountered on read are skipped with a
/// warning rather than treated as a hard error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Set,
    Delete,
    Commit,
}

impl RecordKind {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            RecordKind::Set => 0,
            RecordKind::Delete => 1,
            RecordKind::Commit => 2,
        }
    }

    pub(crate) fn from_wire(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordKind::Set),
            1 => Some(RecordKind::Delete),
            2 => Some(RecordKind::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Set => write!(f, "SET"),
            RecordKind::Delete => write!(f, "DEL"),
            RecordKind::Commit => write!(f, "COMMIT"),
        }
    }
}

/// A single WAL entry.
///
/// `txid = 0` means the mutation is autocommitted and should be applied
/// immediately on replay; a non-zero `txid` marks a record that belongs to a
/// transaction still pending a `COMMIT` record with the same id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub txid: i64,
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn set(txid: i64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Record { kind: RecordKind::Set, txid, key: key.into(), value: value.into() }
    }

    pub fn delete(txid: i64, key: impl Into<String>) -> Self {
        Record { kind: RecordKind::Delete, txid, key: key.into(), value: String::new() }
    }

    pub fn commit(txid: i64) -> Self {
        Record { kind: RecordKind::Commit, txid, key: String::new(), value: String::new() }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.key, self.value)
    }
}
