// SPDX-License-Identifier: MIT

//! Append-only write-ahead log: one JSON record per line, a dense
//! monotonic `seq` per line, and corruption recovery that preserves
//! whatever valid prefix it can find (spec.md #4.5, #9 Open Questions).

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Buffered-writes threshold that forces a flush.
const FLUSH_THRESHOLD: usize = 100;
/// Wall-clock threshold that forces a flush even under the write threshold.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// Backups kept on corruption recovery: `.bak`, `.bak.2`, `.bak.3`.
const MAX_BACKUPS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type WalResult<T> = Result<T, WalError>;

/// One logged record tagged with its dense sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub seq: u64,
    pub record: T,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Line<T> {
    seq: u64,
    record: T,
}

/// A single-file write-ahead log over records of type `T`.
///
/// Keeps an in-memory copy of every record appended through this handle,
/// which backs [`Wal::next_unprocessed`] (a stateful forward cursor) and
/// [`Wal::write_seq`]. [`Wal::entries_after`] instead re-reads the file from
/// disk, so it reflects whatever is actually durable even if something
/// wrote to the file outside this handle.
pub struct Wal<T> {
    path: PathBuf,
    file: File,
    entries: Vec<Entry<T>>,
    cursor: usize,
    write_seq: u64,
    processed_seq: u64,
    unflushed: usize,
    last_flush: Instant,
}

impl<T: Serialize + DeserializeOwned + Clone> Wal<T> {
    /// Open (or create) the log at `path`. `processed_seq` is the
    /// checkpoint to resume from, e.g. taken from a snapshot: entries with
    /// `seq <= processed_seq` are skipped by the initial read cursor.
    ///
    /// If the file's tail is corrupt (invalid UTF-8 or invalid JSON), the
    /// whole file as found is rotated to `.bak` (keeping up to
    /// [`MAX_BACKUPS`] prior rotations) and a fresh file containing only
    /// the valid prefix is written in its place.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();

        let (valid, corrupted) = if path.exists() {
            read_valid_prefix::<T>(&path)?
        } else {
            (Vec::new(), false)
        };

        if corrupted {
            rotate_backups(&path)?;
            rewrite(&path, &valid)?;
        } else if !path.exists() {
            File::create(&path)?;
        }

        let write_seq = valid.last().map(|e| e.seq).unwrap_or(0);
        let cursor = valid.iter().take_while(|e| e.seq <= processed_seq).count();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file,
            entries: valid,
            cursor,
            write_seq,
            processed_seq,
            unflushed: 0,
            last_flush: Instant::now(),
        })
    }

    /// Append one record, assigning it the next sequence number.
    pub fn append(&mut self, record: &T) -> WalResult<u64> {
        let seq = self.write_seq + 1;
        let line = Line { seq, record: record.clone() };
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');
        self.file.write_all(json.as_bytes())?;

        self.write_seq = seq;
        self.entries.push(Entry { seq, record: line.record });
        self.unflushed += 1;
        Ok(seq)
    }

    /// Force durability of everything written so far.
    pub fn flush(&mut self) -> WalResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Whether enough has been buffered, by count or by time, to warrant a
    /// [`Wal::flush`] call.
    pub fn needs_flush(&self) -> bool {
        self.unflushed >= FLUSH_THRESHOLD || (self.unflushed > 0 && self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Advance the read cursor by one and return the record it now points
    /// past, or `None` once every appended record has been consumed.
    pub fn next_unprocessed(&mut self) -> WalResult<Option<Entry<T>>> {
        if self.cursor >= self.entries.len() {
            return Ok(None);
        }
        let entry = self.entries[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(entry))
    }

    /// Record that everything up to and including `seq` has been applied
    /// downstream, e.g. to a [`crate::state::MaterializedState`] snapshot.
    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    /// Re-read the file from disk and return every valid record with
    /// `seq > since_seq`, stopping at the first corrupt or truncated line.
    pub fn entries_after(&self, since_seq: u64) -> WalResult<Vec<Entry<T>>> {
        let (valid, _corrupted) = read_valid_prefix::<T>(&self.path)?;
        Ok(valid.into_iter().filter(|e| e.seq > since_seq).collect())
    }

    /// Drop every record with `seq < keep_from_seq`, compacting the file in
    /// place. Used once a snapshot has made earlier records unnecessary for
    /// recovery.
    pub fn truncate_before(&mut self, keep_from_seq: u64) -> WalResult<()> {
        self.entries.retain(|e| e.seq >= keep_from_seq);
        self.cursor = self.cursor.min(self.entries.len());
        rewrite(&self.path, &self.entries)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

fn read_valid_prefix<T: DeserializeOwned + Clone>(path: &Path) -> WalResult<(Vec<Entry<T>>, bool)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut valid = Vec::new();

    for raw_line in reader.split(b'\n') {
        let raw_line = raw_line?;
        if raw_line.is_empty() {
            continue;
        }
        let Ok(text) = std::str::from_utf8(&raw_line) else {
            return Ok((valid, true));
        };
        let Ok(line) = serde_json::from_str::<Line<T>>(text) else {
            return Ok((valid, true));
        };
        valid.push(Entry { seq: line.seq, record: line.record });
    }
    Ok((valid, false))
}

fn rewrite<T: Serialize>(path: &Path, entries: &[Entry<T>]) -> WalResult<()> {
    let mut file = File::create(path)?;
    for entry in entries {
        let mut json = serde_json::to_string(&Line { seq: entry.seq, record: &entry.record })?;
        json.push('\n');
        file.write_all(json.as_bytes())?;
    }
    file.flush()?;
    Ok(())
}

fn rotate_backups(path: &Path) -> WalResult<()> {
    let backups: Vec<PathBuf> = (1..=MAX_BACKUPS)
        .map(|i| if i == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{i}")) })
        .collect();

    if let Some(oldest) = backups.last() {
        if oldest.exists() {
            fs::remove_file(oldest)?;
        }
    }
    for i in (0..backups.len() - 1).rev() {
        if backups[i].exists() {
            fs::rename(&backups[i], &backups[i + 1])?;
        }
    }
    fs::rename(path, &backups[0])?;
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
