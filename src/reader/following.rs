// SPDX-License-Identifier: Apache-2.0

//! A tailing reader over a single EVE log file.
//!
//! The reader owns one "open epoch": a file handle plus the identity and
//! positions observed through it. When end of data is reached it compares
//! the live file at the tracked path against the open epoch; a differing
//! identity or a shrunken file means the log was rotated or truncated, and
//! the reader reopens, bumps the epoch, and resets its line position.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::eve::{self, EveEvent, MalformedEvent};
use crate::reader::file_id::FileId;
use crate::reader::splitter::LineSplitter;

/// Outcome of a single [`FollowingReader::next`] call.
///
/// End of data and malformed lines are expected control outcomes, not
/// errors; the import loop's match on this enum is its main dispatch.
#[derive(Debug)]
pub enum ReadOutcome {
    /// One decoded event. The reader's line position has advanced.
    Event(EveEvent),
    /// No complete line is available right now.
    EndOfData,
    /// A complete line that failed to decode. The line has been consumed;
    /// the next call will not redeliver it.
    Malformed(MalformedEvent),
    /// A read or stat failure. Reader state is intact; retrying is
    /// meaningful.
    Io(io::Error),
}

pub struct FollowingReader {
    path: PathBuf,
    file: File,
    file_id: FileId,
    /// Open-epoch ordinal, starting at 1 and bumped on every reopen.
    epoch: u64,
    /// Complete lines consumed since the epoch began.
    line: u64,
    /// Byte offset immediately after the last fully-consumed newline.
    offset: u64,
    splitter: LineSplitter,
}

impl FollowingReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_id = FileId::from_file(&file)?;
        Ok(Self {
            path,
            file,
            file_id,
            epoch: 1,
            line: 0,
            offset: 0,
            splitter: LineSplitter::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines consumed in the current epoch.
    pub fn pos(&self) -> u64 {
        self.line
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Size of the file backing the current epoch.
    pub fn file_size(&self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    /// Restore a previously bookmarked position.
    pub fn seek_to(&mut self, offset: u64, line: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        self.line = line;
        self.splitter.clear();
        Ok(())
    }

    /// Read the next event from the log.
    pub fn next(&mut self) -> ReadOutcome {
        match self.next_line() {
            Ok(Some(raw)) => match eve::decode(&raw) {
                Ok(event) => ReadOutcome::Event(event),
                Err(err) => ReadOutcome::Malformed(err),
            },
            Ok(None) => ReadOutcome::EndOfData,
            Err(e) => ReadOutcome::Io(e),
        }
    }

    /// Consume and count every complete line currently in the file. A
    /// trailing partial line stays buffered for the next [`Self::next`].
    pub fn skip_to_end(&mut self) -> io::Result<()> {
        while let Some(raw) = self.splitter.next_line(&mut self.file)? {
            self.consume(&raw);
        }
        Ok(())
    }

    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(raw) = self.splitter.next_line(&mut self.file)? {
            self.consume(&raw);
            return Ok(Some(raw));
        }

        // End of data. Check whether the file at the tracked path is still
        // the one we hold open.
        if !self.check_rotation()? {
            return Ok(None);
        }

        // A fresh epoch was swapped in; retry once so the first line of a
        // recreated file is not delayed by a tick.
        match self.splitter.next_line(&mut self.file)? {
            Some(raw) => {
                self.consume(&raw);
                Ok(Some(raw))
            }
            None => Ok(None),
        }
    }

    fn consume(&mut self, raw: &[u8]) {
        self.offset += raw.len() as u64 + 1;
        self.line += 1;
    }

    /// Compare the live file at the tracked path against the open epoch and
    /// reopen when the log was rotated or truncated. Returns true when the
    /// epoch was replaced.
    fn check_rotation(&mut self) -> io::Result<bool> {
        let live = match File::open(&self.path) {
            Ok(f) => f,
            // Rotated away with nothing at the path yet. Keep the current
            // handle; the next tick retries.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        let live_id = FileId::from_file(&live)?;
        let live_len = live.metadata()?.len();

        // Same file, not shrunk below our read position: genuine end of
        // data.
        if live_id == self.file_id && live_len >= self.offset {
            return Ok(false);
        }

        debug!(
            path = %self.path.display(),
            old_epoch = self.epoch,
            old_file_id = %self.file_id,
            new_file_id = %live_id,
            "input rotated or truncated, reopening"
        );

        // The partial tail belongs to the old epoch and must not leak into
        // the new file's first line.
        self.file = live;
        self.file_id = live_id;
        self.epoch += 1;
        self.line = 0;
        self.offset = 0;
        self.splitter.clear();
        Ok(true)
    }
}
