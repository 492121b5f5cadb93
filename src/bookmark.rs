// SPDX-License-Identifier: Apache-2.0

//! Durable reader position with atomic writes.
//!
//! The bookmark is a single JSON record stored next to the input file.
//! Writes go to a sibling temp file, are fsynced, and are renamed over the
//! target, so a reader on recovery sees either the previous record or the
//! new one, never a torn file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::reader::{FileId, FollowingReader};

/// One durable position record.
///
/// The record is stale when the live file's identity no longer matches
/// `dev`/`ino`, or when the live file is shorter than `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub path: String,
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub offset: u64,
    pub line: u64,
}

/// Persists and recovers a [`FollowingReader`]'s position.
pub struct Bookmarker {
    path: PathBuf,
}

impl Bookmarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional bookmark path for an input file: `<input>.bookmark`.
    pub fn default_path(input: &Path) -> PathBuf {
        let mut os = OsString::from(input.as_os_str());
        os.push(".bookmark");
        PathBuf::from(os)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position the reader from a previously written bookmark.
    ///
    /// A valid bookmark seeks the reader to its offset and restores the
    /// line count. A stale, unreadable, or absent bookmark leaves the
    /// reader at the beginning of the file, or skips to the end when `end`
    /// is set.
    pub fn init(&self, reader: &mut FollowingReader, end: bool) -> Result<()> {
        match self.read() {
            Ok(Some(bookmark)) => {
                if self.is_valid(&bookmark, reader)? {
                    reader.seek_to(bookmark.offset, bookmark.line)?;
                    info!(
                        bookmark = %self.path.display(),
                        offset = bookmark.offset,
                        line = bookmark.line,
                        "resuming from bookmark"
                    );
                    return Ok(());
                }
                warn!(
                    bookmark = %self.path.display(),
                    "bookmark does not match the input file, starting over"
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    bookmark = %self.path.display(),
                    error = %e,
                    "failed to read bookmark, starting over"
                );
            }
        }
        if end {
            reader.skip_to_end()?;
        }
        Ok(())
    }

    /// Snapshot the reader's current position.
    pub fn get(&self, reader: &FollowingReader) -> Result<Bookmark> {
        let file_id = reader.file_id();
        let size = reader.file_size()?;
        Ok(Bookmark {
            path: reader.path().display().to_string(),
            dev: file_id.dev(),
            ino: file_id.ino(),
            size,
            offset: reader.offset(),
            line: reader.pos(),
        })
    }

    /// Write the record durably: temp file, fsync, rename over the target.
    pub fn write(&self, bookmark: &Bookmark) -> Result<()> {
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = File::create(&tmp)
            .map_err(|e| Error::Bookmark(format!("failed to create temp file: {}", e)))?;
        serde_json::to_writer_pretty(&mut file, bookmark)
            .map_err(|e| Error::Bookmark(format!("failed to serialize bookmark: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::Bookmark(format!("failed to sync bookmark: {}", e)))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Bookmark(format!("failed to rename bookmark: {}", e)))?;
        Ok(())
    }

    fn read(&self) -> Result<Option<Bookmark>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Bookmark(format!("failed to read bookmark: {}", e))),
        };
        let bookmark = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Bookmark(format!("failed to parse bookmark: {}", e)))?;
        Ok(Some(bookmark))
    }

    fn is_valid(&self, bookmark: &Bookmark, reader: &FollowingReader) -> Result<bool> {
        let recorded = FileId::new(bookmark.dev, bookmark.ino);
        Ok(recorded == reader.file_id() && reader.file_size()? >= bookmark.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReadOutcome;
    use std::io::Write;
    use tempfile::TempDir;

    const RAW_EVENT: &str = r#"{"timestamp":"2019-07-01T18:20:01.112176+0000","event_type":"dns","src_ip":"10.16.1.11"}"#;

    fn write_events(path: &Path, count: usize) {
        let mut file = File::create(path).unwrap();
        for _ in 0..count {
            writeln!(file, "{}", RAW_EVENT).unwrap();
        }
        file.flush().unwrap();
    }

    fn consume(reader: &mut FollowingReader, count: usize) {
        for _ in 0..count {
            match reader.next() {
                ReadOutcome::Event(_) => {}
                other => panic!("expected event, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_default_path() {
        assert_eq!(
            Bookmarker::default_path(Path::new("/var/log/eve.json")),
            PathBuf::from("/var/log/eve.json.bookmark")
        );
    }

    #[test]
    fn test_write_and_resume() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 5);

        let bookmarker = Bookmarker::new(dir.path().join("eve.json.bookmark"));

        // Consume three events, then bookmark.
        let mut reader = FollowingReader::open(&input).unwrap();
        consume(&mut reader, 3);
        let bookmark = bookmarker.get(&reader).unwrap();
        assert_eq!(bookmark.line, 3);
        bookmarker.write(&bookmark).unwrap();

        // A fresh reader resumes at event four.
        let mut reader = FollowingReader::open(&input).unwrap();
        bookmarker.init(&mut reader, false).unwrap();
        assert_eq!(reader.pos(), 3);
        consume(&mut reader, 2);
        assert_eq!(reader.pos(), 5);
        match reader.next() {
            ReadOutcome::EndOfData => {}
            other => panic!("expected end of data, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_on_recreate() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 2);

        let bookmarker = Bookmarker::new(dir.path().join("eve.json.bookmark"));
        let mut reader = FollowingReader::open(&input).unwrap();
        consume(&mut reader, 2);
        bookmarker.write(&bookmarker.get(&reader).unwrap()).unwrap();
        drop(reader);

        // Replace the file: new inode, the bookmark no longer applies.
        std::fs::remove_file(&input).unwrap();
        write_events(&input, 4);

        let mut reader = FollowingReader::open(&input).unwrap();
        bookmarker.init(&mut reader, false).unwrap();
        assert_eq!(reader.pos(), 0);
        consume(&mut reader, 4);
    }

    #[test]
    fn test_stale_on_truncation() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 5);

        let bookmarker = Bookmarker::new(dir.path().join("eve.json.bookmark"));
        let mut reader = FollowingReader::open(&input).unwrap();
        consume(&mut reader, 5);
        bookmarker.write(&bookmarker.get(&reader).unwrap()).unwrap();
        drop(reader);

        // Same inode, but shorter than the bookmarked offset.
        write_events(&input, 1);

        let mut reader = FollowingReader::open(&input).unwrap();
        bookmarker.init(&mut reader, false).unwrap();
        assert_eq!(reader.pos(), 0);
        consume(&mut reader, 1);
    }

    #[test]
    fn test_absent_bookmark_with_end() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 10);

        let bookmarker = Bookmarker::new(dir.path().join("eve.json.bookmark"));
        let mut reader = FollowingReader::open(&input).unwrap();
        bookmarker.init(&mut reader, true).unwrap();
        assert_eq!(reader.pos(), 10);
    }

    #[test]
    fn test_absent_bookmark_without_end() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 10);

        let bookmarker = Bookmarker::new(dir.path().join("eve.json.bookmark"));
        let mut reader = FollowingReader::open(&input).unwrap();
        bookmarker.init(&mut reader, false).unwrap();
        assert_eq!(reader.pos(), 0);
    }

    #[test]
    fn test_corrupt_bookmark_is_ignored() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 3);

        let path = dir.path().join("eve.json.bookmark");
        std::fs::write(&path, b"not json").unwrap();

        let bookmarker = Bookmarker::new(&path);
        let mut reader = FollowingReader::open(&input).unwrap();
        bookmarker.init(&mut reader, false).unwrap();
        assert_eq!(reader.pos(), 0);
    }

    #[test]
    fn test_write_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("eve.json");
        write_events(&input, 2);

        let path = dir.path().join("eve.json.bookmark");
        let bookmarker = Bookmarker::new(&path);
        let mut reader = FollowingReader::open(&input).unwrap();

        consume(&mut reader, 1);
        bookmarker.write(&bookmarker.get(&reader).unwrap()).unwrap();
        consume(&mut reader, 1);
        bookmarker.write(&bookmarker.get(&reader).unwrap()).unwrap();

        // The latest record won and the temp file is gone.
        let stored = bookmarker.read().unwrap().unwrap();
        assert_eq!(stored.line, 2);
        assert!(!dir.path().join("eve.json.bookmark.tmp").exists());
    }
}
